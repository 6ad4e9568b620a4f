mod common;

use common::{assert_eq, assert_output, assert_runtime_error, Harness};
use heta_runtime::InterpretResult;

#[test]
fn yield_passes_values_both_ways() {
    let source = r#"
var fiber = Fiber.new {|first|
  System.print("got %(first)")
  var second = Fiber.yield(1)
  System.print("got %(second)")
  Fiber.yield(2)
  return 3
}
System.print(fiber.call("a"))
System.print(fiber.call("b"))
System.print(fiber.call())
System.print(fiber.isDone)
"#;
    assert_output(source, "got a\n1\ngot b\n2\n3\ntrue\n");
}

#[test]
fn try_catches_an_abort() {
    let source = r#"
var fiber = Fiber.new {
  Fiber.abort("bad")
  System.print("unreachable")
}
var error = fiber.try()
System.print(error)
System.print(fiber.error)
System.print(fiber.isDone)
"#;
    assert_output(source, "bad\nbad\ntrue\n");
}

#[test]
fn try_catches_errors_from_nested_calls() {
    let source = r#"
class Thrower {
  static go() { null.nope }
}
var fiber = Fiber.new { Thrower.go() }
System.print(fiber.try())
"#;
    assert_output(source, "Null does not implement 'nope'.\n");
}

#[test]
fn aborting_with_null_is_not_an_error() {
    assert_output("Fiber.abort(null)\nSystem.print(\"still here\")", "still here\n");
}

#[test]
fn generator_pattern() {
    let source = r#"
var numbers = Fiber.new {
  for (i in 1..3) Fiber.yield(i)
}
var total = 0
while (true) {
  var n = numbers.call()
  if (numbers.isDone) break
  total = total + n
}
System.print(total)
"#;
    assert_output(source, "6\n");
}

#[test]
fn current_fiber_is_visible() {
    let source = r#"
var inner = null
var fiber = Fiber.new { inner = Fiber.current }
fiber.call()
System.print(Object.same(inner, fiber))
"#;
    assert_output(source, "true\n");
}

#[test]
fn calling_a_finished_fiber_fails() {
    assert_runtime_error(
        "var f = Fiber.new { 1 }\nf.call()\nf.call()",
        "Cannot call a finished fiber.",
    );
}

#[test]
fn calling_an_aborted_fiber_fails() {
    assert_runtime_error(
        "var f = Fiber.new { Fiber.abort(\"x\") }\nf.try()\nf.try()",
        "Cannot try an aborted fiber.",
    );
}

#[test]
fn a_fiber_cannot_call_itself() {
    assert_runtime_error(
        "var f = null\nf = Fiber.new { f.call() }\nf.call()",
        "Fiber has already been called.",
    );
}

#[test]
fn fiber_functions_take_at_most_one_parameter() {
    assert_runtime_error(
        "Fiber.new {|a, b| a }",
        "Function cannot take more than one parameter.",
    );
}

#[test]
fn yielding_from_the_root_returns_to_the_host() {
    let mut harness = Harness::new();
    let result = harness.run("System.print(\"before\")\nFiber.yield()\nSystem.print(\"after\")");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(harness.output(), "before\n");
}

#[test]
fn uncaught_error_in_a_called_fiber_fails_the_run() {
    let mut harness = Harness::new();
    let source = "var f = Fiber.new {\n  Fiber.abort(\"deep\")\n}\nf.call()";
    assert_eq!(harness.run(source), InterpretResult::RuntimeError);
    insta::assert_snapshot!(harness.error_text(), @r"
    deep
    [main line 2] in new(_) block argument
    ");
}
