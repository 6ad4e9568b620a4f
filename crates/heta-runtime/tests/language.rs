//! Scripts that exercise the compiler and core library together.

mod common;

use common::{assert_output, assert_runtime_error};
use rstest::rstest;

#[rstest]
#[case::arithmetic("System.print(1 + 2 * 3)", "7\n")]
#[case::division("System.print(10 / 4)", "2.5\n")]
#[case::repeating_fraction("System.print(1 / 3)", "0.33333333333333\n")]
#[case::modulo("System.print(-7 % 3)", "-1\n")]
#[case::large_number("System.print(100000000000000)", "1e+14\n")]
#[case::negative_zero("System.print(-0)", "-0\n")]
#[case::bitwise("System.print(6 & 3 | 8)", "10\n")]
#[case::comparison("System.print(1 < 2 && 3 >= 3)", "true\n")]
#[case::conditional("System.print(false ? \"a\" : \"b\")", "b\n")]
#[case::or_short_circuit("System.print(null || 4)", "4\n")]
#[case::not("System.print(!null)", "true\n")]
#[case::string_concat("System.print(\"a\" + \"b\")", "ab\n")]
#[case::interpolation("var x = 2\nSystem.print(\"x = %(x * 3)!\")", "x = 6!\n")]
#[case::string_subscript("System.print(\"hello\"[1])", "e\n")]
#[case::string_range("System.print(\"hello\"[1..3])", "ell\n")]
#[case::list_literal("System.print([1, \"two\", null])", "[1, two, null]\n")]
#[case::list_range_subscript("System.print([1, 2, 3, 4][-2..-1])", "[3, 4]\n")]
#[case::map_lookup("var m = {\"a\": 1}\nSystem.print(m[\"a\"])", "1\n")]
#[case::missing_map_key("System.print({}[\"nope\"])", "null\n")]
#[case::range_text("System.print(1..3)", "1..3\n")]
#[case::is_operator("System.print(1 is Num)", "true\n")]
#[case::class_name("System.print(String)", "String\n")]
#[case::null_type("System.print(null.type)", "Null\n")]
fn expressions(#[case] source: &str, #[case] expected: &str) {
    assert_output(source, expected);
}

#[test]
fn control_flow() {
    let source = r#"
var total = 0
for (i in 1..10) {
  if (i == 8) break
  if (i % 2 == 0) continue
  total = total + i
}
System.print(total)

var n = 3
while (n > 0) {
  System.write(n)
  n = n - 1
}
System.print()
"#;
    assert_output(source, "16\n321\n");
}

#[test]
fn for_loop_over_list() {
    let source = r#"
var words = []
for (word in ["a", "b", "c"]) words.add(word + word)
System.print(words)
"#;
    assert_output(source, "[aa, bb, cc]\n");
}

#[test]
fn closures_capture_variables() {
    let source = r#"
var counter = Fn.new {
  var count = 0
  return Fn.new {
    count = count + 1
    return count
  }
}
var next = counter.call()
next.call()
next.call()
System.print(next.call())
"#;
    assert_output(source, "3\n");
}

#[test]
fn closures_in_loops_capture_fresh_variables() {
    let source = r#"
var fns = []
for (i in 1..3) fns.add(Fn.new { i })
for (f in fns) System.write(f.call())
System.print()
"#;
    assert_output(source, "123\n");
}

#[test]
fn classes_fields_and_accessors() {
    let source = r#"
class Point {
  construct new(x, y) {
    _x = x
    _y = y
  }
  x { _x }
  x=(value) { _x = value }
  +(other) { Point.new(_x + other.x, _y + other.y) }
  [index] { index == 0 ? _x : _y }
  toString { "(%(_x), %(_y))" }
}
var p = Point.new(1, 2) + Point.new(10, 20)
p.x = p.x * 2
System.print(p)
System.print(p[1])
"#;
    assert_output(source, "(22, 22)\n22\n");
}

#[test]
fn inheritance_and_super() {
    let source = r#"
class Animal {
  construct new(name) { _name = name }
  name { _name }
  speak() { "%(name) makes a sound" }
}
class Dog is Animal {
  construct new(name) {
    super(name)
    _tricks = 0
  }
  speak() { super.speak() + " and barks" }
}
var dog = Dog.new("Rex")
System.print(dog.speak())
System.print(dog is Animal)
System.print(Dog.supertype)
"#;
    assert_output(source, "Rex makes a sound and barks\ntrue\nAnimal\n");
}

#[test]
fn static_methods_and_fields() {
    let source = r#"
class Counter {
  static bump() {
    if (__count == null) __count = 0
    __count = __count + 1
    return __count
  }
}
Counter.bump()
Counter.bump()
System.print(Counter.bump())
"#;
    assert_output(source, "3\n");
}

#[test]
fn implicit_this_for_lowercase_names() {
    let source = r#"
class Greeter {
  construct new() {}
  greet() { "hello " + target }
  target { "world" }
}
System.print(Greeter.new().greet())
"#;
    assert_output(source, "hello world\n");
}

#[test]
fn block_arguments() {
    let source = r#"
class Twice {
  static run(fn) {
    fn.call(1)
    fn.call(2)
  }
}
Twice.run {|n| System.write(n * 10) }
System.print()
"#;
    assert_output(source, "1020\n");
}

#[test]
fn maps_keyed_by_value_types() {
    let source = r#"
var m = {}
m[1] = "num"
m[true] = "bool"
m[null] = "null"
m["s"] = "string"
m[1..2] = "range"
m[Num] = "class"
System.print(m.count)
System.print(m[1..2])
System.print(m.containsKey(Num))
System.print(m.remove("s"))
System.print(m.count)
"#;
    assert_output(source, "6\nrange\ntrue\nstring\n5\n");
}

#[test]
fn maps_keyed_by_object_identity() {
    let source = r#"
class Point {
  construct new(x) { _x = x }
}
var m = {}
var a = Point.new(1)
var b = Point.new(1)
var list = []
m[a] = "a"
m[b] = "b"
m[list] = "list"
m[[]] = "other list"
System.print(m.count)
System.print(m[a] + m[b] + m[list])
System.print(m.containsKey(Point.new(1)))
System.print(m.remove(a))
System.print(m[a])
"#;
    assert_output(source, "4\nablist\nfalse\na\nnull\n");
}

#[test]
fn self_referencing_list_prints() {
    assert_output("var a = [1]\na.add(a)\nSystem.print(a)", "[1, [...]]\n");
}

#[test]
fn object_identity() {
    let source = r#"
System.print(Object.same(1, 1))
System.print([] == [])
var list = []
System.print(Object.same(list, list))
"#;
    assert_output(source, "true\nfalse\ntrue\n");
}

#[rstest]
#[case::unknown_method("1.foo", "Num does not implement 'foo'.")]
#[case::bad_operand("1 + \"a\"", "Right operand must be a number.")]
#[case::list_index("[1, 2][5]", "Subscript out of bounds.")]
#[case::abort("Fiber.abort(\"custom\")", "custom")]
#[case::bad_superclass("class Foo is 3 {}", "Class 'Foo' cannot inherit from a non-class object.")]
#[case::builtin_superclass("class Foo is List {}", "Class 'Foo' cannot inherit from built-in class 'List'.")]
#[case::missing_arguments("Fn.new {|a, b| a }.call(1)", "Function expects more arguments.")]
fn runtime_errors(#[case] source: &str, #[case] message: &str) {
    assert_runtime_error(source, message);
}

#[test]
fn runaway_recursion_overflows() {
    let source = r#"
class Deep {
  static go(n) { go(n + 1) }
}
Deep.go(0)
"#;
    assert_runtime_error(source, "Stack overflow.");
}
