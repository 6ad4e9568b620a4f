mod common;

use common::{assert_eq, Harness};
use heta_runtime::{Configuration, ErrorKind, InterpretResult, LoadModuleResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A loader serving fixed sources and recording every request.
fn fixed_loader(
    sources: &[(&str, &str)],
) -> (Configuration, Arc<Mutex<Vec<String>>>) {
    let sources: HashMap<String, String> = sources
        .iter()
        .map(|(name, source)| (name.to_string(), source.to_string()))
        .collect();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    let config = Configuration::new().with_load_module(move |name: &str| {
        log.lock().unwrap().push(name.to_string());
        match sources.get(name) {
            Some(source) => LoadModuleResult::Source(source.clone()),
            None => LoadModuleResult::NotFound,
        }
    });
    (config, requests)
}

#[test]
fn import_binds_variables() {
    let (config, _) = fixed_loader(&[("math", "var Pi = 3\nclass Sq {\n  static of(n) { n * n }\n}")]);
    let mut harness = Harness::with_config(config);
    let result = harness.run("import \"math\" for Pi, Sq as Square\nSystem.print(Square.of(Pi))");
    assert_eq!(result, InterpretResult::Success, "{}", harness.error_text());
    assert_eq!(harness.output(), "9\n");
    assert!(harness.vm.has_module("math"));
    assert!(harness.vm.has_variable("math", "Pi"));
    assert!(!harness.vm.has_variable("math", "Missing"));
}

#[test]
fn modules_load_and_run_once() {
    let (config, requests) = fixed_loader(&[
        ("shared", "System.print(\"shared body\")\nvar Value = 1"),
        ("other", "import \"shared\" for Value\nSystem.print(\"other sees %(Value)\")"),
    ]);
    let mut harness = Harness::with_config(config);
    let source = "import \"shared\"\nimport \"other\"\nimport \"shared\" for Value\nSystem.print(Value)";
    assert_eq!(harness.run(source), InterpretResult::Success, "{}", harness.error_text());
    assert_eq!(harness.output(), "shared body\nother sees 1\n1\n");
    assert_eq!(*requests.lock().unwrap(), vec!["shared", "other"]);
}

#[test]
fn missing_module_is_a_runtime_error() {
    let (config, _) = fixed_loader(&[]);
    let mut harness = Harness::with_config(config);
    assert_eq!(harness.run("import \"nowhere\""), InterpretResult::RuntimeError);
    assert_eq!(harness.reports()[0].message, "Could not load module 'nowhere'.");
}

#[test]
fn missing_variable_is_a_runtime_error() {
    let (config, _) = fixed_loader(&[("lib", "var Here = 1")]);
    let mut harness = Harness::with_config(config);
    assert_eq!(harness.run("import \"lib\" for There"), InterpretResult::RuntimeError);
    assert_eq!(
        harness.reports()[0].message,
        "Could not find a variable named 'There' in module 'lib'."
    );
}

#[test]
fn module_with_compile_error_fails_the_import() {
    let (config, _) = fixed_loader(&[("broken", "var = 1")]);
    let mut harness = Harness::with_config(config);
    assert_eq!(harness.run("import \"broken\""), InterpretResult::RuntimeError);

    let kinds: Vec<ErrorKind> = harness.reports().iter().map(|r| r.kind).collect();
    assert_eq!(kinds[0], ErrorKind::Compile);
    assert!(harness
        .reports()
        .iter()
        .any(|r| r.message == "Could not compile module 'broken'."));
    assert!(!harness.vm.has_module("broken"));
}

#[test]
fn resolver_canonicalizes_names() {
    let (config, requests) = fixed_loader(&[("lib/util", "var Name = \"util\"")]);
    let config = config.with_resolve_module(|importer: &str, name: &str| {
        assert_eq!(importer, "main");
        Some(match name.strip_prefix("./") {
            Some(rest) => format!("lib/{rest}"),
            None => name.to_string(),
        })
    });
    let mut harness = Harness::with_config(config);
    let source = "import \"./util\" for Name\nimport \"lib/util\"\nSystem.print(Name)";
    assert_eq!(harness.run(source), InterpretResult::Success, "{}", harness.error_text());
    assert_eq!(harness.output(), "util\n");
    assert_eq!(*requests.lock().unwrap(), vec!["lib/util"]);
}

#[test]
fn deferred_load_parks_the_importer() {
    let requests = Arc::new(Mutex::new(0));
    let count = requests.clone();
    let config = Configuration::new().with_load_module(move |_name: &str| {
        *count.lock().unwrap() += 1;
        LoadModuleResult::Deferred
    });
    let mut harness = Harness::with_config(config);

    let result = harness.run("System.print(\"start\")\nimport \"later\" for Answer\nSystem.print(Answer)");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(harness.output(), "start\n");
    assert!(harness.vm.has_pending_imports());

    // A second module waiting on the same import does not ask the loader again.
    let result = harness.vm.interpret("second", "import \"later\" for Answer\nSystem.print(Answer + 1)");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(*requests.lock().unwrap(), 1);

    let result = harness
        .vm
        .complete_module_load("later", Some("System.print(\"later body\")\nvar Answer = 41"));
    assert_eq!(result, InterpretResult::Success, "{}", harness.error_text());
    assert_eq!(harness.output(), "start\nlater body\n41\n42\n");
    assert!(!harness.vm.has_pending_imports());
}

#[test]
fn deferred_load_that_never_arrives() {
    let config = Configuration::new().with_load_module(|_name: &str| LoadModuleResult::Deferred);
    let mut harness = Harness::with_config(config);
    assert_eq!(harness.run("import \"later\"\nSystem.print(\"no\")"), InterpretResult::Success);

    let result = harness.vm.complete_module_load("later", None);
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(harness.output(), "");
    assert_eq!(harness.reports()[0].message, "Could not load module 'later'.");
}

#[test]
fn completing_an_unrequested_module_is_a_no_op() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.vm.complete_module_load("nobody", Some("var X = 1")),
        InterpretResult::Success
    );
    assert!(!harness.vm.has_module("nobody"));
    assert!(!harness.vm.has_pending_imports());
}

#[test]
fn waiting_inside_a_nested_call_fails() {
    let config = Configuration::new().with_load_module(|_name: &str| LoadModuleResult::Deferred);
    let mut harness = Harness::with_config(config);
    let source = r#"
class Lazy {
  construct new() {}
  toString {
    import "later"
    return "loaded"
  }
}
System.print(Lazy.new())
"#;
    assert_eq!(harness.run(source), InterpretResult::RuntimeError);
    assert_eq!(
        harness.reports()[0].message,
        "Cannot wait for module 'later' inside a nested call."
    );
}

#[test]
fn modules_keep_state_between_runs() {
    let mut harness = Harness::new();
    assert_eq!(harness.run("var count = 1"), InterpretResult::Success);
    assert_eq!(harness.run("count = count + 1\nSystem.print(count)"), InterpretResult::Success);
    assert_eq!(harness.output(), "2\n");
}
