//! Host-level scenarios that exercise the whole engine at once.

mod common;

use common::{assert_eq, Harness, Report};
use heta_runtime::{foreign_method, Configuration, ErrorKind, ForeignClassMethods, InterpretResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn arithmetic_succeeds() {
    let mut harness = Harness::new();
    assert_eq!(harness.run("1 + 2"), InterpretResult::Success);
    assert!(harness.reports().is_empty());
}

#[test]
fn truncated_expression_is_one_compile_error() {
    let mut harness = Harness::new();
    assert_eq!(harness.run("1 +"), InterpretResult::CompileError);

    let reports = harness.reports();
    assert_eq!(reports.len(), 1, "{reports:?}");
    assert_eq!(reports[0].kind, ErrorKind::Compile);
    assert_eq!(reports[0].module.as_deref(), Some("main"));
    assert_eq!(reports[0].line, Some(1));
    assert!(!harness.vm.has_module("main"));
}

#[test]
fn negative_list_indices_from_the_host() {
    let mut harness = Harness::new();
    assert_eq!(harness.run("var list = [1, 2, 3]"), InterpretResult::Success);

    let vm = &mut harness.vm;
    vm.ensure_slots(2);
    vm.get_variable("main", "list", 0).unwrap();
    vm.set_slot_double(1, 9.0).unwrap();
    vm.set_list_element(0, -1, 1).unwrap();
    vm.set_slot_double(1, 0.0).unwrap();
    vm.insert_in_list(0, -1, 1).unwrap();

    assert_eq!(vm.get_list_count(0).unwrap(), 4);
    let mut elements = Vec::new();
    for index in 0..4 {
        vm.get_list_element(0, index, 1).unwrap();
        elements.push(vm.get_slot_double(1).unwrap());
    }
    assert_eq!(elements, vec![1.0, 2.0, 9.0, 0.0]);

    harness.clear_output();
    assert_eq!(harness.run("System.print(list)"), InterpretResult::Success);
    assert_eq!(harness.output(), "[1, 2, 9, 0]\n");
}

#[test]
fn foreign_finalizer_runs_once_after_release() {
    let finalized = Arc::new(AtomicUsize::new(0));
    let counter = finalized.clone();
    let config = Configuration::new().with_bind_foreign_class(move |module: &str, class: &str| {
        assert_eq!((module, class), ("main", "Buffer"));
        let counter = counter.clone();
        Some(
            ForeignClassMethods::new(foreign_method(|vm| {
                vm.set_slot_new_foreign(0, 0, 8)?;
                Ok(())
            }))
            .with_finalizer(move |_payload: &mut [u8]| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    });
    let mut harness = Harness::with_config(config);
    let source = "\
foreign class Buffer {
  construct new() {}
}
class Factory {
  static make() { Buffer.new() }
}";
    assert_eq!(harness.run(source), InterpretResult::Success, "{}", harness.error_text());

    let vm = &mut harness.vm;
    let make = vm.make_call_handle("make()").unwrap();
    vm.ensure_slots(1);
    vm.get_variable("main", "Factory", 0).unwrap();
    assert_eq!(vm.call(&make).unwrap(), InterpretResult::Success);
    let buffer = vm.get_slot_handle(0).unwrap();
    vm.set_slot_null(0).unwrap();

    vm.collect_garbage();
    assert_eq!(finalized.load(Ordering::SeqCst), 0);

    vm.release_handle(buffer).unwrap();
    vm.collect_garbage();
    assert_eq!(finalized.load(Ordering::SeqCst), 1);

    vm.collect_garbage();
    vm.release_handle(make).unwrap();
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}

#[test]
fn unresolved_import_reports_a_stack_trace() {
    let config = Configuration::new().with_resolve_module(|_importer: &str, _name: &str| None);
    let mut harness = Harness::with_config(config);
    let result = harness.run("var before = 1\nimport \"missing\"");
    assert_eq!(result, InterpretResult::RuntimeError);

    let reports = harness.reports();
    assert_eq!(
        reports,
        vec![
            Report {
                kind: ErrorKind::Runtime,
                module: None,
                line: None,
                message: "Could not resolve module 'missing' imported from 'main'.".into(),
            },
            Report {
                kind: ErrorKind::StackTrace,
                module: Some("main".into()),
                line: Some(2),
                message: "(script)".into(),
            },
        ]
    );
}
