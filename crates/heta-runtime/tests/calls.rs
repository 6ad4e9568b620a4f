mod common;

use common::{assert_eq, Harness};
use heta_runtime::{ApiError, ErrorKind, InterpretResult};

const ACCOUNT: &str = r#"
class Account {
  construct new(balance) { _balance = balance }
  balance { _balance }
  balance=(value) { _balance = value }
  deposit(amount) {
    if (amount < 0) Fiber.abort("Negative deposit.")
    _balance = _balance + amount
    return this
  }
  [key] { key == "balance" ? _balance : null }
}
var account = Account.new(10)
"#;

fn account() -> Harness {
    let mut harness = Harness::new();
    assert_eq!(harness.run(ACCOUNT), InterpretResult::Success, "{}", harness.error_text());
    harness
}

#[test]
fn calls_methods_getters_setters_and_subscripts() {
    let mut harness = account();
    let vm = &mut harness.vm;
    let deposit = vm.make_call_handle("deposit(_)").unwrap();
    let balance = vm.make_call_handle("balance").unwrap();
    let set_balance = vm.make_call_handle("balance=(_)").unwrap();
    let subscript = vm.make_call_handle("[_]").unwrap();

    vm.ensure_slots(2);
    vm.get_variable("main", "account", 0).unwrap();
    let account = vm.get_slot_handle(0).unwrap();
    vm.set_slot_double(1, 5.0).unwrap();
    assert_eq!(vm.call(&deposit).unwrap(), InterpretResult::Success);

    assert_eq!(vm.call(&balance).unwrap(), InterpretResult::Success);
    assert_eq!(vm.get_slot_double(0).unwrap(), 15.0);

    vm.ensure_slots(2);
    vm.set_slot_handle(0, &account).unwrap();
    vm.set_slot_double(1, 100.0).unwrap();
    assert_eq!(vm.call(&set_balance).unwrap(), InterpretResult::Success);

    vm.ensure_slots(2);
    vm.set_slot_handle(0, &account).unwrap();
    vm.set_slot_string(1, "balance").unwrap();
    assert_eq!(vm.call(&subscript).unwrap(), InterpretResult::Success);
    assert_eq!(vm.get_slot_double(0).unwrap(), 100.0);

    for handle in [deposit, balance, set_balance, subscript, account] {
        vm.release_handle(handle).unwrap();
    }
}

#[test]
fn runtime_error_in_a_call_is_reported() {
    let mut harness = account();
    let deposit = harness.vm.make_call_handle("deposit(_)").unwrap();
    harness.vm.ensure_slots(2);
    harness.vm.get_variable("main", "account", 0).unwrap();
    harness.vm.set_slot_double(1, -1.0).unwrap();
    assert_eq!(harness.vm.call(&deposit).unwrap(), InterpretResult::RuntimeError);

    let reports = harness.reports();
    assert_eq!(reports[0].kind, ErrorKind::Runtime);
    assert_eq!(reports[0].message, "Negative deposit.");
    assert_eq!(reports[1].render(), "[main line 7] in Account.deposit(_)");

    // The VM is still usable afterwards.
    harness.vm.ensure_slots(2);
    harness.vm.set_slot_double(1, 1.0).unwrap();
    harness.vm.get_variable("main", "account", 0).unwrap();
    assert_eq!(harness.vm.call(&deposit).unwrap(), InterpretResult::Success);
    harness.vm.release_handle(deposit).unwrap();
}

#[test]
fn calling_requires_enough_slots() {
    let mut harness = account();
    let vm = &mut harness.vm;
    let deposit = vm.make_call_handle("deposit(_)").unwrap();
    vm.ensure_slots(1);
    assert_eq!(
        vm.call(&deposit),
        Err(ApiError::NotEnoughSlots {
            needed: 2,
            available: 1
        })
    );
    vm.release_handle(deposit).unwrap();
}

#[test]
fn value_handles_are_not_callable() {
    let mut harness = account();
    let vm = &mut harness.vm;
    vm.ensure_slots(1);
    vm.set_slot_double(0, 1.0).unwrap();
    let number = vm.get_slot_handle(0).unwrap();
    assert_eq!(vm.call(&number), Err(ApiError::NotCallable));
    vm.release_handle(number).unwrap();
}

#[test]
fn released_handles_are_stale() {
    let mut harness = account();
    let vm = &mut harness.vm;
    let balance = vm.make_call_handle("balance").unwrap();
    let copy = vm.acquire_handle(&balance).unwrap();
    vm.release_handle(balance).unwrap();
    vm.release_handle(copy).unwrap();
    assert_eq!(vm.live_handles(), 0);
}

#[test]
fn invalid_signatures_are_rejected() {
    let mut harness = Harness::new();
    assert_eq!(
        harness.vm.make_call_handle(""),
        Err(ApiError::InvalidSignature(String::new()))
    );
    let too_many = format!("f({})", vec!["_"; 17].join(","));
    assert!(matches!(
        harness.vm.make_call_handle(&too_many),
        Err(ApiError::InvalidSignature(_))
    ));
}
