//! `Fiber` and `Fn`
//!
//! Fiber primitives switch the running fiber by rewriting `vm.fiber` and
//! the stacks involved, then return [`Control::Switch`] so the interpreter
//! reloads its frame. The slot that held the call's receiver stays on the
//! suspended fiber's stack and receives the value passed back when it
//! resumes.

use super::{primitive, static_primitive, validate_fn, Control, PrimResult};
use crate::heap::ObjRef;
use crate::object::{FiberState, Method};
use crate::value::Value;
use crate::vm::Vm;
use crate::MAX_PARAMETERS;

pub(super) fn bind_fiber(vm: &mut Vm) {
    let fiber = vm.core.fiber;

    static_primitive(vm, fiber, "new(_)", new);
    static_primitive(vm, fiber, "abort(_)", abort);
    static_primitive(vm, fiber, "current", |vm, _| {
        Ok(vm.fiber.map_or(Value::NULL, Value::object))
    });
    static_primitive(vm, fiber, "yield()", |vm, _| yield_to_caller(vm, Value::NULL, false));
    static_primitive(vm, fiber, "yield(_)", |vm, args| {
        yield_to_caller(vm, args[1], true)
    });

    primitive(vm, fiber, "call()", |vm, args| run(vm, args, Run::Call, false));
    primitive(vm, fiber, "call(_)", |vm, args| run(vm, args, Run::Call, true));
    primitive(vm, fiber, "try()", |vm, args| run(vm, args, Run::Try, false));
    primitive(vm, fiber, "try(_)", |vm, args| run(vm, args, Run::Try, true));
    primitive(vm, fiber, "isDone", |vm, args| {
        Ok(Value::bool(vm.heap.fiber(args[0].as_object()).is_done()))
    });
    primitive(vm, fiber, "error", |vm, args| {
        Ok(vm.heap.fiber(args[0].as_object()).error)
    });
}

pub(super) fn bind_fn(vm: &mut Vm) {
    let class = vm.core.fn_;

    static_primitive(vm, class, "new(_)", |vm, args| {
        validate_fn(vm, args[1], "Argument")?;
        Ok(args[1])
    });
    primitive(vm, class, "arity", |vm, args| {
        let arity = vm.heap.closure(args[0].as_object()).proto.arity;
        Ok(Value::num(arity as f64))
    });
    primitive(vm, class, "toString", |vm, _| Ok(vm.new_string_value("<fn>")));

    // `call` with every arity up to the parameter limit invokes the
    // receiver directly.
    for arity in 0..=MAX_PARAMETERS {
        let params = vec!["_"; arity].join(",");
        let symbol = vm
            .method_names
            .ensure(&mut vm.heap, &format!("call({params})"));
        vm.heap.class_mut(class).bind_method(symbol, Method::FnCall);
    }
}

fn new(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let closure = validate_fn(vm, args[1], "Argument")?;
    if vm.heap.closure(closure).proto.arity > 1 {
        return vm.fail("Function cannot take more than one parameter.");
    }
    Ok(Value::object(vm.new_fiber(closure)))
}

fn abort(_vm: &mut Vm, args: &[Value]) -> PrimResult {
    if args[1].is_null() {
        return Ok(Value::NULL);
    }
    Err(Control::Error(args[1]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    Call,
    Try,
}

/// Whether `target` is `current` or one of the fibers waiting on it.
fn in_call_chain(vm: &Vm, target: ObjRef, current: ObjRef) -> bool {
    let mut fiber = Some(current);
    while let Some(f) = fiber {
        if f == target {
            return true;
        }
        fiber = vm.heap.fiber(f).caller;
    }
    false
}

fn run(vm: &mut Vm, args: &[Value], mode: Run, has_value: bool) -> PrimResult {
    let target = args[0].as_object();
    let verb = match mode {
        Run::Call => "call",
        Run::Try => "try",
    };
    let Some(current) = vm.fiber else {
        return vm.fail("No fiber is running.");
    };

    let state = vm.heap.fiber(target);
    if state.has_error() {
        return vm.fail(&format!("Cannot {verb} an aborted fiber."));
    }
    if state.caller.is_some()
        || state.state == FiberState::AwaitingImport
        || in_call_chain(vm, target, current)
    {
        return vm.fail("Fiber has already been called.");
    }
    if vm.heap.fiber(target).frames.is_empty() {
        return vm.fail(&format!("Cannot {verb} a finished fiber."));
    }

    let value = if has_value { args[1] } else { Value::NULL };
    if has_value {
        // Only the receiver's slot is needed for the eventual result.
        vm.heap.fiber_mut(current).pop();
    }

    let fiber = vm.heap.fiber_mut(target);
    fiber.caller = Some(current);
    fiber.state = match mode {
        Run::Call => FiberState::Running,
        Run::Try => FiberState::Try,
    };
    if fiber.is_fresh() {
        // First run: bind the value to the function's parameter, if any.
        if fiber.frames[0].proto.arity == 1 {
            fiber.push(value);
        }
    } else if let Some(slot) = fiber.stack.last_mut() {
        // Resumed: the value becomes the result of its `yield`.
        *slot = value;
    }

    tracing::trace!(from = current.index(), to = target.index(), verb, "fiber switch");
    vm.fiber = Some(target);
    Err(Control::Switch)
}

fn yield_to_caller(vm: &mut Vm, value: Value, has_value: bool) -> PrimResult {
    let Some(current) = vm.fiber else {
        return vm.fail("No fiber is running.");
    };

    let fiber = vm.heap.fiber_mut(current);
    let caller = fiber.caller.take();
    fiber.state = FiberState::Suspended;
    if has_value {
        fiber.pop();
    }

    if let Some(caller) = caller {
        if let Some(slot) = vm.heap.fiber_mut(caller).stack.last_mut() {
            *slot = value;
        }
        tracing::trace!(from = current.index(), to = caller.index(), "fiber yield");
    }
    // With no caller the whole run suspends back to the host.
    vm.fiber = caller;
    Err(Control::Switch)
}
