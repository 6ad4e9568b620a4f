//! `Object`, `Class`, `Bool` and `Null`

use super::{primitive, Control, PrimResult};
use crate::heap::ObjRef;
use crate::object::ObjKind;
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind_object(vm: &mut Vm, object: ObjRef) {
    primitive(vm, object, "!", object_not);
    primitive(vm, object, "==(_)", object_eqeq);
    primitive(vm, object, "!=(_)", object_bangeq);
    primitive(vm, object, "is(_)", object_is);
    primitive(vm, object, "toString", object_to_string);
    primitive(vm, object, "type", object_type);
}

pub(super) fn bind_class(vm: &mut Vm, class: ObjRef) {
    primitive(vm, class, "name", class_name);
    primitive(vm, class, "supertype", class_supertype);
    primitive(vm, class, "toString", class_name);
}

pub(super) fn bind_object_metaclass(vm: &mut Vm, metaclass: ObjRef) {
    primitive(vm, metaclass, "same(_,_)", object_same);
}

pub(super) fn bind_bool(vm: &mut Vm) {
    let class = vm.core.bool;
    primitive(vm, class, "!", bool_not);
    primitive(vm, class, "toString", to_string);
}

pub(super) fn bind_null(vm: &mut Vm) {
    let class = vm.core.null;
    primitive(vm, class, "!", null_not);
    primitive(vm, class, "toString", to_string);
}

fn object_not(_vm: &mut Vm, _args: &[Value]) -> PrimResult {
    Ok(Value::FALSE)
}

fn object_eqeq(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(vm.heap.values_equal(args[0], args[1])))
}

fn object_bangeq(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(!vm.heap.values_equal(args[0], args[1])))
}

fn object_is(vm: &mut Vm, args: &[Value]) -> PrimResult {
    if !vm.heap.is_class(args[1]) {
        return vm.fail("Right operand must be a class.");
    }
    let target = args[1].as_object();
    let mut class = Some(vm.class_of(args[0]));
    while let Some(current) = class {
        if current == target {
            return Ok(Value::TRUE);
        }
        class = vm.heap.class(current).superclass;
    }
    Ok(Value::FALSE)
}

fn object_to_string(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let text = match args[0].try_object().map(|r| vm.heap.kind(r)) {
        Some(ObjKind::Class(class)) => vm.heap.string(class.name).to_string_lossy().into_owned(),
        _ => format!("instance of {}", vm.class_name(vm.class_of(args[0]))),
    };
    Ok(vm.new_string_value(&text))
}

fn object_type(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::object(vm.class_of(args[0])))
}

/// `Object.same(a, b)`: identity, ignoring any `==` override.
fn object_same(_vm: &mut Vm, args: &[Value]) -> PrimResult {
    let (a, b) = (args[1], args[2]);
    let same = if a.is_num() && b.is_num() {
        a.as_num() == b.as_num()
    } else {
        a == b
    };
    Ok(Value::bool(same))
}

fn class_name(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let name = vm.heap.class(args[0].as_object()).name;
    Ok(Value::object(name))
}

fn class_supertype(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(vm
        .heap
        .class(args[0].as_object())
        .superclass
        .map_or(Value::NULL, Value::object))
}

fn bool_not(_vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(!args[0].as_bool()))
}

fn null_not(_vm: &mut Vm, _args: &[Value]) -> PrimResult {
    Ok(Value::TRUE)
}

/// Shared by the classes whose text needs no nested calls.
pub(super) fn to_string(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let text = vm.stringify(args[0]).map_err(Control::Error)?;
    Ok(vm.new_string_value(&text))
}
