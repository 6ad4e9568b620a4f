//! `Map`

use super::list::new_list;
use super::{primitive, static_primitive, PrimResult};
use crate::object::{ObjKind, ObjMap};
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm) {
    let map = vm.core.map;

    static_primitive(vm, map, "new()", |vm, _| Ok(new_map(vm)));

    primitive(vm, map, "[_]", subscript);
    primitive(vm, map, "[_]=(_)", subscript_setter);
    primitive(vm, map, "addCore_(_,_)", add_core);
    primitive(vm, map, "containsKey(_)", contains_key);
    primitive(vm, map, "remove(_)", remove);
    primitive(vm, map, "clear()", |vm, args| {
        vm.heap.map_mut(args[0].as_object()).clear();
        Ok(Value::NULL)
    });
    primitive(vm, map, "count", |vm, args| {
        Ok(Value::num(vm.heap.map(args[0].as_object()).count() as f64))
    });
    primitive(vm, map, "keys", |vm, args| {
        let keys = vm.heap.map(args[0].as_object()).iter().map(|(k, _)| k).collect();
        Ok(new_list(vm, keys))
    });
    primitive(vm, map, "values", |vm, args| {
        let values = vm.heap.map(args[0].as_object()).iter().map(|(_, v)| v).collect();
        Ok(new_list(vm, values))
    });
    primitive(vm, map, "toString", super::object::to_string);
}

pub(crate) fn new_map(vm: &mut Vm) -> Value {
    let class = vm.core.map;
    Value::object(vm.allocate(Some(class), ObjKind::Map(ObjMap::new())))
}

fn subscript(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(vm
        .heap
        .map_get(args[0].as_object(), args[1])
        .unwrap_or(Value::NULL))
}

fn store(vm: &mut Vm, args: &[Value]) {
    vm.heap.map_set(args[0].as_object(), args[1], args[2]);
    vm.grew(args[0].as_object());
}

fn subscript_setter(vm: &mut Vm, args: &[Value]) -> PrimResult {
    store(vm, args);
    Ok(args[2])
}

/// Used by map literals; returns the map so entries chain.
fn add_core(vm: &mut Vm, args: &[Value]) -> PrimResult {
    store(vm, args);
    Ok(args[0])
}

fn contains_key(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(
        vm.heap.map_get(args[0].as_object(), args[1]).is_some(),
    ))
}

fn remove(vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(vm
        .heap
        .map_remove(args[0].as_object(), args[1])
        .unwrap_or(Value::NULL))
}
