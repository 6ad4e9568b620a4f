//! `List`

use super::{
    calculate_range, primitive, range_indices, static_primitive, validate_index, validate_int,
    PrimResult,
};
use crate::object::{ObjKind, ObjList};
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm) {
    let list = vm.core.list;

    static_primitive(vm, list, "new()", |vm, _| Ok(new_list(vm, Vec::new())));
    static_primitive(vm, list, "filled(_,_)", filled);

    primitive(vm, list, "[_]", subscript);
    primitive(vm, list, "[_]=(_)", subscript_setter);
    primitive(vm, list, "add(_)", |vm, args| {
        append(vm, args[0], args[1]);
        Ok(args[1])
    });
    primitive(vm, list, "addCore_(_)", |vm, args| {
        append(vm, args[0], args[1]);
        Ok(args[0])
    });
    primitive(vm, list, "clear()", |vm, args| {
        vm.heap.list_mut(args[0].as_object()).elements.clear();
        Ok(Value::NULL)
    });
    primitive(vm, list, "count", |vm, args| {
        Ok(Value::num(count(vm, args[0]) as f64))
    });
    primitive(vm, list, "insert(_,_)", insert);
    primitive(vm, list, "removeAt(_)", remove_at);
    primitive(vm, list, "remove(_)", remove);
    primitive(vm, list, "indexOf(_)", index_of);
    primitive(vm, list, "iterate(_)", iterate);
    primitive(vm, list, "iteratorValue(_)", iterator_value);
    primitive(vm, list, "toString", super::object::to_string);
}

pub(crate) fn new_list(vm: &mut Vm, elements: Vec<Value>) -> Value {
    let class = vm.core.list;
    let kind = ObjKind::List(ObjList {
        elements: elements.into(),
    });
    Value::object(vm.allocate(Some(class), kind))
}

fn append(vm: &mut Vm, list: Value, value: Value) {
    vm.heap.list_mut(list.as_object()).elements.write(value);
    vm.grew(list.as_object());
}

fn count(vm: &Vm, list: Value) -> usize {
    vm.heap.list(list.as_object()).elements.count()
}

fn filled(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let size = validate_int(vm, args[1], "Size")?;
    if size < 0.0 {
        return vm.fail("Size cannot be negative.");
    }
    Ok(new_list(vm, vec![args[2]; size as usize]))
}

fn subscript(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let list = args[0].as_object();
    let length = count(vm, args[0]);

    if args[1].is_num() {
        let index = validate_index(vm, args[1], length, "Subscript")?;
        return Ok(vm.heap.list(list).elements[index]);
    }
    if !vm.heap.is_range(args[1]) {
        return vm.fail("Subscript must be a number or a range.");
    }

    let (start, length, step) = calculate_range(vm, args[1].as_object(), length)?;
    let elements = &vm.heap.list(list).elements;
    let slice: Vec<Value> = range_indices(start, length, step)
        .map(|i| elements[i])
        .collect();
    Ok(new_list(vm, slice))
}

fn subscript_setter(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = count(vm, args[0]);
    let index = validate_index(vm, args[1], length, "Subscript")?;
    vm.heap.list_mut(args[0].as_object()).elements[index] = args[2];
    Ok(args[2])
}

fn insert(vm: &mut Vm, args: &[Value]) -> PrimResult {
    // One past the end is allowed, to append.
    let length = count(vm, args[0]);
    let index = validate_index(vm, args[1], length + 1, "Index")?;
    vm.heap
        .list_mut(args[0].as_object())
        .elements
        .insert(index, args[2]);
    vm.grew(args[0].as_object());
    Ok(args[2])
}

fn remove_at(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = count(vm, args[0]);
    let index = validate_index(vm, args[1], length, "Index")?;
    Ok(vm.heap.list_mut(args[0].as_object()).elements.remove(index))
}

fn position(vm: &Vm, list: Value, value: Value) -> Option<usize> {
    vm.heap
        .list(list.as_object())
        .elements
        .iter()
        .position(|&element| vm.heap.values_equal(element, value))
}

fn remove(vm: &mut Vm, args: &[Value]) -> PrimResult {
    match position(vm, args[0], args[1]) {
        Some(index) => Ok(vm.heap.list_mut(args[0].as_object()).elements.remove(index)),
        None => Ok(Value::NULL),
    }
}

fn index_of(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let index = position(vm, args[0], args[1]);
    Ok(Value::num(index.map_or(-1.0, |i| i as f64)))
}

fn iterate(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = count(vm, args[0]);
    if args[1].is_null() {
        return Ok(if length == 0 {
            Value::FALSE
        } else {
            Value::num(0.0)
        });
    }

    let index = validate_int(vm, args[1], "Iterator")?;
    if index < 0.0 || index >= length as f64 - 1.0 {
        return Ok(Value::FALSE);
    }
    Ok(Value::num(index + 1.0))
}

fn iterator_value(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = count(vm, args[0]);
    let index = validate_index(vm, args[1], length, "Iterator")?;
    Ok(vm.heap.list(args[0].as_object()).elements[index])
}
