//! `Range`

use super::{primitive, validate_num, PrimResult};
use crate::object::ObjRange;
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm) {
    let range = vm.core.range;

    primitive(vm, range, "from", |vm, args| Ok(Value::num(get(vm, args).from)));
    primitive(vm, range, "to", |vm, args| Ok(Value::num(get(vm, args).to)));
    primitive(vm, range, "min", |vm, args| {
        let r = get(vm, args);
        Ok(Value::num(r.from.min(r.to)))
    });
    primitive(vm, range, "max", |vm, args| {
        let r = get(vm, args);
        Ok(Value::num(r.from.max(r.to)))
    });
    primitive(vm, range, "isInclusive", |vm, args| {
        Ok(Value::bool(get(vm, args).is_inclusive))
    });
    primitive(vm, range, "iterate(_)", iterate);
    primitive(vm, range, "iteratorValue(_)", |_, args| Ok(args[1]));
    primitive(vm, range, "toString", super::object::to_string);
}

fn get(vm: &Vm, args: &[Value]) -> ObjRange {
    *vm.heap.range(args[0].as_object())
}

/// Counts from `from` towards `to` in steps of one, in either direction.
fn iterate(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let range = get(vm, args);

    if range.from == range.to && !range.is_inclusive {
        return Ok(Value::FALSE);
    }
    if args[1].is_null() {
        return Ok(Value::num(range.from));
    }

    let mut iterator = validate_num(vm, args[1], "Iterator")?;
    if range.from < range.to {
        iterator += 1.0;
        if iterator > range.to {
            return Ok(Value::FALSE);
        }
    } else {
        iterator -= 1.0;
        if iterator < range.to {
            return Ok(Value::FALSE);
        }
    }

    if !range.is_inclusive && iterator == range.to {
        return Ok(Value::FALSE);
    }
    Ok(Value::num(iterator))
}
