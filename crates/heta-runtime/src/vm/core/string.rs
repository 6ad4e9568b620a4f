//! `String`
//!
//! Strings are byte sequences, usually UTF-8. Indexes are byte offsets;
//! iteration and subscripting step by code point where the bytes decode.

use super::{
    calculate_range, primitive, range_indices, static_primitive, validate_index, validate_int,
    validate_string, PrimResult,
};
use crate::heap::ObjRef;
use crate::utils::{utf8_decode, utf8_decode_num_bytes, utf8_encode};
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm) {
    let string = vm.core.string;

    static_primitive(vm, string, "fromCodePoint(_)", from_code_point);
    static_primitive(vm, string, "fromByte(_)", from_byte);

    primitive(vm, string, "+(_)", plus);
    primitive(vm, string, "[_]", subscript);
    primitive(vm, string, "byteAt(_)", byte_at);
    primitive(vm, string, "byteCount", |vm, args| {
        Ok(Value::num(bytes(vm, args[0]).len() as f64))
    });
    primitive(vm, string, "count", |vm, args| {
        let count = bytes(vm, args[0])
            .iter()
            .filter(|&&b| b & 0xc0 != 0x80)
            .count();
        Ok(Value::num(count as f64))
    });
    primitive(vm, string, "contains(_)", contains);
    primitive(vm, string, "startsWith(_)", starts_with);
    primitive(vm, string, "endsWith(_)", ends_with);
    primitive(vm, string, "indexOf(_)", index_of);
    primitive(vm, string, "indexOf(_,_)", index_of_from);
    primitive(vm, string, "iterate(_)", iterate);
    primitive(vm, string, "iteratorValue(_)", iterator_value);
    primitive(vm, string, "toString", |_, args| Ok(args[0]));
}

fn bytes(vm: &Vm, value: Value) -> &[u8] {
    vm.heap.string(value.as_object()).as_bytes()
}

/// The code point starting at byte `index` as a new string. Bytes that do
/// not start a valid sequence come back as a one-byte string.
fn code_point_at(vm: &mut Vm, string: ObjRef, index: usize) -> Value {
    let bytes = vm.heap.string(string).as_bytes();
    let piece = match utf8_decode(&bytes[index..]) {
        Some(_) => bytes[index..index + utf8_decode_num_bytes(bytes[index])].to_vec(),
        None => vec![bytes[index]],
    };
    vm.new_bytes_value(&piece)
}

fn from_code_point(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let n = validate_int(vm, args[1], "Code point")?;
    if n < 0.0 {
        return vm.fail("Code point cannot be negative.");
    }
    if n > f64::from(0x10_ffff) {
        return vm.fail("Code point cannot be greater than 0x10ffff.");
    }
    let mut out = Vec::with_capacity(4);
    utf8_encode(n as u32, &mut out);
    Ok(vm.new_bytes_value(&out))
}

fn from_byte(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let n = validate_int(vm, args[1], "Byte")?;
    if n < 0.0 {
        return vm.fail("Byte cannot be negative.");
    }
    if n > 255.0 {
        return vm.fail("Byte cannot be greater than 0xff.");
    }
    Ok(vm.new_bytes_value(&[n as u8]))
}

fn plus(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Right operand")?;
    let mut joined = bytes(vm, args[0]).to_vec();
    joined.extend_from_slice(bytes(vm, args[1]));
    Ok(vm.new_bytes_value(&joined))
}

fn subscript(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let string = args[0].as_object();
    let length = vm.heap.string(string).len();

    if args[1].is_num() {
        let index = validate_index(vm, args[1], length, "Subscript")?;
        return Ok(code_point_at(vm, string, index));
    }
    if !vm.heap.is_range(args[1]) {
        return vm.fail("Subscript must be a number or a range.");
    }

    let (start, count, step) = calculate_range(vm, args[1].as_object(), length)?;
    let source = vm.heap.string(string).as_bytes();
    let slice: Vec<u8> = range_indices(start, count, step)
        .map(|i| source[i])
        .collect();
    Ok(vm.new_bytes_value(&slice))
}

fn byte_at(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = bytes(vm, args[0]).len();
    let index = validate_index(vm, args[1], length, "Index")?;
    Ok(Value::num(f64::from(bytes(vm, args[0])[index])))
}

fn find(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(start.min(haystack.len()));
    }
    haystack
        .get(start..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| start + offset)
}

fn contains(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Argument")?;
    let found = find(bytes(vm, args[0]), bytes(vm, args[1]), 0).is_some();
    Ok(Value::bool(found))
}

fn starts_with(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Argument")?;
    Ok(Value::bool(bytes(vm, args[0]).starts_with(bytes(vm, args[1]))))
}

fn ends_with(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Argument")?;
    Ok(Value::bool(bytes(vm, args[0]).ends_with(bytes(vm, args[1]))))
}

fn index_of(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Argument")?;
    let index = find(bytes(vm, args[0]), bytes(vm, args[1]), 0);
    Ok(Value::num(index.map_or(-1.0, |i| i as f64)))
}

fn index_of_from(vm: &mut Vm, args: &[Value]) -> PrimResult {
    validate_string(vm, args[1], "Argument")?;
    let length = bytes(vm, args[0]).len();
    let start = validate_index(vm, args[2], length, "Start")?;
    let index = find(bytes(vm, args[0]), bytes(vm, args[1]), start);
    Ok(Value::num(index.map_or(-1.0, |i| i as f64)))
}

/// Iterator values are byte offsets of each code point.
fn iterate(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let length = bytes(vm, args[0]).len();
    if args[1].is_null() {
        return Ok(if length == 0 {
            Value::FALSE
        } else {
            Value::num(0.0)
        });
    }

    let n = validate_int(vm, args[1], "Iterator")?;
    if n < 0.0 {
        return Ok(Value::FALSE);
    }
    let source = bytes(vm, args[0]);
    let mut index = n as usize;
    loop {
        index += 1;
        if index >= length {
            return Ok(Value::FALSE);
        }
        if source[index] & 0xc0 != 0x80 {
            return Ok(Value::num(index as f64));
        }
    }
}

fn iterator_value(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let string = args[0].as_object();
    let length = vm.heap.string(string).len();
    let index = validate_index(vm, args[1], length, "Iterator")?;
    Ok(code_point_at(vm, string, index))
}
