//! `Num`

use super::{primitive, static_primitive, validate_num, PrimResult};
use crate::object::{ObjKind, ObjRange};
use crate::value::Value;
use crate::vm::Vm;

pub(super) fn bind(vm: &mut Vm) {
    let num = vm.core.num;

    static_primitive(vm, num, "fromString(_)", from_string);
    static_primitive(vm, num, "infinity", |_, _| Ok(Value::num(f64::INFINITY)));
    static_primitive(vm, num, "nan", |_, _| Ok(Value::num(f64::NAN)));
    static_primitive(vm, num, "pi", |_, _| Ok(Value::num(std::f64::consts::PI)));
    static_primitive(vm, num, "tau", |_, _| Ok(Value::num(std::f64::consts::TAU)));
    static_primitive(vm, num, "largest", |_, _| Ok(Value::num(f64::MAX)));
    static_primitive(vm, num, "smallest", |_, _| {
        Ok(Value::num(f64::MIN_POSITIVE))
    });

    primitive(vm, num, "+(_)", add);
    primitive(vm, num, "-(_)", subtract);
    primitive(vm, num, "*(_)", multiply);
    primitive(vm, num, "/(_)", divide);
    primitive(vm, num, "%(_)", modulo);
    primitive(vm, num, "<(_)", less);
    primitive(vm, num, ">(_)", greater);
    primitive(vm, num, "<=(_)", less_eq);
    primitive(vm, num, ">=(_)", greater_eq);
    primitive(vm, num, "&(_)", bit_and);
    primitive(vm, num, "|(_)", bit_or);
    primitive(vm, num, "^(_)", bit_xor);
    primitive(vm, num, "<<(_)", shift_left);
    primitive(vm, num, ">>(_)", shift_right);
    primitive(vm, num, "==(_)", eqeq);
    primitive(vm, num, "!=(_)", bangeq);
    primitive(vm, num, "..(_)", inclusive_range);
    primitive(vm, num, "...(_)", exclusive_range);
    primitive(vm, num, "min(_)", min);
    primitive(vm, num, "max(_)", max);
    primitive(vm, num, "pow(_)", pow);
    primitive(vm, num, "atan(_)", atan2);

    primitive(vm, num, "-", |_, args| Ok(Value::num(-args[0].as_num())));
    primitive(vm, num, "~", |_, args| {
        Ok(Value::num(f64::from(!(args[0].as_num() as u32))))
    });
    primitive(vm, num, "abs", |_, args| Ok(unary(args, f64::abs)));
    primitive(vm, num, "acos", |_, args| Ok(unary(args, f64::acos)));
    primitive(vm, num, "asin", |_, args| Ok(unary(args, f64::asin)));
    primitive(vm, num, "atan", |_, args| Ok(unary(args, f64::atan)));
    primitive(vm, num, "cbrt", |_, args| Ok(unary(args, f64::cbrt)));
    primitive(vm, num, "ceil", |_, args| Ok(unary(args, f64::ceil)));
    primitive(vm, num, "cos", |_, args| Ok(unary(args, f64::cos)));
    primitive(vm, num, "exp", |_, args| Ok(unary(args, f64::exp)));
    primitive(vm, num, "floor", |_, args| Ok(unary(args, f64::floor)));
    primitive(vm, num, "log", |_, args| Ok(unary(args, f64::ln)));
    primitive(vm, num, "log2", |_, args| Ok(unary(args, f64::log2)));
    primitive(vm, num, "round", |_, args| Ok(unary(args, f64::round)));
    primitive(vm, num, "sin", |_, args| Ok(unary(args, f64::sin)));
    primitive(vm, num, "sqrt", |_, args| Ok(unary(args, f64::sqrt)));
    primitive(vm, num, "tan", |_, args| Ok(unary(args, f64::tan)));
    primitive(vm, num, "truncate", |_, args| Ok(unary(args, f64::trunc)));
    primitive(vm, num, "fraction", |_, args| Ok(unary(args, f64::fract)));
    primitive(vm, num, "sign", |_, args| Ok(unary(args, sign)));
    primitive(vm, num, "isInteger", |_, args| {
        let n = args[0].as_num();
        Ok(Value::bool(n.is_finite() && n.trunc() == n))
    });
    primitive(vm, num, "isNan", |_, args| Ok(Value::bool(args[0].as_num().is_nan())));
    primitive(vm, num, "isInfinity", |_, args| {
        Ok(Value::bool(args[0].as_num().is_infinite()))
    });
    primitive(vm, num, "toString", super::object::to_string);
}

fn unary(args: &[Value], op: fn(f64) -> f64) -> Value {
    Value::num(op(args[0].as_num()))
}

fn sign(n: f64) -> f64 {
    if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// The receiver and a numeric right operand.
fn operands(vm: &mut Vm, args: &[Value]) -> Result<(f64, f64), super::Control> {
    let right = validate_num(vm, args[1], "Right operand")?;
    Ok((args[0].as_num(), right))
}

macro_rules! arithmetic {
    ($($name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            fn $name(vm: &mut Vm, args: &[Value]) -> PrimResult {
                let ($a, $b) = operands(vm, args)?;
                Ok(Value::num($body))
            }
        )*
    };
}

macro_rules! comparison {
    ($($name:ident => $op:tt;)*) => {
        $(
            fn $name(vm: &mut Vm, args: &[Value]) -> PrimResult {
                let (a, b) = operands(vm, args)?;
                Ok(Value::bool(a $op b))
            }
        )*
    };
}

arithmetic! {
    add => |a, b| a + b;
    subtract => |a, b| a - b;
    multiply => |a, b| a * b;
    divide => |a, b| a / b;
    modulo => |a, b| a % b;
    min => |a, b| a.min(b);
    max => |a, b| a.max(b);
    pow => |a, b| a.powf(b);
    atan2 => |a, b| a.atan2(b);
    bit_and => |a, b| f64::from((a as u32) & (b as u32));
    bit_or => |a, b| f64::from((a as u32) | (b as u32));
    bit_xor => |a, b| f64::from((a as u32) ^ (b as u32));
    shift_left => |a, b| f64::from((a as u32).wrapping_shl(b as u32));
    shift_right => |a, b| f64::from((a as u32).wrapping_shr(b as u32));
}

comparison! {
    less => <;
    greater => >;
    less_eq => <=;
    greater_eq => >=;
}

fn eqeq(_vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(
        args[1].try_num().is_some_and(|b| args[0].as_num() == b),
    ))
}

fn bangeq(_vm: &mut Vm, args: &[Value]) -> PrimResult {
    Ok(Value::bool(
        !args[1].try_num().is_some_and(|b| args[0].as_num() == b),
    ))
}

fn inclusive_range(vm: &mut Vm, args: &[Value]) -> PrimResult {
    make_range(vm, args, true)
}

fn exclusive_range(vm: &mut Vm, args: &[Value]) -> PrimResult {
    make_range(vm, args, false)
}

fn make_range(vm: &mut Vm, args: &[Value], is_inclusive: bool) -> PrimResult {
    let (from, to) = operands(vm, args)?;
    let range = ObjRange {
        from,
        to,
        is_inclusive,
    };
    let class = vm.core.range;
    Ok(Value::object(vm.allocate(Some(class), ObjKind::Range(range))))
}

fn from_string(vm: &mut Vm, args: &[Value]) -> PrimResult {
    let string = super::validate_string(vm, args[1], "Argument")?;
    let text = vm.heap.string(string).to_string_lossy();
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::NULL);
    }
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok().map(|n| n as f64),
        None => text
            .parse::<f64>()
            .ok()
            .filter(|_| text.bytes().all(|b| b.is_ascii_digit() || b"+-.eE".contains(&b))),
    };
    Ok(parsed.map_or(Value::NULL, Value::num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(3.5, 1.0)]
    #[case(-0.25, -1.0)]
    #[case(0.0, 0.0)]
    fn sign_of(#[case] n: f64, #[case] expected: f64) {
        assert_eq!(sign(n), expected);
    }
}
