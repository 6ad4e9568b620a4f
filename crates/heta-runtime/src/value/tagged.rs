//! Portable tagged-enum value representation, selected when the
//! `nan-tagging` feature is off. Same API as the NaN-boxed form.

use super::CANONICAL_NAN_BITS;
use crate::heap::ObjRef;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Object(ObjRef),
    Undefined,
}

impl Value {
    pub const NULL: Value = Value::Null;
    pub const FALSE: Value = Value::Bool(false);
    pub const TRUE: Value = Value::Bool(true);
    pub const UNDEFINED: Value = Value::Undefined;

    #[inline]
    pub fn num(n: f64) -> Value {
        if n.is_nan() {
            Value::Num(f64::from_bits(CANONICAL_NAN_BITS))
        } else {
            Value::Num(n)
        }
    }

    #[inline]
    pub fn bool(b: bool) -> Value {
        Value::Bool(b)
    }

    #[inline]
    pub fn object(r: ObjRef) -> Value {
        Value::Object(r)
    }

    #[inline]
    pub fn is_num(self) -> bool {
        matches!(self, Value::Num(_))
    }

    #[inline]
    pub fn is_object(self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub fn is_undefined(self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn as_num(self) -> f64 {
        match self {
            Value::Num(n) => n,
            _ => {
                debug_assert!(false, "value is not a number");
                f64::from_bits(CANONICAL_NAN_BITS)
            }
        }
    }

    #[inline]
    pub fn as_bool(self) -> bool {
        debug_assert!(self.is_bool(), "value is not a bool");
        matches!(self, Value::Bool(true))
    }

    #[inline]
    pub fn as_object(self) -> ObjRef {
        match self {
            Value::Object(r) => r,
            _ => unreachable!("value is not an object"),
        }
    }

    /// A stable 64-bit image of the value, mirroring the boxed encoding for
    /// numbers.
    pub fn to_bits(self) -> u64 {
        match self {
            Value::Num(n) => n.to_bits(),
            Value::Object(r) => (1 << 63) | u64::from(r.index()),
            Value::Null => 1,
            Value::Bool(false) => 2,
            Value::Bool(true) => 3,
            Value::Undefined => 4,
        }
    }
}

/// Identity comparison: numbers compare by bit pattern, matching the boxed
/// representation where equal bits mean the same value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}
