//! NaN-boxed value representation.
//!
//! A double is stored as its own bits. Everything else hides inside the
//! quiet-NaN space:
//!
//! ```text
//! S 11111111111 11 .......................................... payload
//! ^ ^^^^^^^^^^^ ^^
//! | exponent    quiet bit + bit 50
//! sign bit: set for object references
//! ```
//!
//! Object references put the arena index in the low 32 bits with the sign
//! bit set. Singletons (null, false, true, undefined) use small tags in the
//! low bits with the sign bit clear. Any NaN produced by arithmetic is
//! rewritten to [`CANONICAL_NAN_BITS`](super::CANONICAL_NAN_BITS), which has
//! bit 50 clear and therefore never lands in the tag space.

use super::CANONICAL_NAN_BITS;
use crate::heap::ObjRef;
use std::fmt;

const SIGN_BIT: u64 = 1 << 63;
const QNAN: u64 = 0x7ffc_0000_0000_0000;

const TAG_NULL: u64 = 1;
const TAG_FALSE: u64 = 2;
const TAG_TRUE: u64 = 3;
const TAG_UNDEFINED: u64 = 4;

/// One-word tagged value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

const _: () = assert!(std::mem::size_of::<Value>() == 8);

impl Value {
    pub const NULL: Value = Value(QNAN | TAG_NULL);
    pub const FALSE: Value = Value(QNAN | TAG_FALSE);
    pub const TRUE: Value = Value(QNAN | TAG_TRUE);
    /// Marks a declared-but-unassigned module variable and empty map entries.
    /// Never visible to scripts or the host.
    pub const UNDEFINED: Value = Value(QNAN | TAG_UNDEFINED);

    #[inline]
    pub fn num(n: f64) -> Value {
        if n.is_nan() {
            Value(CANONICAL_NAN_BITS)
        } else {
            Value(n.to_bits())
        }
    }

    #[inline]
    pub fn bool(b: bool) -> Value {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    #[inline]
    pub fn object(r: ObjRef) -> Value {
        Value(SIGN_BIT | QNAN | u64::from(r.index()))
    }

    #[inline]
    pub fn is_num(self) -> bool {
        self.0 & QNAN != QNAN
    }

    #[inline]
    pub fn is_object(self) -> bool {
        self.0 & (QNAN | SIGN_BIT) == (QNAN | SIGN_BIT)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Value::NULL
    }

    #[inline]
    pub fn is_bool(self) -> bool {
        self == Value::TRUE || self == Value::FALSE
    }

    #[inline]
    pub fn is_undefined(self) -> bool {
        self == Value::UNDEFINED
    }

    /// The double inside a number value. The caller must have checked
    /// [`is_num`](Self::is_num).
    #[inline]
    pub fn as_num(self) -> f64 {
        debug_assert!(self.is_num(), "value is not a number");
        f64::from_bits(self.0)
    }

    #[inline]
    pub fn as_bool(self) -> bool {
        debug_assert!(self.is_bool(), "value is not a bool");
        self == Value::TRUE
    }

    /// The object reference inside an object value. The caller must have
    /// checked [`is_object`](Self::is_object).
    #[inline]
    pub fn as_object(self) -> ObjRef {
        debug_assert!(self.is_object(), "value is not an object");
        ObjRef::from_index((self.0 & 0xffff_ffff) as u32)
    }

    /// Raw encoding, exposed for tests and diagnostics.
    pub fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_num() {
            write!(f, "Num({})", self.as_num())
        } else if self.is_object() {
            write!(f, "Object({})", self.as_object().index())
        } else if *self == Value::NULL {
            f.write_str("Null")
        } else if *self == Value::TRUE {
            f.write_str("Bool(true)")
        } else if *self == Value::FALSE {
            f.write_str("Bool(false)")
        } else {
            f.write_str("Undefined")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arithmetic_nan_is_canonicalized() {
        let nan = f64::from_bits(0xfff8_0000_0000_0001);
        assert!(nan.is_nan());
        assert_eq!(Value::num(nan).to_bits(), CANONICAL_NAN_BITS);
        assert!(Value::num(0.0 / 0.0).is_num());
    }

    #[test]
    fn nan_with_tag_payload_is_not_an_object() {
        let forged = f64::from_bits(SIGN_BIT | QNAN | 7);
        let value = Value::num(forged);
        assert!(value.is_num());
        assert!(!value.is_object());
    }

    #[test]
    fn singletons_are_distinct() {
        let all = [Value::NULL, Value::FALSE, Value::TRUE, Value::UNDEFINED];
        for (i, a) in all.iter().enumerate() {
            assert!(!a.is_num());
            assert!(!a.is_object());
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn object_index_survives_boxing() {
        let r = ObjRef::from_index(u32::MAX);
        let value = Value::object(r);
        assert!(value.is_object());
        assert_eq!(value.as_object(), r);
    }
}
