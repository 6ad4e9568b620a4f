//! Runtime value representation
//!
//! Every script value is a [`Value`]: null, a boolean, a double, or a
//! reference to a heap object. Two interchangeable encodings exist:
//!
//! - `nan-tagging` (default): one machine word, doubles stored as-is and the
//!   other kinds packed into the quiet-NaN space.
//! - otherwise: a plain tagged enum.
//!
//! Both expose the same constructors and predicates, so the rest of the
//! engine never looks at the encoding. Values are `Copy`; equality through
//! `==` is identity (same bits, same object). Script-level equality, which
//! compares strings and ranges by content, lives on the heap.

#[cfg(feature = "nan-tagging")]
mod nan;
#[cfg(feature = "nan-tagging")]
pub use nan::Value;

#[cfg(not(feature = "nan-tagging"))]
mod tagged;
#[cfg(not(feature = "nan-tagging"))]
pub use tagged::Value;

/// The single bit pattern every NaN is normalized to before it is stored.
pub const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

impl Value {
    /// `false` and `null` are falsy; everything else, including `0`, is truthy.
    #[inline]
    pub fn is_falsy(self) -> bool {
        self == Value::FALSE || self == Value::NULL
    }

    /// The number inside, if this is a number.
    #[inline]
    pub fn try_num(self) -> Option<f64> {
        self.is_num().then(|| self.as_num())
    }

    /// The object reference inside, if this is an object.
    #[inline]
    pub fn try_object(self) -> Option<crate::heap::ObjRef> {
        self.is_object().then(|| self.as_object())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NULL
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::num(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}
