//! Result codes and error types at the host boundary
//!
//! Script errors never cross the API as Rust errors: compile and runtime
//! failures are reported through the configured [`ErrorReporter`] and
//! summarized by an [`InterpretResult`]. Misuse of the slot and handle API, by
//! contrast, is the host's bug and comes back as an [`ApiError`].
//!
//! [`ErrorReporter`]: crate::config::ErrorReporter

use thiserror::Error;

/// Outcome of `interpret`, `call` and `complete_module_load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Success,
    CompileError,
    RuntimeError,
}

/// Which kind of report an error callback is receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A compile error, with module and line.
    Compile,
    /// The message of an unhandled runtime error. No module or line.
    Runtime,
    /// One frame of the stack trace following a runtime error.
    StackTrace,
}

/// Type of the value in a slot, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Bool,
    Num,
    Foreign,
    List,
    Map,
    Null,
    String,
    /// Any other object: classes, fibers, functions, instances, ranges.
    Unknown,
}

/// Misuse of the slot, handle or module API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("slot {slot} is out of range; only {count} slots are available")]
    SlotOutOfRange { slot: usize, count: usize },

    #[error("slot {slot} holds {found:?}, expected {expected:?}")]
    TypeMismatch {
        slot: usize,
        expected: SlotType,
        found: SlotType,
    },

    #[error("index {index} is out of bounds for a list of {count} elements")]
    IndexOutOfBounds { index: i64, count: usize },

    #[error("string in slot {slot} is not valid UTF-8")]
    InvalidUtf8 { slot: usize },

    #[error("slot {slot} does not hold a foreign class")]
    NotAForeignClass { slot: usize },

    #[error("handle has been released or belongs to another VM")]
    StaleHandle,

    #[error("handle does not refer to a callable method stub")]
    NotCallable,

    #[error("method expects {needed} slots but only {available} are available")]
    NotEnoughSlots { needed: usize, available: usize },

    #[error("invalid method signature '{0}'")]
    InvalidSignature(String),

    #[error("module '{0}' is not loaded")]
    UnknownModule(String),

    #[error("module '{module}' has no variable named '{name}'")]
    UnknownVariable { module: String, name: String },

    #[error("no fiber is currently running")]
    NoActiveFiber,

    #[error("abort_fiber can only be called from a foreign method")]
    NotInForeignCall,

    #[error("{0}")]
    Message(String),
}

impl ApiError {
    /// An error carrying a free-form message, for foreign methods that want
    /// to abort the calling fiber with their own text.
    pub fn msg(message: impl Into<String>) -> Self {
        ApiError::Message(message.into())
    }
}

/// Result type for slot and handle operations
pub type ApiResult<T> = Result<T, ApiError>;
