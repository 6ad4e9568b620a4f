//! Call frame for method and function invocations

use crate::heap::ObjRef;
use crate::object::ObjFn;
use std::sync::Arc;

/// One activation on a fiber's call stack.
///
/// Slot 0 of every frame holds the receiver (`this` for methods, the function
/// itself for blocks); arguments follow, then locals and temporaries.
///
/// ```text
/// fiber stack:  [.. caller temporaries ..][recv][arg1][arg2][local1]..
///                                          ^
///                                          stack_start
/// ```
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Closure being executed
    pub closure: ObjRef,
    /// Shared body of that closure, cached to avoid heap lookups per instruction
    pub proto: Arc<ObjFn>,
    /// Offset of the next instruction to execute
    pub ip: usize,
    /// Stack index of slot 0
    pub stack_start: usize,
}
