//! Compiled functions, closures and upvalues.

use crate::buffer::Buffer;
use crate::heap::ObjRef;
use crate::value::Value;
use std::sync::Arc;

/// A compiled function body. Immutable once the compiler hands it over, so
/// the interpreter shares it through an `Arc` and never has to hold a heap
/// borrow while executing.
#[derive(Debug)]
pub struct ObjFn {
    pub code: Buffer<u8>,
    pub constants: Vec<Value>,
    /// Module whose variables `LoadModuleVar`/`StoreModuleVar` address.
    pub module: ObjRef,
    pub arity: usize,
    pub num_upvalues: usize,
    /// Deepest operand stack use, relative to the frame start.
    pub max_slots: usize,
    pub debug: FnDebug,
}

/// Names and line numbers for stack traces.
#[derive(Debug, Default)]
pub struct FnDebug {
    pub name: String,
    /// Source line of each byte in `code`.
    pub lines: Buffer<u32>,
}

impl FnDebug {
    /// Line of the instruction that starts before `ip`.
    pub fn line_at(&self, ip: usize) -> u32 {
        let index = ip.saturating_sub(1);
        self.lines
            .get(index)
            .or_else(|| self.lines.last())
            .copied()
            .unwrap_or(0)
    }
}

impl ObjFn {
    pub fn byte_size(&self) -> usize {
        self.code.byte_size()
            + self.constants.capacity() * std::mem::size_of::<Value>()
            + self.debug.lines.byte_size()
            + self.debug.name.capacity()
    }
}

/// A function plus the variables it captured.
#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub proto: Arc<ObjFn>,
    pub upvalues: Vec<ObjRef>,
    /// Class the closure was bound to as a method. Field offsets and `super`
    /// dispatch start from here; nested closures inherit it.
    pub method_class: Option<ObjRef>,
}

/// A captured variable. Open upvalues alias a live stack slot of a fiber;
/// once that slot's frame returns the value moves into the upvalue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjUpvalue {
    Open { fiber: ObjRef, slot: usize },
    Closed(Value),
}
