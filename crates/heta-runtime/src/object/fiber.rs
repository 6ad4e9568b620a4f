//! Fibers: independent call stacks for cooperative execution.

use crate::heap::ObjRef;
use crate::value::Value;
use crate::vm::CallFrame;

/// Where a fiber is in its life.
///
/// A fiber that calls another keeps its own state and becomes the callee's
/// `caller` link. Control returns to it when the callee yields, finishes or
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Created but never run.
    Other,
    /// Executing, or blocked on a fiber it called.
    Running,
    /// Yielded; resumable with `call` or `try`.
    Suspended,
    /// Running as an error boundary: a runtime error inside it is handed to
    /// its caller as the result of `try` instead of propagating.
    Try,
    /// Parked on a deferred module load.
    AwaitingImport,
    /// Returned from its last frame or aborted.
    Done,
}

#[derive(Debug, Clone)]
pub struct ObjFiber {
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    /// Open upvalues as `(slot, upvalue)`, sorted by slot.
    pub open_upvalues: Vec<(usize, ObjRef)>,
    pub caller: Option<ObjRef>,
    /// Error value, `null` while the fiber is healthy.
    pub error: Value,
    pub state: FiberState,
}

impl ObjFiber {
    /// An empty fiber with no frames, used to host API slots.
    pub fn empty() -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            open_upvalues: Vec::new(),
            caller: None,
            error: Value::NULL,
            state: FiberState::Other,
        }
    }

    /// A fiber whose first frame will run `frame` with `receiver` in slot 0.
    pub fn with_frame(receiver: Value, frame: CallFrame) -> Self {
        let mut stack = Vec::with_capacity(frame.proto.max_slots.max(1) + 1);
        stack.push(receiver);
        Self {
            stack,
            frames: vec![frame],
            ..Self::empty()
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_null()
    }

    pub fn is_done(&self) -> bool {
        self.state == FiberState::Done || self.frames.is_empty() || self.has_error()
    }

    /// Whether the fiber has not executed any instruction of its entry frame.
    pub fn is_fresh(&self) -> bool {
        self.frames.len() == 1 && self.frames[0].ip == 0
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Reserve room for a frame whose slots start at `start`, so pushes
    /// while it runs do not reallocate.
    pub fn ensure_stack(&mut self, start: usize, slots: usize) {
        let needed = start + slots + 1;
        if needed > self.stack.capacity() {
            self.stack.reserve(needed - self.stack.len());
        }
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::NULL)
    }

    pub fn peek(&self, depth: usize) -> Value {
        self.stack[self.stack.len() - 1 - depth]
    }

    pub fn byte_size(&self) -> usize {
        self.stack.capacity() * std::mem::size_of::<Value>()
            + self.frames.capacity() * std::mem::size_of::<CallFrame>()
            + self.open_upvalues.capacity() * std::mem::size_of::<(usize, ObjRef)>()
    }
}
