//! Host-held references to VM values
//!
//! A [`Handle`] keeps one value alive across collections until the host
//! gives it back with [`Vm::release_handle`]. Handles are move-only tokens;
//! [`Vm::acquire_handle`] hands out another token for the same entry and
//! bumps its count, so an entry lives until every token is released.
//!
//! Call handles made by [`Vm::make_call_handle`] wrap a tiny function that
//! performs one method call. [`Vm::call`] runs it against the receiver and
//! arguments the host has placed in slots 0..=arity.
//!
//! ```
//! use heta_runtime::{Configuration, InterpretResult, Vm};
//!
//! let mut vm = Vm::new(Configuration::default());
//! let source = "class Adder {\n  static add(a, b) { a + b }\n}";
//! assert_eq!(vm.interpret("main", source), InterpretResult::Success);
//!
//! let add = vm.make_call_handle("add(_,_)").unwrap();
//! vm.ensure_slots(3);
//! vm.get_variable("main", "Adder", 0).unwrap();
//! vm.set_slot_double(1, 2.0).unwrap();
//! vm.set_slot_double(2, 3.0).unwrap();
//! assert_eq!(vm.call(&add).unwrap(), InterpretResult::Success);
//! assert_eq!(vm.get_slot_double(0).unwrap(), 5.0);
//! vm.release_handle(add).unwrap();
//! ```

use crate::error::{ApiError, ApiResult, InterpretResult};
use crate::value::Value;
use crate::vm::Vm;
use std::collections::HashMap;

/// A rooted reference to a VM value, owned by the host.
///
/// Not `Clone`: use [`Vm::acquire_handle`] for a second reference.
#[must_use = "a handle keeps its value alive until released"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    id: u64,
}

impl Handle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct Entry {
    value: Value,
    refs: usize,
}

/// Registry of live handles. Ids are never reused.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    entries: HashMap<u64, Entry>,
    next_id: u64,
}

impl HandleTable {
    pub fn insert(&mut self, value: Value) -> Handle {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert(id, Entry { value, refs: 1 });
        Handle { id }
    }

    pub fn get(&self, handle: &Handle) -> Option<Value> {
        self.entries.get(&handle.id).map(|entry| entry.value)
    }

    /// Every rooted value, for the collector.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.values().map(|entry| entry.value)
    }

    pub fn acquire(&mut self, handle: &Handle) -> Option<Handle> {
        let entry = self.entries.get_mut(&handle.id)?;
        entry.refs += 1;
        Some(Handle { id: handle.id })
    }

    /// Drop one reference. Returns false if the handle was unknown.
    pub fn release(&mut self, handle: Handle) -> bool {
        let Some(entry) = self.entries.get_mut(&handle.id) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            self.entries.remove(&handle.id);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Number of arguments a method signature takes: one per `_` in the
/// trailing parameter list and in a leading subscript.
fn signature_arity(signature: &str) -> ApiResult<usize> {
    let invalid = || ApiError::InvalidSignature(signature.to_string());
    if signature.is_empty() {
        return Err(invalid());
    }

    let mut arity = 0;
    if let Some(rest) = signature.strip_prefix('[') {
        let close = rest.find(']').ok_or_else(invalid)?;
        arity += rest[..close].matches('_').count();
    }
    if let Some(open) = signature.rfind('(') {
        if !signature.ends_with(')') {
            return Err(invalid());
        }
        arity += signature[open..].matches('_').count();
    }
    Ok(arity)
}

impl Vm {
    /// Root the value in `slot` and return a handle to it.
    pub fn get_slot_handle(&mut self, slot: usize) -> ApiResult<Handle> {
        let value = self.slot(slot)?;
        Ok(self.handles.insert(value))
    }

    /// Store the value `handle` refers to in `slot`.
    pub fn set_slot_handle(&mut self, slot: usize, handle: &Handle) -> ApiResult<()> {
        let value = self.handles.get(handle).ok_or(ApiError::StaleHandle)?;
        self.set_slot(slot, value)
    }

    /// Another reference to the same value.
    pub fn acquire_handle(&mut self, handle: &Handle) -> ApiResult<Handle> {
        self.handles.acquire(handle).ok_or(ApiError::StaleHandle)
    }

    /// Give a reference back. The value is unrooted once every reference
    /// to it has been released.
    pub fn release_handle(&mut self, handle: Handle) -> ApiResult<()> {
        if self.handles.release(handle) {
            Ok(())
        } else {
            Err(ApiError::StaleHandle)
        }
    }

    /// Number of distinct values currently held by handles.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// A handle that invokes `signature`, for use with [`Vm::call`].
    ///
    /// The signature is written as in script, such as `update(_,_)`,
    /// `count`, `[_]=(_)` or `call()`.
    pub fn make_call_handle(&mut self, signature: &str) -> ApiResult<Handle> {
        let arity = signature_arity(signature)?;
        if arity > crate::MAX_PARAMETERS {
            return Err(ApiError::InvalidSignature(signature.to_string()));
        }
        let symbol = self.method_names.ensure(&mut self.heap, signature);
        let stub = self.call_stub(arity, symbol, signature);
        Ok(self.handles.insert(Value::object(stub)))
    }

    /// Invoke a call handle on the receiver in slot 0 with arguments in the
    /// following slots. On success the result is left in slot 0.
    pub fn call(&mut self, method: &Handle) -> ApiResult<InterpretResult> {
        if self.poisoned {
            return Ok(InterpretResult::RuntimeError);
        }
        let stub = self.handles.get(method).ok_or(ApiError::StaleHandle)?;
        if !self.heap.is_closure(stub) {
            return Err(ApiError::NotCallable);
        }
        let arity = self.heap.closure(stub.as_object()).proto.arity;
        let frame = self.api.ok_or(ApiError::NotEnoughSlots {
            needed: arity + 1,
            available: 0,
        })?;
        let available = self.slot_count();
        if available < arity + 1 {
            return Err(ApiError::NotEnoughSlots {
                needed: arity + 1,
                available,
            });
        }

        let args: Vec<Value> = self.heap.fiber(frame.fiber).stack[frame.base..frame.base + arity + 1].to_vec();
        let result = self.run_nested(stub.as_object(), &args, true);
        if self.check_out_of_memory() {
            return Ok(InterpretResult::RuntimeError);
        }

        let stack = &mut self.heap.fiber_mut(frame.fiber).stack;
        stack.truncate(frame.base + 1);
        match result {
            Ok(value) => {
                stack[frame.base] = value;
                Ok(InterpretResult::Success)
            }
            Err(_) => Ok(InterpretResult::RuntimeError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("count", 0)]
    #[case("call()", 0)]
    #[case("add(_,_)", 2)]
    #[case("[_]", 1)]
    #[case("[_,_]=(_)", 3)]
    #[case("-", 0)]
    #[case("+(_)", 1)]
    fn arity_from_signature(#[case] signature: &str, #[case] arity: usize) {
        assert_eq!(signature_arity(signature), Ok(arity));
    }

    #[test]
    fn empty_signature_is_rejected() {
        assert!(matches!(
            signature_arity(""),
            Err(ApiError::InvalidSignature(_))
        ));
    }

    #[test]
    fn ids_are_not_reused() {
        let mut table = HandleTable::default();
        let first = table.insert(Value::NULL);
        let first_id = first.id();
        assert!(table.release(first));
        let second = table.insert(Value::TRUE);
        assert_ne!(second.id(), first_id);
        assert!(!table.release(Handle { id: first_id }));
    }

    #[test]
    fn entry_lives_until_every_reference_is_released() {
        let mut table = HandleTable::default();
        let handle = table.insert(Value::TRUE);
        let copy = table.acquire(&handle).unwrap();
        assert!(table.release(handle));
        assert_eq!(table.get(&copy), Some(Value::TRUE));
        assert!(table.release(copy));
        assert_eq!(table.len(), 0);
    }
}
