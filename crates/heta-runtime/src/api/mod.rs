//! The slot API: how host code reads and writes VM values
//!
//! Values cross the boundary through numbered *slots*, a window onto the
//! stack of the fiber that is talking to the host. Inside a foreign method
//! slot 0 is the receiver and the arguments follow; the method leaves its
//! result in slot 0. Outside of any call, [`Vm::ensure_slots`] creates a
//! scratch window the host can use to prepare arguments for [`Vm::call`].
//!
//! Every accessor checks its slot index and the type of the value it finds
//! and reports misuse as an [`ApiError`] instead of trusting the caller.
//!
//! ```
//! use heta_runtime::{Configuration, SlotType, Vm};
//!
//! let mut vm = Vm::new(Configuration::default());
//! vm.ensure_slots(2);
//! vm.set_slot_new_list(0).unwrap();
//! vm.set_slot_double(1, 1.5).unwrap();
//! vm.insert_in_list(0, -1, 1).unwrap();
//! assert_eq!(vm.get_list_count(0).unwrap(), 1);
//! assert_eq!(vm.get_slot_type(0).unwrap(), SlotType::List);
//! ```

pub mod handle;
pub mod native;

use crate::error::{ApiError, ApiResult, SlotType};
use crate::object::{ObjFiber, ObjForeign, ObjKind};
use crate::utils::validate_index;
use crate::value::Value;
use crate::vm::core::{new_list, new_map};
use crate::vm::{ApiFrame, Vm};

impl Vm {
    fn api_frame(&self) -> ApiResult<ApiFrame> {
        self.api.ok_or(ApiError::NoActiveFiber)
    }

    /// Number of slots currently addressable.
    pub fn slot_count(&self) -> usize {
        self.api.map_or(0, |frame| {
            self.heap.fiber(frame.fiber).stack.len() - frame.base
        })
    }

    /// Make at least `count` slots addressable. New slots hold `null`.
    pub fn ensure_slots(&mut self, count: usize) {
        let frame = match self.api {
            Some(frame) => frame,
            None => {
                let fiber = self.allocate(Some(self.core.fiber), ObjKind::Fiber(ObjFiber::empty()));
                let frame = ApiFrame {
                    fiber,
                    base: 0,
                    foreign: false,
                };
                self.api = Some(frame);
                frame
            }
        };
        let stack = &mut self.heap.fiber_mut(frame.fiber).stack;
        if stack.len() < frame.base + count {
            stack.resize(frame.base + count, Value::NULL);
            self.grew(frame.fiber);
        }
    }

    pub(crate) fn slot(&self, slot: usize) -> ApiResult<Value> {
        let frame = self.api_frame()?;
        let stack = &self.heap.fiber(frame.fiber).stack;
        stack
            .get(frame.base + slot)
            .copied()
            .ok_or(ApiError::SlotOutOfRange {
                slot,
                count: stack.len() - frame.base,
            })
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) -> ApiResult<()> {
        let frame = self.api_frame()?;
        let stack = &mut self.heap.fiber_mut(frame.fiber).stack;
        let count = stack.len() - frame.base;
        match stack.get_mut(frame.base + slot) {
            Some(target) => {
                *target = value;
                Ok(())
            }
            None => Err(ApiError::SlotOutOfRange { slot, count }),
        }
    }

    fn slot_type_of(&self, value: Value) -> SlotType {
        if value.is_bool() {
            SlotType::Bool
        } else if value.is_num() {
            SlotType::Num
        } else if value.is_null() {
            SlotType::Null
        } else if self.heap.is_string(value) {
            SlotType::String
        } else if self.heap.is_list(value) {
            SlotType::List
        } else if self.heap.is_map(value) {
            SlotType::Map
        } else if self.heap.is_foreign(value) {
            SlotType::Foreign
        } else {
            SlotType::Unknown
        }
    }

    /// Check that `slot` holds a value of type `expected`.
    fn typed_slot(&self, slot: usize, expected: SlotType) -> ApiResult<Value> {
        let value = self.slot(slot)?;
        let found = self.slot_type_of(value);
        if found == expected {
            Ok(value)
        } else {
            Err(ApiError::TypeMismatch {
                slot,
                expected,
                found,
            })
        }
    }

    pub fn get_slot_type(&self, slot: usize) -> ApiResult<SlotType> {
        Ok(self.slot_type_of(self.slot(slot)?))
    }

    pub fn get_slot_bool(&self, slot: usize) -> ApiResult<bool> {
        Ok(self.typed_slot(slot, SlotType::Bool)?.as_bool())
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) -> ApiResult<()> {
        self.set_slot(slot, Value::bool(value))
    }

    pub fn get_slot_double(&self, slot: usize) -> ApiResult<f64> {
        Ok(self.typed_slot(slot, SlotType::Num)?.as_num())
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) -> ApiResult<()> {
        self.set_slot(slot, Value::num(value))
    }

    pub fn set_slot_null(&mut self, slot: usize) -> ApiResult<()> {
        self.set_slot(slot, Value::NULL)
    }

    /// Raw bytes of the string in `slot`. Strings may hold any bytes.
    pub fn get_slot_bytes(&self, slot: usize) -> ApiResult<&[u8]> {
        let value = self.typed_slot(slot, SlotType::String)?;
        Ok(self.heap.string(value.as_object()).as_bytes())
    }

    pub fn get_slot_string(&self, slot: usize) -> ApiResult<&str> {
        let value = self.typed_slot(slot, SlotType::String)?;
        self.heap
            .string(value.as_object())
            .to_str()
            .ok_or(ApiError::InvalidUtf8 { slot })
    }

    pub fn set_slot_string(&mut self, slot: usize, text: &str) -> ApiResult<()> {
        self.set_slot_bytes(slot, text.as_bytes())
    }

    pub fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]) -> ApiResult<()> {
        self.slot(slot)?;
        let value = self.new_bytes_value(bytes);
        self.set_slot(slot, value)
    }

    /// Payload of the foreign instance in `slot`.
    pub fn get_slot_foreign(&mut self, slot: usize) -> ApiResult<&mut [u8]> {
        let value = self.typed_slot(slot, SlotType::Foreign)?;
        Ok(&mut self.heap.foreign_mut(value.as_object()).data)
    }

    /// Create an instance of the foreign class in `class_slot` with a zeroed
    /// payload of `size` bytes, store it in `slot` and return the payload.
    pub fn set_slot_new_foreign(
        &mut self,
        slot: usize,
        class_slot: usize,
        size: usize,
    ) -> ApiResult<&mut [u8]> {
        self.slot(slot)?;
        let class = self.slot(class_slot)?;
        if !self.heap.is_class(class) || !self.heap.class(class.as_object()).is_foreign {
            return Err(ApiError::NotAForeignClass { slot: class_slot });
        }
        let class = class.as_object();
        let finalizer = self.heap.class(class).foreign.finalize.clone();
        let instance = self.allocate(Some(class), ObjKind::Foreign(ObjForeign::new(size, finalizer)));
        self.set_slot(slot, Value::object(instance))?;
        Ok(&mut self.heap.foreign_mut(instance).data)
    }

    pub fn set_slot_new_list(&mut self, slot: usize) -> ApiResult<()> {
        self.slot(slot)?;
        let list = new_list(self, Vec::new());
        self.set_slot(slot, list)
    }

    pub fn set_slot_new_map(&mut self, slot: usize) -> ApiResult<()> {
        self.slot(slot)?;
        let map = new_map(self);
        self.set_slot(slot, map)
    }

    pub fn get_list_count(&self, slot: usize) -> ApiResult<usize> {
        let list = self.typed_slot(slot, SlotType::List)?;
        Ok(self.heap.list(list.as_object()).elements.count())
    }

    /// Resolve `index` against the list in `list_slot`; negative indices
    /// count from the end. `extra` widens the valid range for insertion.
    fn list_index(&self, list_slot: usize, index: i64, extra: usize) -> ApiResult<(Value, usize)> {
        let list = self.typed_slot(list_slot, SlotType::List)?;
        let count = self.heap.list(list.as_object()).elements.count();
        validate_index(count + extra, index)
            .map(|i| (list, i))
            .ok_or(ApiError::IndexOutOfBounds { index, count })
    }

    /// Copy element `index` of the list in `list_slot` into `element_slot`.
    pub fn get_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) -> ApiResult<()> {
        let (list, index) = self.list_index(list_slot, index, 0)?;
        let element = self.heap.list(list.as_object()).elements[index];
        self.set_slot(element_slot, element)
    }

    pub fn set_list_element(&mut self, list_slot: usize, index: i64, element_slot: usize) -> ApiResult<()> {
        let (list, index) = self.list_index(list_slot, index, 0)?;
        let element = self.slot(element_slot)?;
        self.heap.list_mut(list.as_object()).elements[index] = element;
        Ok(())
    }

    /// Insert the value in `element_slot` before `index`. An index of the
    /// list's count, or `-1`, appends.
    pub fn insert_in_list(&mut self, list_slot: usize, index: i64, element_slot: usize) -> ApiResult<()> {
        let (list, index) = self.list_index(list_slot, index, 1)?;
        let element = self.slot(element_slot)?;
        self.heap
            .list_mut(list.as_object())
            .elements
            .insert(index, element);
        self.grew(list.as_object());
        Ok(())
    }

    pub fn get_map_count(&self, slot: usize) -> ApiResult<usize> {
        let map = self.typed_slot(slot, SlotType::Map)?;
        Ok(self.heap.map(map.as_object()).count())
    }

    fn map_key(&self, map_slot: usize, key_slot: usize) -> ApiResult<(Value, Value)> {
        let map = self.typed_slot(map_slot, SlotType::Map)?;
        let key = self.slot(key_slot)?;
        Ok((map, key))
    }

    pub fn get_map_contains_key(&self, map_slot: usize, key_slot: usize) -> ApiResult<bool> {
        let (map, key) = self.map_key(map_slot, key_slot)?;
        Ok(self.heap.map_get(map.as_object(), key).is_some())
    }

    /// Copy the value for the key in `key_slot` into `value_slot`, or
    /// `null` if the map has no such key.
    pub fn get_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) -> ApiResult<()> {
        let (map, key) = self.map_key(map_slot, key_slot)?;
        let value = self.heap.map_get(map.as_object(), key).unwrap_or(Value::NULL);
        self.set_slot(value_slot, value)
    }

    pub fn set_map_value(&mut self, map_slot: usize, key_slot: usize, value_slot: usize) -> ApiResult<()> {
        let (map, key) = self.map_key(map_slot, key_slot)?;
        let value = self.slot(value_slot)?;
        self.heap.map_set(map.as_object(), key, value);
        self.grew(map.as_object());
        Ok(())
    }

    /// Remove a key, leaving its old value (or `null`) in `removed_slot`.
    pub fn remove_map_value(&mut self, map_slot: usize, key_slot: usize, removed_slot: usize) -> ApiResult<()> {
        let (map, key) = self.map_key(map_slot, key_slot)?;
        self.slot(removed_slot)?;
        let removed = self.heap.map_remove(map.as_object(), key).unwrap_or(Value::NULL);
        self.set_slot(removed_slot, removed)
    }

    /// Load the top-level variable `name` of `module` into `slot`.
    pub fn get_variable(&mut self, module: &str, name: &str, slot: usize) -> ApiResult<()> {
        let value = self.module_variable(module, name)?;
        self.set_slot(slot, value)
    }

    /// Abort the fiber that called the current foreign method, with the
    /// value in `slot` as its error. Only valid inside a foreign call.
    pub fn abort_fiber(&mut self, slot: usize) -> ApiResult<()> {
        let frame = self.api_frame()?;
        if !frame.foreign {
            return Err(ApiError::NotInForeignCall);
        }
        let error = self.slot(slot)?;
        self.heap.fiber_mut(frame.fiber).error = error;
        Ok(())
    }
}
