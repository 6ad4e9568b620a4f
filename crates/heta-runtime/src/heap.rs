//! Object arena and allocation accounting
//!
//! The heap owns every object in a slot arena. An [`ObjRef`] is an index
//! into it; freed slots go on a free list and are reused. Objects never move,
//! so a reference stays valid for as long as the object is reachable.
//!
//! Accounting follows the allocator protocol: each object's estimated size
//! is charged through the [`Reallocator`] when it is created, re-measured
//! after every collection, and credited back when it is freed. Collection
//! policy (roots, thresholds) lives in [`crate::gc`].

use crate::config::{HeapSettings, Reallocator, SystemAllocator};
use crate::object::{
    Obj, ObjClass, ObjClosure, ObjFiber, ObjFn, ObjForeign, ObjInstance, ObjKind, ObjList, ObjMap,
    ObjModule, ObjRange, ObjString, ObjUpvalue, Probe,
};
use crate::utils::hash_number;
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;

/// Index of an object in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    pub(crate) fn from_index(index: u32) -> Self {
        ObjRef(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Collector counters, exposed to hosts through `Vm::gc_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcStats {
    pub collections: u64,
    pub objects_freed: u64,
    pub bytes_freed: u64,
    pub bytes_allocated: usize,
    pub next_gc: usize,
    pub live_objects: usize,
}

pub struct Heap {
    objects: Vec<Option<Obj>>,
    free: Vec<u32>,
    live: usize,
    bytes_allocated: usize,
    next_gc: usize,
    settings: HeapSettings,
    reallocator: Box<dyn Reallocator>,
    out_of_memory: bool,
    /// Class given to strings allocated through [`Heap::new_string`].
    string_class: Option<ObjRef>,
    pub(crate) stats: GcStats,
}

impl Heap {
    pub fn new(settings: HeapSettings, reallocator: Box<dyn Reallocator>) -> Self {
        Self {
            objects: Vec::new(),
            free: Vec::new(),
            live: 0,
            bytes_allocated: 0,
            next_gc: settings.initial_heap_size,
            settings,
            reallocator,
            out_of_memory: false,
            string_class: None,
            stats: GcStats::default(),
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Set once the reallocator has refused a request. Sticky.
    pub fn out_of_memory(&self) -> bool {
        self.out_of_memory
    }

    pub(crate) fn set_string_class(&mut self, class: ObjRef) {
        self.string_class = Some(class);
    }

    pub(crate) fn string_class(&self) -> Option<ObjRef> {
        self.string_class
    }

    /// Whether allocating `incoming` more bytes crosses the threshold.
    pub fn should_collect(&self, incoming: usize) -> bool {
        self.bytes_allocated + incoming > self.next_gc
    }

    /// Place a new object in the arena. Never collects; callers that may
    /// trigger a collection go through `Vm::allocate`.
    pub fn insert(&mut self, class: Option<ObjRef>, kind: ObjKind) -> ObjRef {
        let size = kind.estimate_size();
        self.charge(0, size);

        let obj = Obj {
            class,
            marked: false,
            size,
            kind,
        };
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.objects[index as usize] = Some(obj);
                ObjRef(index)
            }
            None => {
                self.objects.push(Some(obj));
                ObjRef((self.objects.len() - 1) as u32)
            }
        }
    }

    /// Allocate a string without triggering a collection.
    pub fn new_string(&mut self, bytes: &[u8]) -> ObjRef {
        self.insert(self.string_class, ObjKind::String(ObjString::new(bytes)))
    }

    /// Re-measure `r` after its storage changed in place and charge the
    /// difference. Returns whether the object grew.
    pub(crate) fn remeasure(&mut self, r: ObjRef) -> bool {
        let obj = self.get_mut(r);
        let old_size = obj.size;
        let new_size = obj.kind.estimate_size();
        if new_size == old_size {
            return false;
        }
        obj.size = new_size;
        self.charge(old_size, new_size);
        new_size > old_size
    }

    fn charge(&mut self, old_size: usize, new_size: usize) {
        if !self.reallocator.reallocate(old_size, new_size) && new_size > old_size {
            if !self.out_of_memory {
                tracing::error!(
                    requested = new_size - old_size,
                    bytes_allocated = self.bytes_allocated,
                    "heap allocation refused; the VM is out of memory"
                );
            }
            self.out_of_memory = true;
        }
        self.bytes_allocated = (self.bytes_allocated + new_size).saturating_sub(old_size);
    }

    /// Sweep: free every unmarked object and clear the marks of the rest.
    /// Returns `(objects_freed, bytes_freed)`.
    pub(crate) fn sweep(&mut self) -> (u64, u64) {
        let mut objects_freed = 0;
        let mut bytes_freed = 0;
        for index in 0..self.objects.len() {
            let Some(obj) = self.objects[index].as_mut() else {
                continue;
            };
            if obj.marked {
                obj.marked = false;
                let old_size = obj.size;
                let new_size = obj.kind.estimate_size();
                if new_size != old_size {
                    obj.size = new_size;
                    self.charge(old_size, new_size);
                }
                continue;
            }

            if let Some(mut obj) = self.objects[index].take() {
                if let ObjKind::Foreign(foreign) = &mut obj.kind {
                    foreign.finalize();
                }
                self.charge(obj.size, 0);
                self.free.push(index as u32);
                self.live -= 1;
                objects_freed += 1;
                bytes_freed += obj.size as u64;
            }
        }

        let growth = self.bytes_allocated.saturating_mul(self.settings.heap_growth_percent) / 100;
        self.next_gc = self
            .settings
            .min_heap_size
            .max(self.bytes_allocated + growth);
        (objects_freed, bytes_freed)
    }

    /// Free everything, running outstanding finalizers. Used when the VM is
    /// dropped.
    pub(crate) fn free_all(&mut self) {
        for slot in &mut self.objects {
            if let Some(mut obj) = slot.take() {
                if let ObjKind::Foreign(foreign) = &mut obj.kind {
                    foreign.finalize();
                }
                self.reallocator.reallocate(obj.size, 0);
            }
        }
        self.objects.clear();
        self.free.clear();
        self.live = 0;
        self.bytes_allocated = 0;
    }

    pub fn contains(&self, r: ObjRef) -> bool {
        matches!(self.objects.get(r.slot()), Some(Some(_)))
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        match self.objects.get(r.slot()) {
            Some(Some(obj)) => obj,
            _ => unreachable!("dangling object reference {}", r.0),
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        match self.objects.get_mut(r.slot()) {
            Some(Some(obj)) => obj,
            _ => unreachable!("dangling object reference {}", r.0),
        }
    }

    pub fn kind(&self, r: ObjRef) -> &ObjKind {
        &self.get(r).kind
    }

    pub fn class_header(&self, r: ObjRef) -> Option<ObjRef> {
        self.get(r).class
    }

    /// Iterate over every live object reference.
    pub fn refs(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ObjRef(index as u32))
    }

    pub(crate) fn mark(&mut self, r: ObjRef) -> bool {
        let obj = self.get_mut(r);
        if obj.marked {
            false
        } else {
            obj.marked = true;
            true
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapSettings::default(), Box::new(SystemAllocator))
    }
}

macro_rules! accessors {
    ($($get:ident, $get_mut:ident, $variant:ident, $ty:ty;)*) => {
        impl Heap {
            $(
                pub fn $get(&self, r: ObjRef) -> &$ty {
                    match &self.get(r).kind {
                        ObjKind::$variant(inner) => inner,
                        other => unreachable!(
                            concat!("expected ", stringify!($variant), ", found {}"),
                            other.type_name()
                        ),
                    }
                }

                pub fn $get_mut(&mut self, r: ObjRef) -> &mut $ty {
                    match &mut self.get_mut(r).kind {
                        ObjKind::$variant(inner) => inner,
                        other => unreachable!(
                            concat!("expected ", stringify!($variant), ", found {}"),
                            other.type_name()
                        ),
                    }
                }
            )*
        }
    };
}

accessors! {
    string, string_mut, String, ObjString;
    list, list_mut, List, ObjList;
    map, map_mut, Map, ObjMap;
    range, range_mut, Range, ObjRange;
    closure, closure_mut, Closure, ObjClosure;
    upvalue, upvalue_mut, Upvalue, ObjUpvalue;
    class, class_mut, Class, ObjClass;
    instance, instance_mut, Instance, ObjInstance;
    foreign, foreign_mut, Foreign, ObjForeign;
    fiber, fiber_mut, Fiber, ObjFiber;
    module, module_mut, Module, ObjModule;
}

/// Type tests and value-level operations.
impl Heap {
    pub fn function(&self, r: ObjRef) -> &Arc<ObjFn> {
        match &self.get(r).kind {
            ObjKind::Fn(function) => function,
            other => unreachable!("expected Fn, found {}", other.type_name()),
        }
    }

    fn kind_of(&self, value: Value) -> Option<&ObjKind> {
        value.try_object().map(|r| self.kind(r))
    }

    pub fn is_string(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::String(_)))
    }

    pub fn is_list(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::List(_)))
    }

    pub fn is_map(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Map(_)))
    }

    pub fn is_range(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Range(_)))
    }

    pub fn is_class(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Class(_)))
    }

    pub fn is_closure(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Closure(_)))
    }

    pub fn is_fiber(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Fiber(_)))
    }

    pub fn is_instance(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Instance(_)))
    }

    pub fn is_foreign(&self, value: Value) -> bool {
        matches!(self.kind_of(value), Some(ObjKind::Foreign(_)))
    }

    /// The string inside `value`, if it is one.
    pub fn as_string(&self, value: Value) -> Option<&ObjString> {
        match self.kind_of(value)? {
            ObjKind::String(string) => Some(string),
            _ => None,
        }
    }

    /// Script equality: identity, plus content equality for strings and
    /// ranges and numeric equality for numbers.
    pub fn values_equal(&self, a: Value, b: Value) -> bool {
        if a.is_num() && b.is_num() {
            return a.as_num() == b.as_num();
        }
        if a == b {
            return true;
        }
        let (Some(ra), Some(rb)) = (a.try_object(), b.try_object()) else {
            return false;
        };
        match (self.kind(ra), self.kind(rb)) {
            (ObjKind::String(x), ObjKind::String(y)) => x.hash() == y.hash() && x == y,
            (ObjKind::Range(x), ObjKind::Range(y)) => x == y,
            _ => false,
        }
    }

    /// Hash of a map key. Numbers, bools and null hash by value, strings
    /// and ranges by content, every other object by identity.
    pub fn hash_key(&self, key: Value) -> u32 {
        if key.is_num() {
            let n = key.as_num();
            return hash_number(if n == 0.0 { 0.0 } else { n });
        }
        if key == Value::NULL {
            return 1;
        }
        if key == Value::FALSE {
            return 2;
        }
        if key == Value::TRUE {
            return 3;
        }
        let Some(r) = key.try_object() else {
            return 0;
        };
        match self.kind(r) {
            ObjKind::String(string) => string.hash(),
            ObjKind::Range(range) => hash_number(range.from) ^ hash_number(range.to).rotate_left(7),
            _ => hash_number(f64::from(r.index())),
        }
    }

    pub fn map_get(&self, map: ObjRef, key: Value) -> Option<Value> {
        let hash = self.hash_key(key);
        self.map(map).get(key, hash, |a, b| self.values_equal(a, b))
    }

    /// Insert or overwrite. The caller accounts for any table growth.
    pub fn map_set(&mut self, map: ObjRef, key: Value, value: Value) {
        let hash = self.hash_key(key);
        if self.map(map).needs_grow() {
            self.map_mut(map).grow();
        }
        let Some(probe) = self.map(map).find(key, hash, |a, b| self.values_equal(a, b)) else {
            unreachable!("map {} has no free slot after growing", map.0);
        };
        self.map_mut(map).insert_at(probe, key, value, hash);
    }

    /// Remove `key`, returning the value it held.
    pub fn map_remove(&mut self, map: ObjRef, key: Value) -> Option<Value> {
        let hash = self.hash_key(key);
        match self.map(map).find(key, hash, |a, b| self.values_equal(a, b))? {
            Probe::Found(index) => Some(self.map_mut(map).remove_at(index)),
            Probe::Vacant(_) => None,
        }
    }

    /// Walk a list of values by index without holding a borrow.
    pub fn list_get(&self, list: ObjRef, index: usize) -> Option<Value> {
        self.list(list).elements.get(index).copied()
    }

    pub fn new_list(&mut self, class: Option<ObjRef>, elements: Vec<Value>) -> ObjRef {
        self.insert(
            class,
            ObjKind::List(ObjList {
                elements: elements.into(),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::default();
        let a = heap.new_string(b"a");
        let b = heap.new_string(b"b");
        assert_eq!(heap.len(), 2);
        heap.mark(b);
        let (freed, _) = heap.sweep();
        assert_eq!(freed, 1);
        assert!(!heap.contains(a));
        assert!(heap.contains(b));
        let c = heap.new_string(b"c");
        assert_eq!(c, a);
    }

    #[test]
    fn accounting_tracks_live_bytes() {
        let mut heap = Heap::default();
        let s = heap.new_string(b"hello");
        let size = heap.get(s).size;
        assert_eq!(heap.bytes_allocated(), size);
        heap.sweep();
        assert_eq!(heap.bytes_allocated(), 0);
    }

    #[test]
    fn threshold_respects_min_heap_size() {
        let settings = HeapSettings {
            initial_heap_size: 100,
            min_heap_size: 5000,
            heap_growth_percent: 50,
        };
        let mut heap = Heap::new(settings, Box::new(SystemAllocator));
        assert_eq!(heap.next_gc(), 100);
        heap.sweep();
        assert_eq!(heap.next_gc(), 5000);
    }

    #[test]
    fn string_keys_compare_by_content() {
        let mut heap = Heap::default();
        let map = heap.insert(None, ObjKind::Map(ObjMap::new()));
        let k1 = Value::object(heap.new_string(b"key"));
        let k2 = Value::object(heap.new_string(b"key"));
        heap.map_set(map, k1, Value::num(1.0));
        assert_eq!(heap.map_get(map, k2), Some(Value::num(1.0)));
        assert_eq!(heap.map_remove(map, k2), Some(Value::num(1.0)));
        assert_eq!(heap.map_get(map, k1), None);
    }

    #[test]
    fn objects_are_keys_by_identity() {
        let mut heap = Heap::default();
        let map = heap.insert(None, ObjKind::Map(ObjMap::new()));
        let a = Value::object(heap.new_list(None, Vec::new()));
        let b = Value::object(heap.new_list(None, Vec::new()));
        heap.map_set(map, a, Value::num(1.0));
        heap.map_set(map, b, Value::num(2.0));
        assert_eq!(heap.map(map).count(), 2);
        assert_eq!(heap.map_get(map, a), Some(Value::num(1.0)));
        assert_eq!(heap.map_get(map, b), Some(Value::num(2.0)));
        assert_eq!(heap.map_remove(map, a), Some(Value::num(1.0)));
        assert_eq!(heap.map_get(map, b), Some(Value::num(2.0)));
    }

    #[test]
    fn growth_threshold_keeps_precision_on_small_heaps() {
        let settings = HeapSettings {
            initial_heap_size: 100,
            min_heap_size: 1,
            heap_growth_percent: 50,
        };
        let mut heap = Heap::new(settings, Box::new(SystemAllocator));
        let s = heap.new_string(b"x");
        let live = heap.get(s).size;
        heap.mark(s);
        heap.sweep();
        assert_eq!(heap.next_gc(), live + live * 50 / 100);
    }

    #[test]
    fn remeasure_charges_in_place_growth() {
        let mut heap = Heap::default();
        let list = heap.new_list(None, Vec::new());
        let before = heap.bytes_allocated();
        assert!(!heap.remeasure(list));
        for i in 0..100 {
            heap.list_mut(list).elements.write(Value::num(f64::from(i)));
        }
        assert!(heap.remeasure(list));
        assert_eq!(heap.bytes_allocated(), heap.get(list).size);
        assert!(heap.bytes_allocated() > before);
    }

    #[test]
    fn refused_growth_sets_out_of_memory() {
        let refuse = |_old: usize, new: usize| new == 0;
        let mut heap = Heap::new(HeapSettings::default(), Box::new(refuse));
        assert!(!heap.out_of_memory());
        heap.new_string(b"x");
        assert!(heap.out_of_memory());
    }
}
