//! Tracing garbage collection
//!
//! Mark-and-sweep over the heap arena. Marking starts from the VM's roots
//! and follows every object's class header and payload references with an
//! explicit gray stack, so deep structures cannot overflow the native stack.
//! Sweeping (and finalizing dead foreign objects) is done by the heap.
//!
//! Collections only start from [`Vm::allocate`] and `Vm::grew`, when the
//! heap crosses its threshold or stress mode is on, and from explicit
//! requests.

use crate::heap::ObjRef;
use crate::object::ObjKind;
use crate::value::Value;
use crate::vm::Vm;

impl Vm {
    /// Allocate an object, collecting first if the heap is due.
    ///
    /// Everything the new object references is kept alive through the
    /// collection, but other values the caller holds in Rust locals are not:
    /// root them with `push_root` first.
    pub(crate) fn allocate(&mut self, class: Option<ObjRef>, kind: ObjKind) -> ObjRef {
        if self.gc_paused == 0 && (self.gc_stress || self.heap.should_collect(kind.estimate_size()))
        {
            self.collect(class, Some(&kind));
        }
        self.heap.insert(class, kind)
    }

    /// Account for a list, map or fiber whose storage grew in place, and
    /// collect if that pushed the heap over its threshold. `r` stays alive.
    pub(crate) fn grew(&mut self, r: ObjRef) {
        if !self.heap.remeasure(r) || self.gc_paused > 0 {
            return;
        }
        if self.gc_stress || self.heap.should_collect(0) {
            self.push_root(Value::object(r));
            self.collect(None, None);
            self.pop_root();
        }
    }

    /// Run a full collection now.
    pub fn collect_garbage(&mut self) {
        self.collect(None, None);
    }

    fn collect(&mut self, pending_class: Option<ObjRef>, pending: Option<&ObjKind>) {
        let before = self.heap.bytes_allocated();
        let mut gray = Vec::with_capacity(256);
        self.gather_roots(&mut gray);
        gray.extend(pending_class);
        if let Some(kind) = pending {
            kind.children(&mut gray);
        }

        while let Some(r) = gray.pop() {
            if !self.heap.mark(r) {
                continue;
            }
            let obj = self.heap.get(r);
            gray.extend(obj.class);
            obj.kind.children(&mut gray);
        }

        let (objects_freed, bytes_freed) = self.heap.sweep();
        let stats = &mut self.heap.stats;
        stats.collections += 1;
        stats.objects_freed += objects_freed;
        stats.bytes_freed += bytes_freed;

        tracing::debug!(
            before,
            after = self.heap.bytes_allocated(),
            objects_freed,
            next_gc = self.heap.next_gc(),
            "gc cycle"
        );
    }

    fn gather_roots(&self, gray: &mut Vec<ObjRef>) {
        fn value(v: Value, gray: &mut Vec<ObjRef>) {
            if let Some(r) = v.try_object() {
                gray.push(r);
            }
        }

        gray.push(self.core_module);
        gray.extend(self.core.iter());
        gray.extend(self.method_names.iter());
        gray.extend(self.modules.values().copied());
        gray.extend(self.fiber);
        gray.extend(self.last_module);
        if let Some(api) = self.api {
            gray.push(api.fiber);
        }
        for saved in &self.nested {
            gray.extend(saved.fiber);
            if let Some(api) = saved.api {
                gray.push(api.fiber);
            }
        }
        gray.extend(self.pending_imports.iter().map(|p| p.fiber));
        self.handles.values().for_each(|v| value(v, gray));
        self.temp_roots.iter().for_each(|&v| value(v, gray));
    }
}

#[cfg(test)]
mod tests {
    use crate::{Configuration, Vm};

    #[test]
    fn unreachable_objects_are_freed() {
        let mut vm = Vm::new(Configuration::new());
        vm.collect_garbage();
        let baseline = vm.gc_stats().live_objects;

        for i in 0..100 {
            vm.new_string_value(&format!("garbage {i}"));
        }
        assert!(vm.gc_stats().live_objects >= baseline + 100);

        vm.collect_garbage();
        let stats = vm.gc_stats();
        assert_eq!(stats.live_objects, baseline);
        assert!(stats.objects_freed >= 100);
        assert_eq!(stats.collections, 2);
    }

    #[test]
    fn temporary_roots_survive() {
        let mut vm = Vm::new(Configuration::new());
        let kept = vm.new_string_value("kept");
        vm.push_root(kept);
        vm.collect_garbage();
        assert!(vm.heap.contains(kept.as_object()));
        assert_eq!(vm.heap.string(kept.as_object()).as_bytes(), b"kept");
        vm.pop_root();
    }

    #[test]
    fn threshold_never_drops_below_minimum() {
        let mut vm = Vm::new(Configuration::new().with_min_heap_size(1 << 20));
        vm.collect_garbage();
        assert!(vm.gc_stats().next_gc >= 1 << 20);
    }
}
