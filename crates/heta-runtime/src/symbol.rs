//! Symbol table: interned names
//!
//! Method signatures, module variable names and other identifiers are
//! interned once into a table of heap strings. After that, names are compared
//! by their integer index. The VM-wide method table is a GC root; module
//! tables are traced through their module.
//!
//! Comparison at insertion time is by content. `add` always appends, `ensure`
//! reuses an existing entry, `find` reports a missing name as `None`.

use crate::buffer::Buffer;
use crate::heap::{Heap, ObjRef};

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    names: Buffer<ObjRef>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name` as a new entry, even if an equal one exists.
    pub fn add(&mut self, heap: &mut Heap, name: &str) -> usize {
        let string = heap.new_string(name.as_bytes());
        self.push(string)
    }

    /// Index of `name`, interning it if needed.
    pub fn ensure(&mut self, heap: &mut Heap, name: &str) -> usize {
        match self.find(heap, name) {
            Some(symbol) => symbol,
            None => self.add(heap, name),
        }
    }

    /// Index of the entry whose content equals `name`.
    pub fn find(&self, heap: &Heap, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|&string| heap.string(string).as_bytes() == name.as_bytes())
    }

    /// Append an already-allocated string.
    pub fn push(&mut self, string: ObjRef) -> usize {
        self.names.write(string);
        self.names.count() - 1
    }

    /// The interned string at `symbol`.
    pub fn get(&self, symbol: usize) -> Option<ObjRef> {
        self.names.get(symbol).copied()
    }

    /// The name at `symbol` as text, empty if out of range.
    pub fn name<'h>(&self, heap: &'h Heap, symbol: usize) -> std::borrow::Cow<'h, str> {
        match self.get(symbol) {
            Some(string) => heap.string(string).to_string_lossy(),
            None => std::borrow::Cow::Borrowed(""),
        }
    }

    pub fn count(&self) -> usize {
        self.names.count()
    }

    pub fn is_empty(&self) -> bool {
        self.names.count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.names.iter().copied()
    }

    /// Forget every entry. Used at VM teardown.
    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn byte_size(&self) -> usize {
        self.names.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn ensure_is_idempotent() {
        let mut heap = Heap::default();
        let mut table = SymbolTable::new();
        let first = table.ensure(&mut heap, "foo");
        let second = table.ensure(&mut heap, "foo");
        assert_eq!(first, second);
        assert_eq!(table.count(), 1);
        assert_eq!(table.name(&heap, first), "foo");
    }

    #[test]
    fn find_missing_name() {
        let mut heap = Heap::default();
        let mut table = SymbolTable::new();
        table.ensure(&mut heap, "present");
        assert_eq!(table.find(&heap, "missing"), None);
        assert_eq!(table.find(&heap, "present"), Some(0));
    }

    #[test]
    fn add_allows_duplicates() {
        let mut heap = Heap::default();
        let mut table = SymbolTable::new();
        let a = table.add(&mut heap, "x");
        let b = table.add(&mut heap, "x");
        assert_ne!(a, b);
        assert_eq!(table.find(&heap, "x"), Some(a));
    }

    proptest! {
        #[test]
        fn distinct_names_get_distinct_symbols(names in proptest::collection::hash_set("[a-z_]{1,12}", 1..40)) {
            let mut heap = Heap::default();
            let mut table = SymbolTable::new();
            let symbols: HashSet<usize> = names.iter().map(|n| table.ensure(&mut heap, n)).collect();
            prop_assert_eq!(symbols.len(), names.len());
            for name in &names {
                let symbol = table.find(&heap, name).unwrap();
                prop_assert_eq!(table.name(&heap, symbol).into_owned(), name.clone());
            }
        }
    }
}
