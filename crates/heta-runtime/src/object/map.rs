//! Open-addressed hash table behind script `Map` objects.
//!
//! Entries store their key's hash so the table can be rebuilt without
//! consulting the heap. Key equality needs the heap (strings compare by
//! content), so lookups take an equality callback from the caller.
//!
//! Empty slots have an undefined key and a `false` value; removed slots
//! (tombstones) have an undefined key and a `true` value so probing continues
//! past them.

use crate::value::Value;

const MIN_CAPACITY: usize = 16;
/// Maximum occupancy, including tombstones, in percent.
const MAX_LOAD: usize = 75;

#[derive(Debug, Clone, Copy)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
    pub hash: u32,
}

impl MapEntry {
    const EMPTY: MapEntry = MapEntry {
        key: Value::UNDEFINED,
        value: Value::FALSE,
        hash: 0,
    };
    const TOMBSTONE: MapEntry = MapEntry {
        key: Value::UNDEFINED,
        value: Value::TRUE,
        hash: 0,
    };

    fn is_live(&self) -> bool {
        !self.key.is_undefined()
    }
}

/// Where a key lives, or where it would be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Found(usize),
    Vacant(usize),
}

#[derive(Debug, Default, Clone)]
pub struct ObjMap {
    entries: Vec<MapEntry>,
    count: usize,
    tombstones: usize,
}

impl ObjMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn byte_size(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<MapEntry>()
    }

    /// Locate `key`. Returns `None` only when the table has no storage yet.
    pub fn find(&self, key: Value, hash: u32, eq: impl Fn(Value, Value) -> bool) -> Option<Probe> {
        let capacity = self.entries.len();
        if capacity == 0 {
            return None;
        }

        let mask = capacity - 1;
        let mut index = hash as usize & mask;
        let mut tombstone = None;
        for _ in 0..capacity {
            let entry = &self.entries[index];
            if entry.is_live() {
                if entry.hash == hash && eq(entry.key, key) {
                    return Some(Probe::Found(index));
                }
            } else if entry.value == Value::FALSE {
                return Some(Probe::Vacant(tombstone.unwrap_or(index)));
            } else if tombstone.is_none() {
                tombstone = Some(index);
            }
            index = (index + 1) & mask;
        }
        tombstone.map(Probe::Vacant)
    }

    pub fn get(&self, key: Value, hash: u32, eq: impl Fn(Value, Value) -> bool) -> Option<Value> {
        match self.find(key, hash, eq)? {
            Probe::Found(index) => Some(self.entries[index].value),
            Probe::Vacant(_) => None,
        }
    }

    /// Whether inserting one more key would exceed the load factor.
    pub fn needs_grow(&self) -> bool {
        (self.count + self.tombstones + 1) * 100 > self.entries.len() * MAX_LOAD
    }

    /// Rebuild the table, doubling when live entries warrant it and always
    /// dropping tombstones.
    pub fn grow(&mut self) {
        let mut capacity = self.entries.len().max(MIN_CAPACITY);
        while (self.count + 1) * 100 > capacity * MAX_LOAD / 2 {
            capacity *= 2;
        }

        let old = std::mem::replace(&mut self.entries, vec![MapEntry::EMPTY; capacity]);
        self.tombstones = 0;
        let mask = capacity - 1;
        for entry in old.into_iter().filter(MapEntry::is_live) {
            let mut index = entry.hash as usize & mask;
            while self.entries[index].is_live() {
                index = (index + 1) & mask;
            }
            self.entries[index] = entry;
        }
    }

    /// Store at a probed position. Returns true when the key was new.
    pub fn insert_at(&mut self, probe: Probe, key: Value, value: Value, hash: u32) -> bool {
        match probe {
            Probe::Found(index) => {
                self.entries[index].value = value;
                false
            }
            Probe::Vacant(index) => {
                if self.entries[index].value == Value::TRUE {
                    self.tombstones -= 1;
                }
                self.entries[index] = MapEntry { key, value, hash };
                self.count += 1;
                true
            }
        }
    }

    /// Remove the live entry at `index`, leaving a tombstone.
    pub fn remove_at(&mut self, index: usize) -> Value {
        let value = self.entries[index].value;
        self.entries[index] = MapEntry::TOMBSTONE;
        self.count -= 1;
        self.tombstones += 1;
        value
    }

    pub fn clear(&mut self) {
        self.entries = Vec::new();
        self.count = 0;
        self.tombstones = 0;
    }

    /// Live `(key, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| (entry.key, entry.value))
    }

    /// Index of the first live entry at or after `start`, for iteration.
    pub fn next_live(&self, start: usize) -> Option<usize> {
        (start..self.entries.len()).find(|&i| self.entries[i].is_live())
    }

    pub fn entry(&self, index: usize) -> Option<(Value, Value)> {
        self.entries
            .get(index)
            .filter(|entry| entry.is_live())
            .map(|entry| (entry.key, entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num_eq(a: Value, b: Value) -> bool {
        a == b
    }

    fn insert(map: &mut ObjMap, key: f64, value: f64) -> bool {
        let key = Value::num(key);
        let hash = crate::utils::hash_number(key.as_num());
        if map.needs_grow() {
            map.grow();
        }
        let probe = map.find(key, hash, num_eq).unwrap();
        map.insert_at(probe, key, Value::num(value), hash)
    }

    fn get(map: &ObjMap, key: f64) -> Option<f64> {
        let key = Value::num(key);
        map.get(key, crate::utils::hash_number(key.as_num()), num_eq)
            .map(Value::as_num)
    }

    #[test]
    fn insert_overwrite_and_lookup() {
        let mut map = ObjMap::new();
        assert!(insert(&mut map, 1.0, 10.0));
        assert!(!insert(&mut map, 1.0, 11.0));
        assert_eq!(get(&map, 1.0), Some(11.0));
        assert_eq!(get(&map, 2.0), None);
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn grows_past_load_factor_and_keeps_entries() {
        let mut map = ObjMap::new();
        for i in 0..1000 {
            insert(&mut map, f64::from(i), f64::from(i) * 2.0);
        }
        assert_eq!(map.count(), 1000);
        assert!(map.capacity().is_power_of_two());
        for i in 0..1000 {
            assert_eq!(get(&map, f64::from(i)), Some(f64::from(i) * 2.0));
        }
    }

    #[test]
    fn removal_leaves_probe_chains_intact() {
        let mut map = ObjMap::new();
        for i in 0..10 {
            insert(&mut map, f64::from(i), 0.0);
        }
        let key = Value::num(3.0);
        let hash = crate::utils::hash_number(3.0);
        let Some(Probe::Found(index)) = map.find(key, hash, num_eq) else {
            panic!("key 3 should be present");
        };
        map.remove_at(index);
        assert_eq!(get(&map, 3.0), None);
        for i in (0..10).filter(|&i| i != 3) {
            assert_eq!(get(&map, f64::from(i)), Some(0.0));
        }
        assert!(insert(&mut map, 3.0, 1.0));
        assert_eq!(map.count(), 10);
    }
}
