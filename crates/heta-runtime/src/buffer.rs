//! Growable typed buffer
//!
//! `Buffer<T>` is the container every other engine structure sits on: bytecode
//! arrays, line tables, symbol tables and list elements. Capacity always grows
//! to the next power of two at or above the number of elements needed, so a
//! sequence of single writes costs amortized O(1) and the GC can estimate the
//! retained size of a buffer from its capacity.

use std::ops::{Deref, DerefMut};

/// Round `n` up to the next power of two. Zero stays zero.
pub fn power_of_2_ceil(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        n.next_power_of_two()
    }
}

/// Dynamic array with power-of-two growth.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer<T> {
    data: Vec<T>,
}

impl<T> Buffer<T> {
    /// Create an empty buffer without allocating.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create a buffer able to hold at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(power_of_2_ceil(capacity)),
        }
    }

    /// Append one element.
    pub fn write(&mut self, value: T) {
        self.grow_for(1);
        self.data.push(value);
    }

    /// Insert `value` at `index`, shifting later elements up.
    pub fn insert(&mut self, index: usize, value: T) {
        self.grow_for(1);
        self.data.insert(index, value);
    }

    /// Remove and return the element at `index`.
    pub fn remove(&mut self, index: usize) -> T {
        self.data.remove(index)
    }

    pub fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Drop every element and release the storage.
    pub fn clear(&mut self) {
        self.data = Vec::new();
    }

    /// Number of elements written.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Bytes retained by the buffer's storage, used for heap accounting.
    pub fn byte_size(&self) -> usize {
        self.data.capacity() * std::mem::size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    fn grow_for(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed > self.data.capacity() {
            let target = power_of_2_ceil(needed);
            self.data.reserve_exact(target - self.data.len());
        }
    }
}

impl<T: Clone> Buffer<T> {
    /// Append `count` copies of `value`.
    pub fn fill(&mut self, value: T, count: usize) {
        if count == 0 {
            return;
        }
        self.grow_for(count);
        self.data.resize(self.data.len() + count, value);
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for Buffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> From<Vec<T>> for Buffer<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> FromIterator<T> for Buffer<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(5, 8)]
    #[case(64, 64)]
    #[case(65, 128)]
    fn power_of_two_rounding(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(power_of_2_ceil(n), expected);
    }

    #[test]
    fn fill_appends_copies() {
        let mut buf = Buffer::new();
        buf.write(1u8);
        buf.fill(7u8, 3);
        assert_eq!(buf.as_slice(), &[1, 7, 7, 7]);
        assert_eq!(buf.count(), 4);
        assert!(buf.capacity() >= 4);
    }

    #[test]
    fn fill_zero_is_a_no_op() {
        let mut buf: Buffer<u32> = Buffer::new();
        buf.fill(0, 0);
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn clear_releases_storage() {
        let mut buf = Buffer::new();
        for i in 0..100u32 {
            buf.write(i);
        }
        assert_eq!(buf.count(), 100);
        buf.clear();
        assert_eq!(buf.count(), 0);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.byte_size(), 0);
    }

    #[test]
    fn insert_and_remove_shift_elements() {
        let mut buf: Buffer<char> = "acd".chars().collect();
        buf.insert(1, 'b');
        assert_eq!(buf.as_slice(), &['a', 'b', 'c', 'd']);
        assert_eq!(buf.remove(0), 'a');
        assert_eq!(buf.as_slice(), &['b', 'c', 'd']);
    }
}
