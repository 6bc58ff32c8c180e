//! `(arena, index)` interning (Design Notes §9): one arena per attribute
//! type (or, concretely, per per-segment index — see
//! [`crate::index::segment_index`]), holding canonical payloads in a `Vec`
//! with a hash-map from encoded bytes to arena index for dedup. Equality
//! between two interned values is then just index equality; ordering falls
//! back to comparing the underlying payloads the first time two distinct
//! indices are compared, with the result cached.
//!
//! This replaces the C++ original's reference-counted immutable objects: no
//! shared mutable reference count is needed, only an append-only `Vec` and a
//! dedup map.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::RwLock;

/// An index into an [`Arena`]. Cheap to copy and compare.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ArenaId(pub u32);

/// An append-only interning table keyed by the canonical encoded bytes of
/// `T`. Values already present are deduplicated; new values are appended
/// and never removed (matching the per-segment index lifetime: an arena is
/// rebuilt from scratch whenever its segment is rescanned).
pub struct Arena<T> {
    items: Vec<T>,
    by_bytes: FxHashMap<Vec<u8>, ArenaId>,
    // Cache of pairwise order comparisons already resolved, so repeatedly
    // sorting the same set of ids does not re-decode and re-compare payloads.
    order_cache: RwLock<FxHashMap<(ArenaId, ArenaId), Ordering>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            by_bytes: FxHashMap::default(),
            order_cache: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ArenaId) -> Option<&T> {
        self.items.get(id.0 as usize)
    }

    /// Interns `value`, whose canonical encoding is `key`. Returns the
    /// existing id if an equal value was already interned, otherwise
    /// appends `value` and returns the new id.
    pub fn intern_with_key(&mut self, key: Vec<u8>, value: T) -> ArenaId {
        if let Some(id) = self.by_bytes.get(&key) {
            return *id;
        }
        let id = ArenaId(self.items.len() as u32);
        self.items.push(value);
        self.by_bytes.insert(key, id);
        id
    }

    pub fn find_by_key(&self, key: &[u8]) -> Option<ArenaId> {
        self.by_bytes.get(key).copied()
    }

    /// Orders two ids by comparing their payloads with `compare`, caching
    /// the result so repeated comparisons (e.g. during a sort) are O(1)
    /// after the first.
    pub fn compare_cached(
        &self,
        a: ArenaId,
        b: ArenaId,
        compare: impl FnOnce(&T, &T) -> Ordering,
    ) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let key = if a.0 <= b.0 { (a, b) } else { (b, a) };
        if let Some(hit) = self.order_cache.read().expect("lock poisoned").get(&key) {
            return if key == (a, b) { *hit } else { hit.reverse() };
        }
        let (x, y) = (self.get(a), self.get(b));
        let ordering = match (x, y) {
            (Some(x), Some(y)) => compare(x, y),
            _ => Ordering::Equal,
        };
        let canonical = if key == (a, b) { ordering } else { ordering.reverse() };
        self.order_cache
            .write()
            .expect("lock poisoned")
            .insert(key, canonical);
        ordering
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArenaId, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, v)| (ArenaId(i as u32), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_equal_keys() {
        let mut arena: Arena<String> = Arena::new();
        let a = arena.intern_with_key(b"x".to_vec(), "x".to_string());
        let b = arena.intern_with_key(b"x".to_vec(), "x".to_string());
        let c = arena.intern_with_key(b"y".to_vec(), "y".to_string());

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn compare_cached_is_consistent_with_comparator() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.intern_with_key(b"1".to_vec(), 1);
        let b = arena.intern_with_key(b"2".to_vec(), 2);

        assert_eq!(arena.compare_cached(a, b, |x, y| x.cmp(y)), Ordering::Less);
        assert_eq!(arena.compare_cached(b, a, |x, y| x.cmp(y)), Ordering::Greater);
        assert_eq!(arena.compare_cached(a, a, |x, y| x.cmp(y)), Ordering::Equal);
    }
}
