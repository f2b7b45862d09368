//! The bucket-based symbol dictionary backing every dictionary in the
//! interpreter.
//!
//! A `SymbolDict` is an array of buckets, each bucket a small growable slot
//! array (initial capacity 2, doubling when full). The bucket array itself
//! doubles, with a full rehash, once the entry count exceeds 75% of the
//! bucket count. Lookup takes a borrowed `&str`, so resolving an identifier
//! never allocates a key.

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// FNV-1a over the key bytes. Deterministic, no per-lookup state.
fn hash_key(key: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = OFFSET;
    for &b in key.as_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(PRIME);
    }
    h
}

// ---------------------------------------------------------------------------
// SymbolDict
// ---------------------------------------------------------------------------

const INITIAL_SLOTS: usize = 2;

#[derive(Debug, Clone)]
struct Slot<T> {
    hash: u64,
    key: String,
    value: T,
}

#[derive(Debug, Clone)]
pub struct SymbolDict<T> {
    buckets: Vec<Vec<Slot<T>>>,
    len: usize,
}

impl<T> SymbolDict<T> {
    /// A dictionary with the default bucket count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buckets(16)
    }

    /// A dictionary with an explicit initial bucket count (at least 1).
    #[must_use]
    pub fn with_buckets(buckets: usize) -> Self {
        let buckets = buckets.max(1);
        Self {
            buckets: (0..buckets)
                .map(|_| Vec::with_capacity(INITIAL_SLOTS))
                .collect(),
            len: 0,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket_of(&self, hash: u64) -> usize {
        // Bucket counts stay well below u64 range.
        #[allow(clippy::cast_possible_truncation)]
        {
            (hash % self.buckets.len() as u64) as usize
        }
    }

    /// Insert or replace. Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: &str, value: T) -> Option<T> {
        let hash = hash_key(key);
        let idx = self.bucket_of(hash);
        let bucket = &mut self.buckets[idx];
        if let Some(slot) = bucket
            .iter_mut()
            .find(|s| s.hash == hash && s.key == key)
        {
            return Some(std::mem::replace(&mut slot.value, value));
        }

        if self.len + 1 > self.buckets.len() * 3 / 4 {
            self.resize();
        }
        let idx = self.bucket_of(hash);
        self.buckets[idx].push(Slot {
            hash,
            key: key.to_owned(),
            value,
        });
        self.len += 1;
        None
    }

    /// Double the bucket array and rehash every entry.
    fn resize(&mut self) {
        let new_count = self.buckets.len() * 2;
        let old = std::mem::replace(
            &mut self.buckets,
            (0..new_count)
                .map(|_| Vec::with_capacity(INITIAL_SLOTS))
                .collect(),
        );
        for bucket in old {
            for slot in bucket {
                let idx = self.bucket_of(slot.hash);
                self.buckets[idx].push(slot);
            }
        }
    }

    /// Borrowed-key lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        let hash = hash_key(key);
        self.buckets[self.bucket_of(hash)]
            .iter()
            .find(|s| s.hash == hash && s.key == key)
            .map(|s| &s.value)
    }

    #[must_use]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let hash = hash_key(key);
        let idx = self.bucket_of(hash);
        self.buckets[idx]
            .iter_mut()
            .find(|s| s.hash == hash && s.key == key)
            .map(|s| &mut s.value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.buckets
            .iter()
            .flatten()
            .map(|s| (s.key.as_str(), &s.value))
    }
}

impl<T> Default for SymbolDict<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<(String, T)> for SymbolDict<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (key, value) in iter {
            dict.insert(&key, value);
        }
        dict
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut dict = SymbolDict::new();
        assert!(dict.is_empty());
        dict.insert("moveto", 1);
        dict.insert("lineto", 2);
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("moveto"), Some(&1));
        assert_eq!(dict.get("lineto"), Some(&2));
        assert_eq!(dict.get("curveto"), None);
    }

    #[test]
    fn insert_replaces_existing() {
        let mut dict = SymbolDict::new();
        assert_eq!(dict.insert("x", 1), None);
        assert_eq!(dict.insert("x", 2), Some(1));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("x"), Some(&2));
    }

    #[test]
    fn borrowed_span_lookup() {
        let mut dict = SymbolDict::new();
        dict.insert("findfont", 7);
        let source = "12 /Helvetica findfont";
        let span = &source[14..22];
        assert_eq!(span, "findfont");
        assert_eq!(dict.get(span), Some(&7));
    }

    #[test]
    fn resize_keeps_all_entries() {
        // 100 inserts into 4 buckets force several doublings.
        let mut dict = SymbolDict::with_buckets(4);
        for i in 0..100 {
            dict.insert(&format!("k{i}"), i);
        }
        assert_eq!(dict.len(), 100);
        for i in 0..100 {
            assert_eq!(dict.get(&format!("k{i}")), Some(&i), "lost k{i}");
        }
    }

    #[test]
    fn resize_does_not_duplicate() {
        let mut dict = SymbolDict::with_buckets(2);
        for i in 0..50 {
            dict.insert(&format!("k{i}"), i);
        }
        assert_eq!(dict.iter().count(), 50);
    }

    #[test]
    fn get_mut_mutates_in_place() {
        let mut dict = SymbolDict::new();
        dict.insert("n", 1);
        if let Some(v) = dict.get_mut("n") {
            *v += 10;
        }
        assert_eq!(dict.get("n"), Some(&11));
    }

    #[test]
    fn iteration_covers_every_entry() {
        let mut dict = SymbolDict::with_buckets(4);
        dict.insert("a", 1);
        dict.insert("b", 2);
        dict.insert("c", 3);
        let mut seen: Vec<_> = dict.iter().map(|(k, v)| (k.to_owned(), *v)).collect();
        seen.sort();
        assert_eq!(
            seen,
            vec![("a".into(), 1), ("b".into(), 2), ("c".into(), 3)]
        );
    }
}
