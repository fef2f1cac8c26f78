//! Open-addressed mapping store keyed by shallow value equality.
//!
//! Every user-visible mapping, and the front end's own bookkeeping (datum
//! labels, printer back-references), goes through this table rather than a
//! library map so iteration, growth and deletion behavior are fully pinned
//! down.

use crate::error::SprigError;
use crate::value::{hash_value, Value};

/// Capacity ladder. Growth steps to the next prime; running off the end is
/// the fatal [`SprigError::TableOverflow`].
static SIZES: &[usize] = &[
    7, 13, 29, 59, 113, 223, 431, 821, 1567, 2999, 5701, 10837, 20593, 39133, 74353, 141277,
    268439, 510047, 969097, 1841291, 3498457, 5247701, 7871573, 11807381, 17711087, 26566649,
    39849977, 59774983, 89662483, 134493731, 201740597, 302610937, 453916423, 680874641,
    1021311983, 1531968019, 2147483647,
];

fn size_at_least(n: usize) -> Result<usize, SprigError> {
    SIZES
        .iter()
        .copied()
        .find(|&p| p >= n)
        .ok_or(SprigError::TableOverflow { capacity: n })
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    /// Never occupied; terminates probes.
    Free,
    /// Held an entry that was deleted; probes continue past it.
    Tombstone,
    Live { hash: u64, key: Value, value: Value },
}

/// Linear-probed hash table over [`Value`] keys.
///
/// Tombstones keep probe chains intact across deletion: a lookup stops only
/// at a `Free` bucket or after a full cycle. Growth is proactive (before the
/// live count would exceed 3/4 of capacity) and drops tombstones.
#[derive(Debug, Clone)]
pub struct ValueMap {
    buckets: Vec<Bucket>,
    /// Live entries.
    live: usize,
    /// Live entries plus tombstones; drives the growth decision, since
    /// tombstones lengthen probe chains just like live entries.
    used: usize,
}

impl Default for ValueMap {
    fn default() -> Self {
        ValueMap::new()
    }
}

impl ValueMap {
    pub fn new() -> Self {
        ValueMap {
            buckets: vec![Bucket::Free; SIZES[0]],
            live: 0,
            used: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, SprigError> {
        Ok(ValueMap {
            buckets: vec![Bucket::Free; size_at_least(capacity)?],
            live: 0,
            used: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Insert or overwrite. Fails only when the table needs to grow past the
    /// end of the size ladder.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), SprigError> {
        if (self.used + 1) * 4 > self.buckets.len() * 3 {
            self.grow()?;
        }
        let hash = hash_value(key);
        let cap = self.buckets.len();
        let mut idx = (hash as usize) % cap;
        let mut reusable = None;
        let mut free = None;
        for _ in 0..cap {
            match self.buckets[idx] {
                Bucket::Free => {
                    free = Some(idx);
                    break;
                }
                Bucket::Tombstone => {
                    if reusable.is_none() {
                        reusable = Some(idx);
                    }
                }
                Bucket::Live {
                    hash: h, key: k, ..
                } if h == hash && k == key => {
                    self.buckets[idx] = Bucket::Live { hash, key, value };
                    return Ok(());
                }
                Bucket::Live { .. } => {}
            }
            idx = (idx + 1) % cap;
        }
        // Prefer reclaiming a tombstone: it sits earlier on the probe chain
        // and keeps `used` from creeping up.
        let target = match (reusable, free) {
            (Some(t), _) => t,
            (None, Some(f)) => {
                self.used += 1;
                f
            }
            (None, None) => return Err(SprigError::TableOverflow { capacity: cap }),
        };
        self.buckets[target] = Bucket::Live { hash, key, value };
        self.live += 1;
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let hash = hash_value(*key);
        let cap = self.buckets.len();
        let mut idx = (hash as usize) % cap;
        for _ in 0..cap {
            match self.buckets[idx] {
                Bucket::Free => return None,
                Bucket::Tombstone => {}
                Bucket::Live {
                    hash: h,
                    key: k,
                    value,
                } if h == hash && k == *key => return Some(value),
                Bucket::Live { .. } => {}
            }
            idx = (idx + 1) % cap;
        }
        None
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Delete a key, leaving a tombstone. Returns whether the key was live.
    pub fn delete(&mut self, key: &Value) -> bool {
        let hash = hash_value(*key);
        let cap = self.buckets.len();
        let mut idx = (hash as usize) % cap;
        for _ in 0..cap {
            match self.buckets[idx] {
                Bucket::Free => return false,
                Bucket::Tombstone => {}
                Bucket::Live {
                    hash: h, key: k, ..
                } if h == hash && k == *key => {
                    self.buckets[idx] = Bucket::Tombstone;
                    self.live -= 1;
                    return true;
                }
                Bucket::Live { .. } => {}
            }
            idx = (idx + 1) % cap;
        }
        false
    }

    /// Cursor traversal in bucket order. Pass `None` to start, then the
    /// returned cursor to continue; yields every live entry exactly once.
    /// Stable as long as the table is not mutated in between.
    pub fn next(&self, cursor: Option<usize>) -> Option<(usize, Value, Value)> {
        let start = cursor.map_or(0, |c| c + 1);
        for idx in start..self.buckets.len() {
            if let Bucket::Live { key, value, .. } = self.buckets[idx] {
                return Some((idx, key, value));
            }
        }
        None
    }

    pub fn iter(&self) -> Entries<'_> {
        Entries {
            map: self,
            cursor: None,
        }
    }

    fn grow(&mut self) -> Result<(), SprigError> {
        let next = size_at_least(self.buckets.len() + 1)?;
        let old = std::mem::replace(&mut self.buckets, vec![Bucket::Free; next]);
        self.live = 0;
        self.used = 0;
        for bucket in old {
            if let Bucket::Live { hash, key, value } = bucket {
                self.rehash_insert(hash, key, value);
            }
        }
        Ok(())
    }

    /// Insert into a table known to contain free buckets and no tombstones.
    fn rehash_insert(&mut self, hash: u64, key: Value, value: Value) {
        let cap = self.buckets.len();
        let mut idx = (hash as usize) % cap;
        loop {
            if let Bucket::Free = self.buckets[idx] {
                self.buckets[idx] = Bucket::Live { hash, key, value };
                self.live += 1;
                self.used += 1;
                return;
            }
            idx = (idx + 1) % cap;
        }
    }
}

pub struct Entries<'a> {
    map: &'a ValueMap,
    cursor: Option<usize>,
}

impl Iterator for Entries<'_> {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<(Value, Value)> {
        let (idx, key, value) = self.map.next(self.cursor)?;
        self.cursor = Some(idx);
        Some((key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Value {
        Value::symbol(s)
    }

    #[test]
    fn set_get_overwrite() {
        let mut m = ValueMap::new();
        m.set(sym("a"), Value::Int(1)).unwrap();
        m.set(sym("b"), Value::Int(2)).unwrap();
        assert_eq!(m.get(&sym("a")), Some(Value::Int(1)));
        assert_eq!(m.get(&sym("b")), Some(Value::Int(2)));
        assert_eq!(m.get(&sym("c")), None);
        assert_eq!(m.len(), 2);

        m.set(sym("a"), Value::Int(10)).unwrap();
        assert_eq!(m.get(&sym("a")), Some(Value::Int(10)));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn delete_leaves_chain_intact() {
        let mut m = ValueMap::new();
        for i in 0..6 {
            m.set(Value::Int(i), Value::Int(i * 10)).unwrap();
        }
        assert!(m.delete(&Value::Int(3)));
        assert!(!m.delete(&Value::Int(3)));
        assert_eq!(m.len(), 5);
        // Every other key must still probe through any tombstone.
        for i in [0, 1, 2, 4, 5] {
            assert_eq!(m.get(&Value::Int(i)), Some(Value::Int(i * 10)), "key {i}");
        }
        assert_eq!(m.get(&Value::Int(3)), None);
    }

    #[test]
    fn set_delete_set_round_trip() {
        let mut m = ValueMap::new();
        m.set(sym("k"), Value::Int(1)).unwrap();
        assert!(m.delete(&sym("k")));
        assert_eq!(m.len(), 0);
        m.set(sym("k"), Value::Int(2)).unwrap();
        assert_eq!(m.get(&sym("k")), Some(Value::Int(2)));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn growth_keeps_every_key() {
        let mut m = ValueMap::new();
        let initial = m.capacity();
        for i in 0..1000 {
            m.set(Value::Int(i), Value::Int(-i)).unwrap();
        }
        assert!(m.capacity() > initial);
        assert_eq!(m.len(), 1000);
        for i in 0..1000 {
            assert_eq!(m.get(&Value::Int(i)), Some(Value::Int(-i)), "key {i}");
        }
    }

    #[test]
    fn growth_drops_tombstones() {
        let mut m = ValueMap::new();
        // Insert-then-delete distinct keys: the live count stays at zero
        // while tombstones pile up and eventually force a growth step, which
        // must discard them.
        for i in 0..200 {
            m.set(Value::Int(i), Value::Int(i)).unwrap();
            m.delete(&Value::Int(i));
        }
        assert_eq!(m.len(), 0);
        for i in 0..3 {
            m.set(Value::Int(i), Value::Int(i)).unwrap();
        }
        assert_eq!(m.len(), 3);
        assert_eq!(m.iter().count(), 3);
    }

    #[test]
    fn cursor_visits_each_entry_once() {
        let mut m = ValueMap::new();
        for i in 0..20 {
            m.set(Value::Int(i), Value::Int(i + 100)).unwrap();
        }
        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some((idx, key, value)) = m.next(cursor) {
            cursor = Some(idx);
            seen.push((key, value));
        }
        assert_eq!(seen.len(), 20);
        for i in 0..20 {
            assert!(seen.contains(&(Value::Int(i), Value::Int(i + 100))));
        }
    }

    #[test]
    fn iter_matches_cursor() {
        let mut m = ValueMap::new();
        for i in 0..5 {
            m.set(Value::Int(i), Value::Nil).unwrap();
        }
        assert_eq!(m.iter().count(), 5);
    }

    #[test]
    fn mixed_key_variants() {
        let mut m = ValueMap::new();
        m.set(Value::Nil, Value::Int(0)).unwrap();
        m.set(Value::Bool(true), Value::Int(1)).unwrap();
        m.set(Value::Float(2.5), Value::Int(2)).unwrap();
        m.set(Value::keyword("k"), Value::Int(3)).unwrap();
        m.set(Value::string("k"), Value::Int(4)).unwrap();
        assert_eq!(m.get(&Value::Nil), Some(Value::Int(0)));
        assert_eq!(m.get(&Value::Bool(true)), Some(Value::Int(1)));
        assert_eq!(m.get(&Value::Float(2.5)), Some(Value::Int(2)));
        assert_eq!(m.get(&Value::keyword("k")), Some(Value::Int(3)));
        assert_eq!(m.get(&Value::string("k")), Some(Value::Int(4)));
    }
}
