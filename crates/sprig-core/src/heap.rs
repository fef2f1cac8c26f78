//! Arena-backed storage for containers, with an explicit root set and a
//! synchronous mark-and-sweep collector.
//!
//! Values are `Copy` handles; the heap owns the container bodies. Components
//! that hold container values across an allocating call must root them with
//! [`Heap::push_root`] / [`Heap::pop_roots`] or they are fair game for the
//! next [`Heap::collect`].

use lasso::Spur;

use crate::error::SprigError;
use crate::table::ValueMap;
use crate::value::{intern, ExtRef, MapRef, SeqRef, Value};

/// Number of metadata registers per container.
pub const META_REGISTERS: usize = 2;
/// Register holding the input name (a `Str`) for diagnostics.
pub const META_NAME: usize = 0;
/// Register holding the source line (an `Int`) for diagnostics.
pub const META_LINE: usize = 1;

#[derive(Debug, Clone)]
pub struct SeqData {
    pub items: Vec<Value>,
    pub meta: [Value; META_REGISTERS],
}

#[derive(Debug, Clone)]
pub struct MapData {
    pub table: ValueMap,
    pub meta: [Value; META_REGISTERS],
}

/// User-extension record: an interned tag plus opaque fields the collector
/// still traces.
#[derive(Debug, Clone)]
pub struct ExtData {
    pub tag: Spur,
    pub fields: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct Heap {
    seqs: Vec<Option<SeqData>>,
    seq_free: Vec<u32>,
    maps: Vec<Option<MapData>>,
    map_free: Vec<u32>,
    exts: Vec<Option<ExtData>>,
    ext_free: Vec<u32>,
    roots: Vec<Value>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    // ---- allocation ----

    pub fn alloc_seq(&mut self, capacity: usize) -> Value {
        let data = SeqData {
            items: Vec::with_capacity(capacity),
            meta: [Value::Nil; META_REGISTERS],
        };
        let idx = match self.seq_free.pop() {
            Some(idx) => {
                self.seqs[idx as usize] = Some(data);
                idx
            }
            None => {
                self.seqs.push(Some(data));
                (self.seqs.len() - 1) as u32
            }
        };
        Value::Seq(SeqRef(idx))
    }

    pub fn alloc_map(&mut self) -> Value {
        let data = MapData {
            table: ValueMap::new(),
            meta: [Value::Nil; META_REGISTERS],
        };
        let idx = match self.map_free.pop() {
            Some(idx) => {
                self.maps[idx as usize] = Some(data);
                idx
            }
            None => {
                self.maps.push(Some(data));
                (self.maps.len() - 1) as u32
            }
        };
        Value::Map(MapRef(idx))
    }

    pub fn alloc_ext(&mut self, tag: &str, fields: Vec<Value>) -> Value {
        let data = ExtData {
            tag: intern(tag),
            fields,
        };
        let idx = match self.ext_free.pop() {
            Some(idx) => {
                self.exts[idx as usize] = Some(data);
                idx
            }
            None => {
                self.exts.push(Some(data));
                (self.exts.len() - 1) as u32
            }
        };
        Value::Ext(ExtRef(idx))
    }

    /// Idempotent symbol creation; same text always yields an equal value.
    pub fn new_symbol(&mut self, text: &str) -> Value {
        Value::symbol(text)
    }

    // ---- typed access; a stale or mistyped handle is a contract violation ----

    pub fn seq(&self, r: SeqRef) -> &SeqData {
        match self.seqs.get(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead sequence handle {}", r.index()),
        }
    }

    pub fn seq_mut(&mut self, r: SeqRef) -> &mut SeqData {
        match self.seqs.get_mut(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead sequence handle {}", r.index()),
        }
    }

    pub fn map(&self, r: MapRef) -> &MapData {
        match self.maps.get(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead mapping handle {}", r.index()),
        }
    }

    pub fn map_mut(&mut self, r: MapRef) -> &mut MapData {
        match self.maps.get_mut(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead mapping handle {}", r.index()),
        }
    }

    pub fn ext(&self, r: ExtRef) -> &ExtData {
        match self.exts.get(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead extension handle {}", r.index()),
        }
    }

    pub fn ext_mut(&mut self, r: ExtRef) -> &mut ExtData {
        match self.exts.get_mut(r.index()) {
            Some(Some(data)) => data,
            _ => panic!("access to dead extension handle {}", r.index()),
        }
    }

    fn as_seq(&self, value: Value) -> SeqRef {
        match value {
            Value::Seq(r) => r,
            other => panic!("sequence operation on a {} value", other.type_name()),
        }
    }

    fn as_map(&self, value: Value) -> MapRef {
        match value {
            Value::Map(r) => r,
            other => panic!("mapping operation on a {} value", other.type_name()),
        }
    }

    // ---- sequence operations ----

    pub fn seq_len(&self, value: Value) -> usize {
        self.seq(self.as_seq(value)).items.len()
    }

    pub fn seq_get(&self, value: Value, index: usize) -> Option<Value> {
        self.seq(self.as_seq(value)).items.get(index).copied()
    }

    pub fn seq_set(&mut self, value: Value, index: usize, item: Value) {
        let r = self.as_seq(value);
        let items = &mut self.seq_mut(r).items;
        match items.get_mut(index) {
            Some(slot) => *slot = item,
            None => panic!(
                "sequence index {index} out of bounds (len {})",
                items.len()
            ),
        }
    }

    pub fn seq_push(&mut self, value: Value, item: Value) {
        let r = self.as_seq(value);
        self.seq_mut(r).items.push(item);
    }

    pub fn seq_pop(&mut self, value: Value) -> Option<Value> {
        let r = self.as_seq(value);
        self.seq_mut(r).items.pop()
    }

    /// In-place sort by the value total order.
    pub fn seq_sort(&mut self, value: Value) {
        let r = self.as_seq(value);
        let mut items = std::mem::take(&mut self.seq_mut(r).items);
        items.sort_by(|a, b| a.total_cmp(*b));
        self.seq_mut(r).items = items;
    }

    // ---- mapping operations ----

    pub fn map_len(&self, value: Value) -> usize {
        self.map(self.as_map(value)).table.len()
    }

    pub fn map_get(&self, value: Value, key: Value) -> Option<Value> {
        self.map(self.as_map(value)).table.get(&key)
    }

    pub fn map_set(&mut self, value: Value, key: Value, item: Value) -> Result<(), SprigError> {
        let r = self.as_map(value);
        self.map_mut(r).table.set(key, item)
    }

    pub fn map_delete(&mut self, value: Value, key: Value) -> bool {
        let r = self.as_map(value);
        self.map_mut(r).table.delete(&key)
    }

    // ---- metadata registers ----

    pub fn set_meta(&mut self, value: Value, register: usize, meta: Value) {
        assert!(register < META_REGISTERS, "metadata register {register}");
        match value {
            Value::Seq(r) => self.seq_mut(r).meta[register] = meta,
            Value::Map(r) => self.map_mut(r).meta[register] = meta,
            other => panic!("metadata on a {} value", other.type_name()),
        }
    }

    pub fn meta(&self, value: Value, register: usize) -> Value {
        assert!(register < META_REGISTERS, "metadata register {register}");
        match value {
            Value::Seq(r) => self.seq(r).meta[register],
            Value::Map(r) => self.map(r).meta[register],
            other => panic!("metadata on a {} value", other.type_name()),
        }
    }

    /// Stamp `(input name, line)` diagnostics onto a container.
    pub fn set_debug_info(&mut self, value: Value, name: &str, line: u32) {
        self.set_meta(value, META_NAME, Value::string(name));
        self.set_meta(value, META_LINE, Value::Int(line as i64));
    }

    // ---- roots ----

    pub fn push_root(&mut self, value: Value) {
        self.roots.push(value);
    }

    pub fn pop_roots(&mut self, n: usize) {
        let keep = self.roots.len().saturating_sub(n);
        self.roots.truncate(keep);
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    // ---- collection ----

    /// Mark everything reachable from the root set (iteratively, so cyclic
    /// and deeply nested structures are fine), then sweep dead containers
    /// onto the free lists. Returns the number of containers freed.
    pub fn collect(&mut self) -> usize {
        let mut seq_marks = vec![false; self.seqs.len()];
        let mut map_marks = vec![false; self.maps.len()];
        let mut ext_marks = vec![false; self.exts.len()];

        let mut worklist: Vec<Value> = self.roots.clone();
        while let Some(value) = worklist.pop() {
            match value {
                Value::Seq(r) => {
                    let idx = r.index();
                    if seq_marks[idx] {
                        continue;
                    }
                    seq_marks[idx] = true;
                    let data = self.seq(r);
                    worklist.extend(data.items.iter().copied());
                    worklist.extend(data.meta.iter().copied());
                }
                Value::Map(r) => {
                    let idx = r.index();
                    if map_marks[idx] {
                        continue;
                    }
                    map_marks[idx] = true;
                    let data = self.map(r);
                    for (key, item) in data.table.iter() {
                        worklist.push(key);
                        worklist.push(item);
                    }
                    worklist.extend(data.meta.iter().copied());
                }
                Value::Ext(r) => {
                    let idx = r.index();
                    if ext_marks[idx] {
                        continue;
                    }
                    ext_marks[idx] = true;
                    worklist.extend(self.ext(r).fields.iter().copied());
                }
                _ => {}
            }
        }

        let mut freed = 0;
        for (idx, slot) in self.seqs.iter_mut().enumerate() {
            if slot.is_some() && !seq_marks[idx] {
                *slot = None;
                self.seq_free.push(idx as u32);
                freed += 1;
            }
        }
        for (idx, slot) in self.maps.iter_mut().enumerate() {
            if slot.is_some() && !map_marks[idx] {
                *slot = None;
                self.map_free.push(idx as u32);
                freed += 1;
            }
        }
        for (idx, slot) in self.exts.iter_mut().enumerate() {
            if slot.is_some() && !ext_marks[idx] {
                *slot = None;
                self.ext_free.push(idx as u32);
                freed += 1;
            }
        }
        freed
    }

    /// Structural comparison for acyclic values. Containers compare by
    /// content; mapping comparison is pairwise (quadratic) because keys may
    /// themselves need deep comparison.
    pub fn deep_eq(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Seq(x), Value::Seq(y)) => {
                if x == y {
                    return true;
                }
                let xs = &self.seq(x).items;
                let ys = &self.seq(y).items;
                xs.len() == ys.len()
                    && xs.iter().zip(ys.iter()).all(|(&p, &q)| self.deep_eq(p, q))
            }
            (Value::Map(x), Value::Map(y)) => {
                if x == y {
                    return true;
                }
                let xt = &self.map(x).table;
                let yt = &self.map(y).table;
                xt.len() == yt.len()
                    && xt.iter().all(|(xk, xv)| {
                        yt.iter()
                            .any(|(yk, yv)| self.deep_eq(xk, yk) && self.deep_eq(xv, yv))
                    })
            }
            (Value::Ext(x), Value::Ext(y)) => {
                if x == y {
                    return true;
                }
                let xd = self.ext(x);
                let yd = self.ext(y);
                xd.tag == yd.tag
                    && xd.fields.len() == yd.fields.len()
                    && xd
                        .fields
                        .iter()
                        .zip(yd.fields.iter())
                        .all(|(&p, &q)| self.deep_eq(p, q))
            }
            _ => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_access() {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(0);
        heap.seq_push(s, Value::Int(1));
        heap.seq_push(s, Value::Int(2));
        assert_eq!(heap.seq_len(s), 2);
        assert_eq!(heap.seq_get(s, 0), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(s, 5), None);
        assert_eq!(heap.seq_pop(s), Some(Value::Int(2)));
        assert_eq!(heap.seq_len(s), 1);
    }

    #[test]
    fn seq_set_and_sort() {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(3);
        for v in [Value::Int(3), Value::Int(1), Value::Int(2)] {
            heap.seq_push(s, v);
        }
        heap.seq_set(s, 0, Value::Int(9));
        assert_eq!(heap.seq_get(s, 0), Some(Value::Int(9)));
        heap.seq_sort(s);
        assert_eq!(heap.seq_get(s, 0), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(s, 2), Some(Value::Int(9)));
    }

    #[test]
    fn map_operations() {
        let mut heap = Heap::new();
        let m = heap.alloc_map();
        heap.map_set(m, Value::symbol("a"), Value::Int(1)).unwrap();
        heap.map_set(m, Value::symbol("b"), Value::Int(2)).unwrap();
        assert_eq!(heap.map_len(m), 2);
        assert_eq!(heap.map_get(m, Value::symbol("a")), Some(Value::Int(1)));
        assert!(heap.map_delete(m, Value::symbol("a")));
        assert_eq!(heap.map_get(m, Value::symbol("a")), None);
        assert_eq!(heap.map_len(m), 1);
    }

    #[test]
    fn metadata_registers() {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(0);
        heap.set_debug_info(s, "input.sl", 42);
        assert_eq!(heap.meta(s, META_NAME), Value::string("input.sl"));
        assert_eq!(heap.meta(s, META_LINE), Value::Int(42));
    }

    #[test]
    fn collect_frees_unrooted() {
        let mut heap = Heap::new();
        let kept = heap.alloc_seq(0);
        let _dropped = heap.alloc_seq(0);
        heap.push_root(kept);
        assert_eq!(heap.collect(), 1);
        // Kept container still usable.
        heap.seq_push(kept, Value::Int(1));
        assert_eq!(heap.seq_len(kept), 1);
    }

    #[test]
    fn collect_traces_nested_and_meta() {
        let mut heap = Heap::new();
        let outer = heap.alloc_seq(0);
        let inner = heap.alloc_seq(0);
        let meta_holder = heap.alloc_seq(0);
        heap.seq_push(outer, inner);
        heap.set_meta(outer, META_NAME, meta_holder);
        heap.push_root(outer);
        assert_eq!(heap.collect(), 0);
        assert_eq!(heap.seq_len(inner), 0);
        assert_eq!(heap.seq_len(meta_holder), 0);
    }

    #[test]
    fn collect_traces_map_keys_and_values() {
        let mut heap = Heap::new();
        let m = heap.alloc_map();
        let key = heap.alloc_seq(0);
        let val = heap.alloc_seq(0);
        heap.map_set(m, key, val).unwrap();
        heap.push_root(m);
        assert_eq!(heap.collect(), 0);
        assert_eq!(heap.seq_len(key), 0);
        assert_eq!(heap.seq_len(val), 0);
    }

    #[test]
    fn collect_handles_cycles() {
        let mut heap = Heap::new();
        let a = heap.alloc_seq(0);
        let b = heap.alloc_seq(0);
        heap.seq_push(a, b);
        heap.seq_push(b, a);
        heap.push_root(a);
        assert_eq!(heap.collect(), 0);
        heap.pop_roots(1);
        assert_eq!(heap.collect(), 2);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut heap = Heap::new();
        let dead = heap.alloc_seq(0);
        let dead_ref = match dead {
            Value::Seq(r) => r,
            _ => unreachable!(),
        };
        heap.collect();
        let reborn = heap.alloc_seq(0);
        assert_eq!(reborn, Value::Seq(dead_ref));
    }

    #[test]
    fn ext_records_trace_fields() {
        let mut heap = Heap::new();
        let field = heap.alloc_seq(0);
        let e = heap.alloc_ext("point", vec![field, Value::Int(3)]);
        heap.push_root(e);
        assert_eq!(heap.collect(), 0);
        assert_eq!(heap.seq_len(field), 0);
    }

    #[test]
    fn deep_eq_sequences_and_maps() {
        let mut heap = Heap::new();
        let a = heap.alloc_seq(0);
        let b = heap.alloc_seq(0);
        for s in [a, b] {
            heap.seq_push(s, Value::Int(1));
            heap.seq_push(s, Value::symbol("x"));
        }
        assert!(heap.deep_eq(a, b));
        heap.seq_push(a, Value::Nil);
        assert!(!heap.deep_eq(a, b));

        let m1 = heap.alloc_map();
        let m2 = heap.alloc_map();
        heap.map_set(m1, Value::keyword("k"), a).unwrap();
        heap.map_set(m2, Value::keyword("k"), a).unwrap();
        assert!(heap.deep_eq(m1, m2));
        heap.map_set(m2, Value::keyword("k"), Value::Int(1)).unwrap();
        assert!(!heap.deep_eq(m1, m2));
    }

    #[test]
    #[should_panic(expected = "sequence operation")]
    fn seq_op_on_scalar_panics() {
        let heap = Heap::new();
        heap.seq_len(Value::Int(1));
    }

    #[test]
    #[should_panic(expected = "dead sequence handle")]
    fn stale_handle_panics() {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(0);
        heap.collect();
        heap.seq_len(s);
    }
}
