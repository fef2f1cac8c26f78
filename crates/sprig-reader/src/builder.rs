//! The parser drives an abstract [`Builder`]; [`TreeBuilder`] is the
//! concrete one that materializes heap values.

use sprig_core::{SprigError, Value};

/// Event interface between the parser and whatever consumes parse events.
///
/// Container events nest: `start_list`/`end_list` bracket sequence elements,
/// `start_map`/`end_map` bracket pairs, each pair being
/// `start_pair`, one key datum, `end_key`, one value datum, `end_pair`.
pub trait Builder {
    fn start_list(&mut self) -> Result<(), SprigError>;
    fn end_list(&mut self) -> Result<(), SprigError>;

    fn start_map(&mut self) -> Result<(), SprigError>;
    fn start_pair(&mut self) -> Result<(), SprigError>;
    fn end_key(&mut self) -> Result<(), SprigError>;
    fn end_pair(&mut self) -> Result<(), SprigError>;
    fn end_map(&mut self) -> Result<(), SprigError>;

    fn atom_str(&mut self, text: &str) -> Result<(), SprigError>;
    fn atom_sym(&mut self, text: &str) -> Result<(), SprigError>;
    fn atom_keyword(&mut self, text: &str) -> Result<(), SprigError>;
    fn atom_int(&mut self, value: i64) -> Result<(), SprigError>;
    fn atom_float(&mut self, value: f64) -> Result<(), SprigError>;
    fn atom_nil(&mut self) -> Result<(), SprigError>;
    fn atom_bool(&mut self, value: bool) -> Result<(), SprigError>;

    /// Bind the next produced datum to `label`.
    fn label_def(&mut self, label: u32) -> Result<(), SprigError>;
    /// Re-produce the datum bound to `label`. Returns false when the label
    /// is unknown.
    fn label_ref(&mut self, label: u32) -> Result<bool, SprigError>;

    /// Source position for the container currently being built.
    fn set_debug_info(&mut self, name: &str, line: u32) -> Result<(), SprigError>;

    /// Notification of a parse error; the parse itself still aborts.
    fn error(&mut self, _error: &SprigError) {}
}

enum Frame {
    Seq(Value),
    Map(Value),
    Pair {
        map: Value,
        key: Option<Value>,
        value: Option<Value>,
        key_done: bool,
    },
}

/// Builds nested heap values from parse events.
///
/// Every container is rooted from its `start_*` event until [`finish`]
/// (or [`abort`]), so a collection during the read cannot reclaim
/// in-progress structure. Datum labels live in a private [`ValueMap`]
/// (label id, as `Int`, to value), registered when the labelled datum
/// starts; a reference re-produces the same handle, which is how shared
/// and cyclic structure enters the tree.
///
/// [`finish`]: TreeBuilder::finish
/// [`abort`]: TreeBuilder::abort
pub struct TreeBuilder<'h> {
    heap: &'h mut sprig_core::Heap,
    frames: Vec<Frame>,
    labels: sprig_core::ValueMap,
    pending_labels: Vec<u32>,
    rooted: usize,
    top: Value,
    debug_info: bool,
}

impl<'h> TreeBuilder<'h> {
    pub fn new(heap: &'h mut sprig_core::Heap) -> Self {
        let top = heap.alloc_seq(0);
        heap.push_root(top);
        TreeBuilder {
            heap,
            frames: vec![Frame::Seq(top)],
            labels: sprig_core::ValueMap::new(),
            pending_labels: Vec::new(),
            rooted: 1,
            top,
            debug_info: true,
        }
    }

    pub fn set_debug_info_enabled(&mut self, enabled: bool) {
        self.debug_info = enabled;
    }

    /// Close the top-level sequence and hand it to the caller. The sequence
    /// is unrooted on return; the caller owns rooting from here.
    pub fn finish(mut self) -> Result<Value, SprigError> {
        self.heap.pop_roots(self.rooted);
        if self.frames.len() != 1 {
            return Err(SprigError::Builder(
                "input ended with an open container".to_string(),
            ));
        }
        Ok(self.top)
    }

    /// Drop all builder roots after a failed parse.
    pub fn abort(self) {
        self.heap.pop_roots(self.rooted);
    }

    fn register_labels(&mut self, value: Value) -> Result<(), SprigError> {
        for label in std::mem::take(&mut self.pending_labels) {
            self.labels.set(Value::Int(label as i64), value)?;
        }
        Ok(())
    }

    /// Route a finished datum into the innermost open container.
    fn produce(&mut self, value: Value) -> Result<(), SprigError> {
        self.register_labels(value)?;
        match self.frames.last_mut() {
            Some(Frame::Seq(seq)) => {
                let seq = *seq;
                self.heap.seq_push(seq, value);
                Ok(())
            }
            Some(Frame::Pair {
                key,
                value: pair_value,
                key_done,
                ..
            }) => {
                let slot = if *key_done { pair_value } else { key };
                if slot.is_some() {
                    return Err(SprigError::Builder(
                        "mapping pair received a surplus datum".to_string(),
                    ));
                }
                *slot = Some(value);
                Ok(())
            }
            Some(Frame::Map(_)) => Err(SprigError::Builder(
                "datum outside a key/value pair in a mapping".to_string(),
            )),
            None => Err(SprigError::Builder("datum with no open container".to_string())),
        }
    }

    fn open(&mut self, value: Value, frame: Frame) -> Result<(), SprigError> {
        self.heap.push_root(value);
        self.rooted += 1;
        self.register_labels(value)?;
        self.frames.push(frame);
        Ok(())
    }
}

impl Builder for TreeBuilder<'_> {
    fn start_list(&mut self) -> Result<(), SprigError> {
        let seq = self.heap.alloc_seq(0);
        self.open(seq, Frame::Seq(seq))
    }

    fn end_list(&mut self) -> Result<(), SprigError> {
        match self.frames.pop() {
            Some(Frame::Seq(seq)) if self.frames.is_empty() => {
                // The implicit top-level frame never closes from events.
                self.frames.push(Frame::Seq(seq));
                Err(SprigError::Builder("end_list at top level".to_string()))
            }
            Some(Frame::Seq(seq)) => self.produce(seq),
            _ => Err(SprigError::Builder(
                "end_list without a matching start_list".to_string(),
            )),
        }
    }

    fn start_map(&mut self) -> Result<(), SprigError> {
        let map = self.heap.alloc_map();
        self.open(map, Frame::Map(map))
    }

    fn start_pair(&mut self) -> Result<(), SprigError> {
        match self.frames.last() {
            Some(Frame::Map(map)) => {
                let map = *map;
                self.frames.push(Frame::Pair {
                    map,
                    key: None,
                    value: None,
                    key_done: false,
                });
                Ok(())
            }
            _ => Err(SprigError::Builder(
                "start_pair outside a mapping".to_string(),
            )),
        }
    }

    fn end_key(&mut self) -> Result<(), SprigError> {
        match self.frames.last_mut() {
            Some(Frame::Pair { key, key_done, .. }) if key.is_some() && !*key_done => {
                *key_done = true;
                Ok(())
            }
            _ => Err(SprigError::Builder(
                "end_key without a completed key datum".to_string(),
            )),
        }
    }

    fn end_pair(&mut self) -> Result<(), SprigError> {
        match self.frames.pop() {
            Some(Frame::Pair {
                map,
                key: Some(key),
                value: Some(value),
                key_done: true,
            }) => self.heap.map_set(map, key, value),
            _ => Err(SprigError::Builder(
                "end_pair without a completed key/value pair".to_string(),
            )),
        }
    }

    fn end_map(&mut self) -> Result<(), SprigError> {
        match self.frames.pop() {
            Some(Frame::Map(map)) => self.produce(map),
            _ => Err(SprigError::Builder(
                "end_map without a matching start_map".to_string(),
            )),
        }
    }

    fn atom_str(&mut self, text: &str) -> Result<(), SprigError> {
        self.produce(Value::string(text))
    }

    fn atom_sym(&mut self, text: &str) -> Result<(), SprigError> {
        self.produce(Value::symbol(text))
    }

    fn atom_keyword(&mut self, text: &str) -> Result<(), SprigError> {
        self.produce(Value::keyword(text))
    }

    fn atom_int(&mut self, value: i64) -> Result<(), SprigError> {
        self.produce(Value::Int(value))
    }

    fn atom_float(&mut self, value: f64) -> Result<(), SprigError> {
        self.produce(Value::Float(value))
    }

    fn atom_nil(&mut self) -> Result<(), SprigError> {
        self.produce(Value::Nil)
    }

    fn atom_bool(&mut self, value: bool) -> Result<(), SprigError> {
        self.produce(Value::Bool(value))
    }

    fn label_def(&mut self, label: u32) -> Result<(), SprigError> {
        self.pending_labels.push(label);
        Ok(())
    }

    fn label_ref(&mut self, label: u32) -> Result<bool, SprigError> {
        match self.labels.get(&Value::Int(label as i64)) {
            Some(value) => {
                self.produce(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_debug_info(&mut self, name: &str, line: u32) -> Result<(), SprigError> {
        if !self.debug_info {
            return Ok(());
        }
        let current = match self.frames.last() {
            Some(Frame::Seq(v)) | Some(Frame::Map(v)) => *v,
            _ => return Ok(()),
        };
        self.heap.set_debug_info(current, name, line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprig_core::Heap;

    #[test]
    fn flat_atoms_collect_into_top_sequence() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        b.atom_int(1).unwrap();
        b.atom_sym("x").unwrap();
        b.atom_nil().unwrap();
        let top = b.finish().unwrap();
        assert_eq!(heap.seq_len(top), 3);
        assert_eq!(heap.seq_get(top, 0), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(top, 1), Some(Value::symbol("x")));
        assert_eq!(heap.seq_get(top, 2), Some(Value::Nil));
    }

    #[test]
    fn nested_list_and_map() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        b.start_list().unwrap();
        b.atom_int(1).unwrap();
        b.start_map().unwrap();
        b.start_pair().unwrap();
        b.atom_keyword("k").unwrap();
        b.end_key().unwrap();
        b.atom_int(2).unwrap();
        b.end_pair().unwrap();
        b.end_map().unwrap();
        b.end_list().unwrap();
        let top = b.finish().unwrap();

        let list = heap.seq_get(top, 0).unwrap();
        assert_eq!(heap.seq_len(list), 2);
        let map = heap.seq_get(list, 1).unwrap();
        assert_eq!(heap.map_get(map, Value::keyword("k")), Some(Value::Int(2)));
    }

    #[test]
    fn labels_alias_the_same_container() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        b.label_def(1).unwrap();
        b.start_list().unwrap();
        b.atom_int(1).unwrap();
        assert!(b.label_ref(1).unwrap());
        b.end_list().unwrap();
        let top = b.finish().unwrap();

        let list = heap.seq_get(top, 0).unwrap();
        // Second element is the list itself.
        assert_eq!(heap.seq_get(list, 1), Some(list));
    }

    #[test]
    fn unknown_label_reports_false() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        assert!(!b.label_ref(9).unwrap());
        b.abort();
    }

    #[test]
    fn roots_are_balanced() {
        let mut heap = Heap::new();
        let before = heap.root_count();
        {
            let mut b = TreeBuilder::new(&mut heap);
            b.start_list().unwrap();
            b.atom_int(1).unwrap();
            // Parse failed mid-container.
            b.abort();
        }
        assert_eq!(heap.root_count(), before);
    }

    #[test]
    fn in_progress_containers_survive_collection() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        b.start_map().unwrap();
        b.start_pair().unwrap();
        b.start_list().unwrap();
        b.atom_int(1).unwrap();
        b.end_list().unwrap();
        b.end_key().unwrap();
        // A pair key is held only by the builder here; it must be rooted.
        assert_eq!(b.heap.collect(), 0);
        b.atom_int(2).unwrap();
        b.end_pair().unwrap();
        b.end_map().unwrap();
        let top = b.finish().unwrap();
        let map = heap.seq_get(top, 0).unwrap();
        assert_eq!(heap.map_len(map), 1);
    }

    #[test]
    fn protocol_violations_are_errors() {
        let mut heap = Heap::new();
        let mut b = TreeBuilder::new(&mut heap);
        assert!(b.end_list().is_err());
        assert!(b.start_pair().is_err());
        assert!(b.end_key().is_err());
        b.abort();
    }
}
