//! Compile-time lexical environments: a scope stack mirroring the frame
//! chain the VM will maintain at run time.

use hashbrown::HashMap;
use lasso::Spur;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Var,
    /// Root-frame built-in, addressed with `PUSH_PRIM` rather than the
    /// frame chain.
    Primitive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    /// Frames outward from the innermost scope.
    pub depth: usize,
    pub slot: usize,
    pub kind: SlotKind,
    /// Whether the name lives in the root frame (maximal depth).
    pub root: bool,
}

#[derive(Debug, Default)]
struct Frame {
    slots: HashMap<Spur, (usize, SlotKind)>,
    next: usize,
}

impl Frame {
    fn define(&mut self, name: Spur, kind: SlotKind) -> usize {
        if let Some(&(slot, _)) = self.slots.get(&name) {
            self.slots.insert(name, (slot, kind));
            return slot;
        }
        let slot = self.next;
        self.next += 1;
        self.slots.insert(name, (slot, kind));
        slot
    }
}

/// `frames[0]` is the root frame; the rest are lexical scopes, innermost
/// last.
#[derive(Debug)]
pub struct Env {
    frames: Vec<Frame>,
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Env {
            frames: vec![Frame::default()],
        }
    }

    pub fn define_primitive(&mut self, name: Spur) -> u32 {
        self.frames[0].define(name, SlotKind::Primitive) as u32
    }

    pub fn define_root_var(&mut self, name: Spur) -> usize {
        self.frames[0].define(name, SlotKind::Var)
    }

    pub fn push_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the root frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Define a name in the innermost scope, returning its slot.
    pub fn define(&mut self, name: Spur) -> usize {
        let innermost = self.frames.len() - 1;
        self.frames[innermost].define(name, SlotKind::Var)
    }

    /// Innermost-out lookup.
    pub fn resolve(&self, name: Spur) -> Option<Resolved> {
        for (depth, frame) in self.frames.iter().rev().enumerate() {
            if let Some(&(slot, kind)) = frame.slots.get(&name) {
                return Some(Resolved {
                    depth,
                    slot,
                    kind,
                    root: depth == self.frames.len() - 1,
                });
            }
        }
        None
    }
}
