//! Value-to-text rendering. Both printers are shared-structure aware: a
//! pre-pass assigns labels to every container reachable through more than
//! one path (or through itself), and the emitter prints `#k=` at the first
//! sighting and `#k#` everywhere else, so cyclic data prints in finite,
//! re-readable form.

use sprig_core::{fmt_float, with_resolved, Heap, SprigError, Value, ValueMap};

/// Sequences up to this many elements print on one line in pretty mode.
const SEQ_COMPACT_MAX: usize = 12;
/// Mappings up to this many entries print on one line in pretty mode.
const MAP_COMPACT_MAX: usize = 6;
/// A scalar sequence head at most this long stays on the opening line when
/// the sequence breaks across lines.
const HEAD_COMPACT_MAX: usize = 16;

/// Render compactly on a single line.
pub fn write(heap: &Heap, value: Value) -> Result<String, SprigError> {
    let mut printer = Printer::new(heap, false);
    printer.scan(value)?;
    printer.emit(value, 0)?;
    Ok(printer.out)
}

/// Render with indentation; small containers stay on one line, mapping keys
/// are sorted by the value total order.
pub fn write_pretty(heap: &Heap, value: Value) -> Result<String, SprigError> {
    let mut printer = Printer::new(heap, true);
    printer.scan(value)?;
    printer.emit(value, 0)?;
    Ok(printer.out)
}

struct Printer<'h> {
    heap: &'h Heap,
    /// Container → `Int(state)`: 0 = seen once, k > 0 = needs label k,
    /// k < 0 = label -k already defined in the output.
    refs: ValueMap,
    next_label: i64,
    pretty: bool,
    out: String,
}

/// Only sequences and mappings participate in back-referencing; extension
/// records print opaquely.
fn tracked(value: Value) -> bool {
    matches!(value, Value::Seq(_) | Value::Map(_))
}

impl<'h> Printer<'h> {
    fn new(heap: &'h Heap, pretty: bool) -> Self {
        Printer {
            heap,
            refs: ValueMap::new(),
            next_label: 1,
            pretty,
            out: String::new(),
        }
    }

    /// First pass: label every container reachable twice. A container found
    /// while still marked "in progress" (state 0) is on a second path or a
    /// cycle, so it gets the next label; recursion stops there, which is
    /// what makes the pass terminate on cyclic input.
    fn scan(&mut self, value: Value) -> Result<(), SprigError> {
        if !tracked(value) {
            return Ok(());
        }
        match self.refs.get(&value) {
            None => {
                self.refs.set(value, Value::Int(0))?;
                match value {
                    Value::Seq(r) => {
                        let items = self.heap.seq(r).items.clone();
                        for item in items {
                            self.scan(item)?;
                        }
                    }
                    Value::Map(r) => {
                        let entries: Vec<(Value, Value)> =
                            self.heap.map(r).table.iter().collect();
                        for (key, item) in entries {
                            self.scan(key)?;
                            self.scan(item)?;
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
            Some(Value::Int(0)) => {
                self.refs.set(value, Value::Int(self.next_label))?;
                self.next_label += 1;
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    fn emit(&mut self, value: Value, indent: usize) -> Result<(), SprigError> {
        if tracked(value) {
            match self.refs.get(&value) {
                Some(Value::Int(label)) if label > 0 => {
                    self.out.push_str(&format!("#{label}="));
                    self.refs.set(value, Value::Int(-label))?;
                }
                Some(Value::Int(label)) if label < 0 => {
                    self.out.push_str(&format!("#{}#", -label));
                    return Ok(());
                }
                _ => {}
            }
        }
        match value {
            Value::Seq(r) => self.emit_seq(r, indent),
            Value::Map(r) => self.emit_map(r, indent),
            _ => {
                self.emit_scalar(value);
                Ok(())
            }
        }
    }

    fn emit_seq(&mut self, r: sprig_core::SeqRef, indent: usize) -> Result<(), SprigError> {
        let items = self.heap.seq(r).items.clone();
        self.out.push('(');
        if self.pretty && items.len() > SEQ_COMPACT_MAX {
            let mut rest = items.as_slice();
            // A short scalar head (typically the operator) stays on the
            // opening line.
            if let Some((&first, tail)) = items.split_first() {
                if !first.is_container() {
                    let mut head = String::new();
                    render_scalar(self.heap, first, &mut head);
                    if head.len() <= HEAD_COMPACT_MAX {
                        self.out.push_str(&head);
                        rest = tail;
                    }
                }
            }
            for &item in rest {
                self.newline(indent + 2);
                self.emit(item, indent + 2)?;
            }
        } else {
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    self.out.push(' ');
                }
                self.emit(item, indent)?;
            }
        }
        self.out.push(')');
        Ok(())
    }

    fn emit_map(&mut self, r: sprig_core::MapRef, indent: usize) -> Result<(), SprigError> {
        let mut entries: Vec<(Value, Value)> = self.heap.map(r).table.iter().collect();
        self.out.push('{');
        if self.pretty && entries.len() > MAP_COMPACT_MAX {
            entries.sort_by(|a, b| a.0.total_cmp(b.0));
            for &(key, item) in &entries {
                self.newline(indent + 2);
                self.emit(key, indent + 2)?;
                self.out.push(' ');
                self.emit(item, indent + 2)?;
            }
        } else {
            // Storage (bucket) order; deliberately unsorted.
            for (i, &(key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    self.out.push(' ');
                }
                self.emit(key, indent)?;
                self.out.push(' ');
                self.emit(item, indent)?;
            }
        }
        self.out.push('}');
        Ok(())
    }

    fn emit_scalar(&mut self, value: Value) {
        render_scalar(self.heap, value, &mut self.out);
    }

    fn newline(&mut self, indent: usize) {
        self.out.push('\n');
        for _ in 0..indent {
            self.out.push(' ');
        }
    }
}

fn render_scalar(heap: &Heap, value: Value, out: &mut String) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(x) => out.push_str(&fmt_float(x)),
        Value::Symbol(s) => with_resolved(s, |text| out.push_str(text)),
        Value::Keyword(s) => {
            with_resolved(s, |text| out.push_str(text));
            out.push(':');
        }
        Value::Str(s) => {
            out.push('"');
            with_resolved(s, |text| escape_into(out, text));
            out.push('"');
        }
        Value::Syntax(s) => {
            with_resolved(s, |text| out.push_str(&format!("#<syntax {text}>")));
        }
        Value::Primitive(i) => out.push_str(&format!("#<prim {i}>")),
        Value::Closure(i) => out.push_str(&format!("#<closure {i}>")),
        Value::Foreign(p) => out.push_str(&format!("#<foreign {p:#x}>")),
        Value::Ext(r) => {
            let tag = heap.ext(r).tag;
            with_resolved(tag, |text| out.push_str(&format!("#<ext {text}>")));
        }
        Value::Seq(_) | Value::Map(_) => unreachable!("containers go through emit"),
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:x};", c as u32)),
            c => out.push(c),
        }
    }
}
