//! The parsed-form tree the emitter walks. Produced by the surrounding
//! language layer; [`Form::from_value`] bridges from reader output.

use lasso::Spur;
use sprig_core::{intern, resolve, Heap, SprigError, Value, META_LINE, META_NAME};

#[derive(Debug, Clone, PartialEq)]
pub enum FormKind {
    Sym(Spur),
    Int(i64),
    Float(f64),
    Keyword(Spur),
    List(Vec<Form>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub kind: FormKind,
    /// Input name, for diagnostics.
    pub file: Spur,
    pub line: u32,
}

impl Form {
    pub fn new(kind: FormKind, file: Spur, line: u32) -> Self {
        Form { kind, file, line }
    }

    pub fn sym(name: &str) -> Self {
        Form::new(FormKind::Sym(intern(name)), intern("<none>"), 0)
    }

    pub fn int(value: i64) -> Self {
        Form::new(FormKind::Int(value), intern("<none>"), 0)
    }

    pub fn float(value: f64) -> Self {
        Form::new(FormKind::Float(value), intern("<none>"), 0)
    }

    pub fn keyword(name: &str) -> Self {
        Form::new(FormKind::Keyword(intern(name)), intern("<none>"), 0)
    }

    pub fn list(items: Vec<Form>) -> Self {
        Form::new(FormKind::List(items), intern("<none>"), 0)
    }

    pub fn as_sym(&self) -> Option<Spur> {
        match self.kind {
            FormKind::Sym(s) => Some(s),
            _ => None,
        }
    }

    /// Lower a reader value to a form tree. Sequences become list forms and
    /// pick up their stamped (input name, line) metadata; atoms inherit the
    /// position of the enclosing sequence. `nil`/booleans lower back to the
    /// symbols they were read from. Acyclic input only; values with no form
    /// counterpart (strings, mappings, opaque handles) are rejected.
    pub fn from_value(heap: &Heap, value: Value) -> Result<Form, SprigError> {
        Self::lower(heap, value, intern("<input>"), 0)
    }

    fn lower(heap: &Heap, value: Value, file: Spur, line: u32) -> Result<Form, SprigError> {
        let kind = match value {
            Value::Nil => FormKind::Sym(intern("nil")),
            Value::Bool(true) => FormKind::Sym(intern("true")),
            Value::Bool(false) => FormKind::Sym(intern("false")),
            Value::Int(n) => FormKind::Int(n),
            Value::Float(x) => FormKind::Float(x),
            Value::Symbol(s) => FormKind::Sym(s),
            Value::Keyword(s) => FormKind::Keyword(s),
            Value::Seq(r) => {
                let (file, line) = Self::position(heap, value, file, line);
                let items = heap.seq(r).items.clone();
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    children.push(Self::lower(heap, item, file, line)?);
                }
                return Ok(Form::new(FormKind::List(children), file, line));
            }
            other => {
                return Err(SprigError::BadForm(format!(
                    "{} value has no form representation",
                    other.type_name()
                )))
            }
        };
        Ok(Form::new(kind, file, line))
    }

    fn position(heap: &Heap, value: Value, file: Spur, line: u32) -> (Spur, u32) {
        let file = match heap.meta(value, META_NAME) {
            Value::Str(s) => s,
            _ => file,
        };
        let line = match heap.meta(value, META_LINE) {
            Value::Int(n) if n >= 0 => n as u32,
            _ => line,
        };
        (file, line)
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            FormKind::Sym(s) => resolve(*s),
            FormKind::Int(n) => n.to_string(),
            FormKind::Float(x) => sprig_core::fmt_float(*x),
            FormKind::Keyword(s) => format!("{}:", resolve(*s)),
            FormKind::List(items) => format!("({} ...)", items.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atoms_lower() {
        let heap = Heap::new();
        assert_eq!(
            Form::from_value(&heap, Value::Int(3)).unwrap().kind,
            FormKind::Int(3)
        );
        assert_eq!(
            Form::from_value(&heap, Value::symbol("x")).unwrap().kind,
            FormKind::Sym(intern("x"))
        );
        assert_eq!(
            Form::from_value(&heap, Value::Nil).unwrap().kind,
            FormKind::Sym(intern("nil"))
        );
        assert_eq!(
            Form::from_value(&heap, Value::Bool(true)).unwrap().kind,
            FormKind::Sym(intern("true"))
        );
    }

    #[test]
    fn sequences_lower_with_position() {
        let mut heap = Heap::new();
        let s = heap.alloc_seq(0);
        heap.seq_push(s, Value::symbol("f"));
        heap.seq_push(s, Value::Int(1));
        heap.set_debug_info(s, "demo.sl", 7);

        let form = Form::from_value(&heap, s).unwrap();
        assert_eq!(form.file, intern("demo.sl"));
        assert_eq!(form.line, 7);
        match &form.kind {
            FormKind::List(items) => {
                assert_eq!(items.len(), 2);
                // Atoms inherit the sequence's position.
                assert_eq!(items[1].line, 7);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn strings_are_rejected() {
        let heap = Heap::new();
        assert!(Form::from_value(&heap, Value::string("s")).is_err());
    }
}
