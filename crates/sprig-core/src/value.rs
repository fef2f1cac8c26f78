use std::cell::RefCell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use fxhash::FxHasher;
use lasso::{Rodeo, Spur};

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// Compare two Spurs by their resolved string content (lexicographic).
pub fn compare_spurs(a: Spur, b: Spur) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    INTERNER.with(|r| {
        let interner = r.borrow();
        interner.resolve(&a).cmp(interner.resolve(&b))
    })
}

/// Handle into the heap's sequence arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqRef(pub(crate) u32);

/// Handle into the heap's mapping arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapRef(pub(crate) u32);

/// Handle into the heap's extension-record arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtRef(pub(crate) u32);

impl SeqRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl MapRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ExtRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The universal tagged value. `Copy`: scalars carry their content (interned
/// text is a Spur), containers carry an arena handle and alias shared heap
/// storage.
#[derive(Debug, Clone, Copy)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(Spur),
    Keyword(Spur),
    Str(Spur),
    /// Quoted-syntax marker carrying raw source text.
    Syntax(Spur),
    Seq(SeqRef),
    Map(MapRef),
    /// Index of a built-in routine in the host's primitive table.
    Primitive(u32),
    /// Index of a compiled closure in the host's closure table.
    Closure(u32),
    /// Raw host pointer, opaque to the collector.
    Foreign(usize),
    Ext(ExtRef),
}

impl Value {
    pub fn symbol(text: &str) -> Value {
        Value::Symbol(intern(text))
    }

    pub fn keyword(text: &str) -> Value {
        Value::Keyword(intern(text))
    }

    pub fn string(text: &str) -> Value {
        Value::Str(intern(text))
    }

    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Containers alias heap storage; everything else is self-contained.
    pub fn is_container(self) -> bool {
        matches!(self, Value::Seq(_) | Value::Map(_) | Value::Ext(_))
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Str(_) => "string",
            Value::Syntax(_) => "syntax",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Primitive(_) => "primitive",
            Value::Closure(_) => "closure",
            Value::Foreign(_) => "foreign",
            Value::Ext(_) => "extension",
        }
    }

    /// Rank used to order values of different variants in [`Value::total_cmp`].
    fn rank(self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Symbol(_) => 4,
            Value::Keyword(_) => 5,
            Value::Str(_) => 6,
            Value::Syntax(_) => 7,
            Value::Seq(_) => 8,
            Value::Map(_) => 9,
            Value::Primitive(_) => 10,
            Value::Closure(_) => 11,
            Value::Foreign(_) => 12,
            Value::Ext(_) => 13,
        }
    }

    /// Total order over all values: scalars by content (text variants by
    /// resolved string), containers by handle, distinct variants by rank.
    /// Backs printer key sorting and sequence sorting.
    pub fn total_cmp(self, other: Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(&b),
            (Value::Int(a), Value::Int(b)) => a.cmp(&b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(&b),
            (Value::Symbol(a), Value::Symbol(b))
            | (Value::Keyword(a), Value::Keyword(b))
            | (Value::Str(a), Value::Str(b))
            | (Value::Syntax(a), Value::Syntax(b)) => compare_spurs(a, b),
            (Value::Seq(a), Value::Seq(b)) => a.cmp(&b),
            (Value::Map(a), Value::Map(b)) => a.cmp(&b),
            (Value::Ext(a), Value::Ext(b)) => a.cmp(&b),
            (Value::Primitive(a), Value::Primitive(b)) => a.cmp(&b),
            (Value::Closure(a), Value::Closure(b)) => a.cmp(&b),
            (Value::Foreign(a), Value::Foreign(b)) => a.cmp(&b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Shallow equality: content for scalars (floats compare by bit pattern so
/// table lookups are stable), identity for containers. Deep container
/// comparison lives on the heap.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Syntax(a), Value::Syntax(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a == b,
            (Value::Foreign(a), Value::Foreign(b)) => a == b,
            (Value::Ext(a), Value::Ext(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match *self {
            Value::Nil => {}
            Value::Bool(b) => state.write_u8(b as u8),
            Value::Int(n) => state.write_i64(n),
            Value::Float(f) => state.write_u64(f.to_bits()),
            Value::Symbol(s) | Value::Keyword(s) | Value::Str(s) | Value::Syntax(s) => {
                s.hash(state)
            }
            Value::Seq(r) => state.write_u32(r.0),
            Value::Map(r) => state.write_u32(r.0),
            Value::Ext(r) => state.write_u32(r.0),
            Value::Primitive(i) | Value::Closure(i) => state.write_u32(i),
            Value::Foreign(p) => state.write_usize(p),
        }
    }
}

/// Hash consistent with shallow equality, used by the mapping store.
pub fn hash_value(value: Value) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Render a float with 15 significant digits (printf `%.15g` semantics),
/// then ensure the text re-reads as a float: fractionless output gets a
/// trailing `.0`.
pub fn fmt_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    // Decimal exponent of the leading digit, read off Rust's scientific
    // rendering rather than computed with log10 (exact at the boundaries).
    let sci = format!("{value:e}");
    let exp: i32 = sci
        .split('e')
        .nth(1)
        .and_then(|e| e.parse().ok())
        .unwrap_or(0);

    let mut out = if exp < -4 || exp >= 15 {
        let s = format!("{value:.14e}");
        match s.split_once('e') {
            Some((mantissa, exponent)) => {
                let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
                format!("{mantissa}e{exponent}")
            }
            None => s,
        }
    } else {
        let prec = (14 - exp) as usize;
        let s = format!("{value:.prec$}");
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    };
    if !out.contains('.') && !out.contains('e') {
        out.push_str(".0");
    }
    out
}
