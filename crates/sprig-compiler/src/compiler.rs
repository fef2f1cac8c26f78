//! Single-pass form-to-instruction emitter.
//!
//! Branch offsets are computed by building each sub-block into its own
//! vector, measuring it, then splicing — there is no fixup pass. Problems
//! found during emission (unresolved names, bad arity, malformed bindings)
//! become [`Diagnostic`]s and emission continues with a degraded stream;
//! callers must check [`Compiler::diagnostics`] before running the output.

use std::fmt;

use sprig_core::resolve;

use crate::env::{Env, SlotKind};
use crate::form::{Form, FormKind};
use crate::opcodes::Instr;

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.message)
    }
}

/// n-ary operators: instruction plus the identity operand injected for
/// unary calls (`(- x)` is `(- 0 x)`). Comparisons have no identity and
/// require two operands.
fn operator(name: &str) -> Option<(Instr, Option<i64>)> {
    Some(match name {
        "+" => (Instr::Add, Some(0)),
        "-" => (Instr::Sub, Some(0)),
        "*" => (Instr::Mul, Some(1)),
        "/" => (Instr::Div, Some(1)),
        ">" => (Instr::Gt, None),
        ">=" => (Instr::Ge, None),
        "<" => (Instr::Lt, None),
        "<=" => (Instr::Le, None),
        "==" => (Instr::Eq, None),
        "i+" => (Instr::AddI, Some(0)),
        "i-" => (Instr::SubI, Some(0)),
        "i*" => (Instr::MulI, Some(1)),
        "i/" => (Instr::DivI, Some(1)),
        "i>" => (Instr::GtI, None),
        "i>=" => (Instr::GeI, None),
        "i<" => (Instr::LtI, None),
        "i<=" => (Instr::LeI, None),
        "i==" => (Instr::EqI, None),
        _ => return None,
    })
}

#[derive(Debug, Default)]
pub struct Compiler {
    env: Env,
    diagnostics: Vec<Diagnostic>,
    trace: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            env: Env::new(),
            diagnostics: Vec::new(),
            trace: false,
        }
    }

    /// Emit a `TRC` line marker ahead of every top-level form.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Register a built-in in the root frame; returns its `PUSH_PRIM` index.
    pub fn define_primitive(&mut self, name: &str) -> u32 {
        self.env.define_primitive(sprig_core::intern(name))
    }

    /// Register a root-frame variable, readable and assignable through the
    /// frame chain at maximal depth; returns its slot.
    pub fn define_global(&mut self, name: &str) -> usize {
        self.env.define_root_var(sprig_core::intern(name))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Compile one form to an instruction block leaving exactly one value
    /// on the stack.
    pub fn emit(&mut self, form: &Form) -> Vec<Instr> {
        let mut out = Vec::new();
        if self.trace && form.line > 0 {
            out.push(Instr::Trc(form.line));
        }
        self.form(form, &mut out);
        out
    }

    /// Compile a whole program: top-level forms in order, each statement's
    /// value discarded before the next, the last one left on the stack.
    pub fn emit_program(&mut self, forms: &[Form]) -> Vec<Instr> {
        if forms.is_empty() {
            return vec![Instr::PushNil];
        }
        let mut out = Vec::new();
        for (i, form) in forms.iter().enumerate() {
            if i > 0 {
                out.push(Instr::Pop(1));
            }
            if self.trace && form.line > 0 {
                out.push(Instr::Trc(form.line));
            }
            self.form(form, &mut out);
        }
        out
    }

    fn diag(&mut self, at: &Form, message: impl Into<String>) {
        let message = message.into();
        let file = resolve(at.file);
        log::warn!("{file}:{}: {message}", at.line);
        self.diagnostics.push(Diagnostic {
            message,
            file,
            line: at.line,
        });
    }

    /// Compile into a fresh block (for offset measurement).
    fn sub(&mut self, form: &Form) -> Vec<Instr> {
        let mut block = Vec::new();
        self.form(form, &mut block);
        block
    }

    /// Expression sequence: each value but the last is popped. An empty
    /// body still produces a value.
    fn body_block(&mut self, exprs: &[Form]) -> Vec<Instr> {
        let mut block = Vec::new();
        if exprs.is_empty() {
            block.push(Instr::PushNil);
            return block;
        }
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                block.push(Instr::Pop(1));
            }
            self.form(expr, &mut block);
        }
        block
    }

    fn form(&mut self, form: &Form, out: &mut Vec<Instr>) {
        match &form.kind {
            FormKind::Int(n) => out.push(Instr::PushI(*n)),
            FormKind::Float(x) => out.push(Instr::PushD(*x)),
            FormKind::Keyword(s) => out.push(Instr::PushSym(*s)),
            FormKind::Sym(s) => self.symbol(form, *s, out),
            FormKind::List(items) => self.list(form, items, out),
        }
    }

    /// Bare (non-head) symbol: literal names and operator names become a
    /// fixed instruction, everything else resolves through the scope chain
    /// down to the root frame.
    fn symbol(&mut self, form: &Form, s: lasso::Spur, out: &mut Vec<Instr>) {
        let name = resolve(s);
        match name.as_str() {
            // The instruction set has no boolean push; false shares the nil
            // encoding, which branches identically under BR_NIF.
            "nil" | "false" => {
                out.push(Instr::PushNil);
                return;
            }
            "true" => {
                out.push(Instr::PushI(1));
                return;
            }
            _ => {}
        }
        if let Some((instr, _)) = operator(&name) {
            out.push(instr);
            return;
        }
        match self.env.resolve(s) {
            Some(r) if r.kind == SlotKind::Primitive => out.push(Instr::PushPrim(r.slot as u32)),
            Some(r) => out.push(Instr::GetEnv(r.depth, r.slot)),
            None => {
                self.diag(form, format!("unresolved identifier '{name}'"));
                out.push(Instr::PushNil);
            }
        }
    }

    fn list(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        if items.is_empty() {
            self.diag(form, "empty form");
            out.push(Instr::PushNil);
            return;
        }
        let head = items[0].as_sym().map(resolve);
        match head.as_deref() {
            Some("if") => self.emit_if(form, items, out),
            Some("when") => self.emit_conditional_body(form, items, out, false),
            Some("unless") => self.emit_conditional_body(form, items, out, true),
            Some("while") => self.emit_while(form, items, out),
            Some("let") => self.emit_let(form, items, out),
            Some("set!") => self.emit_set(form, items, out),
            Some(".") => self.emit_access(form, items, out, true),
            Some("$") => self.emit_access(form, items, out, false),
            Some("car") => self.emit_deref(form, items, out, Instr::GetRef),
            Some("cdr") => self.emit_deref(form, items, out, Instr::Tail(1)),
            Some("tail") => self.emit_tail(form, items, out),
            Some("list") => self.emit_list(items, out),
            Some("dbg-dump-stack") => out.push(Instr::DbgDumpStack),
            Some(op) if operator(op).is_some() => self.emit_arith(form, items, out, op),
            _ => self.emit_call(items, out),
        }
    }

    /// Left fold: `(+ a b c)` is `((a + b) + c)`; a unary call injects the
    /// operator's identity as the left operand.
    fn emit_arith(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>, op: &str) {
        let (instr, identity) = match operator(op) {
            Some(entry) => entry,
            None => return,
        };
        let args = &items[1..];
        match (args.len(), identity) {
            (0, Some(id)) => out.push(Instr::PushI(id)),
            (0, None) | (1, None) => {
                self.diag(form, format!("'{op}' needs at least two operands"));
                out.push(Instr::PushNil);
            }
            (1, Some(id)) => {
                out.push(Instr::PushI(id));
                self.form(&args[0], out);
                out.push(instr);
            }
            _ => {
                self.form(&args[0], out);
                for arg in &args[1..] {
                    self.form(arg, out);
                    out.push(instr);
                }
            }
        }
    }

    fn emit_if(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        if items.len() != 3 && items.len() != 4 {
            self.diag(form, "'if' takes a test, a consequent and an optional alternative");
            out.push(Instr::PushNil);
            return;
        }
        let test = self.sub(&items[1]);
        let then = self.sub(&items[2]);
        out.extend(test);
        out.push(Instr::BrNif(then.len() as i32 + 1));
        out.extend(then);
        if items.len() == 4 {
            let alt = self.sub(&items[3]);
            out.push(Instr::Br(alt.len() as i32));
            out.extend(alt);
        } else {
            out.push(Instr::Br(1));
            out.push(Instr::PushNil);
        }
    }

    /// `when` / `unless`: multi-expression body, nil when the guard does
    /// not take the body.
    fn emit_conditional_body(
        &mut self,
        form: &Form,
        items: &[Form],
        out: &mut Vec<Instr>,
        inverted: bool,
    ) {
        if items.len() < 2 {
            self.diag(form, "missing test expression");
            out.push(Instr::PushNil);
            return;
        }
        let test = self.sub(&items[1]);
        let body = self.body_block(&items[2..]);
        out.extend(test);
        let skip = body.len() as i32 + 1;
        out.push(if inverted {
            Instr::BrIf(skip)
        } else {
            Instr::BrNif(skip)
        });
        out.extend(body);
        out.push(Instr::Br(1));
        out.push(Instr::PushNil);
    }

    /// The test block is emitted twice: once guarding entry, once at the
    /// loop tail feeding the back-branch. A nil seed gives the loop a value
    /// before the first iteration; each iteration discards the previous
    /// one's value.
    fn emit_while(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        if items.len() < 2 {
            self.diag(form, "'while' needs a test expression");
            out.push(Instr::PushNil);
            return;
        }
        let test = self.sub(&items[1]);
        let mut body = vec![Instr::Pop(1)];
        body.extend(self.body_block(&items[2..]));
        let around = body.len() as i32 + test.len() as i32 + 1;
        out.push(Instr::PushNil);
        out.extend(test.iter().copied());
        out.push(Instr::BrNif(around));
        out.extend(body);
        out.extend(test.iter().copied());
        out.push(Instr::BrIf(-around));
    }

    fn emit_let(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        let bindings = match items.get(1).map(|b| &b.kind) {
            Some(FormKind::List(bindings)) => bindings.clone(),
            _ => {
                self.diag(form, "'let' needs a binding list");
                out.push(Instr::PushNil);
                return;
            }
        };
        self.env.push_scope();
        out.push(Instr::PushEnv(bindings.len()));
        for binding in &bindings {
            let pair = match &binding.kind {
                FormKind::List(pair) if pair.len() == 2 => pair,
                _ => {
                    self.diag(binding, "malformed binding, expected (name value)");
                    continue;
                }
            };
            match pair[0].as_sym() {
                Some(name) => {
                    let slot = self.env.define(name);
                    self.form(&pair[1], out);
                    out.push(Instr::SetEnv(0, slot));
                }
                None => self.diag(&pair[0], "binding target must be a symbol"),
            }
        }
        let body = self.body_block(&items[2..]);
        out.extend(body);
        out.push(Instr::PopEnv);
        self.env.pop_scope();
    }

    /// Assignment produces nil. Resolution falls through to the root frame;
    /// only primitive slots are not assignable.
    fn emit_set(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        if items.len() != 3 {
            self.diag(form, "'set!' takes a name and a value");
            out.push(Instr::PushNil);
            return;
        }
        let name = match items[1].as_sym() {
            Some(name) => name,
            None => {
                self.diag(&items[1], "'set!' target must be a symbol");
                out.push(Instr::PushNil);
                return;
            }
        };
        match self.env.resolve(name) {
            Some(r) if r.kind == SlotKind::Var => {
                self.form(&items[2], out);
                out.push(Instr::SetEnv(r.depth, r.slot));
                out.push(Instr::PushNil);
            }
            Some(_) => {
                self.diag(form, format!("cannot assign to primitive '{}'", resolve(name)));
                out.push(Instr::PushNil);
            }
            None => {
                self.diag(form, format!("unresolved identifier '{}'", resolve(name)));
                out.push(Instr::PushNil);
            }
        }
    }

    /// `.` (call-like) and `$` (get-like): extra operands in reverse, then
    /// the field, then the object; the operand count excludes the object.
    fn emit_access(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>, call: bool) {
        if items.len() < 3 {
            self.diag(form, "field access needs an object and a field");
            out.push(Instr::PushNil);
            return;
        }
        let field = match &items[2].kind {
            FormKind::Sym(s) | FormKind::Keyword(s) => Instr::PushSym(*s),
            FormKind::Int(n) => Instr::PushI(*n),
            _ => {
                self.diag(&items[2], "field must be a symbol, keyword or integer");
                out.push(Instr::PushNil);
                return;
            }
        };
        for extra in items[3..].iter().rev() {
            self.form(extra, out);
        }
        out.push(field);
        self.form(&items[1], out);
        let count = items.len() - 2;
        out.push(if call {
            Instr::Call(count)
        } else {
            Instr::Get(count)
        });
    }

    fn emit_deref(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>, op: Instr) {
        if items.len() != 2 {
            self.diag(form, "expected exactly one operand");
            out.push(Instr::PushNil);
            return;
        }
        self.form(&items[1], out);
        out.push(op);
    }

    /// `(tail x)` steps once, `(tail x n)` by a computed count.
    fn emit_tail(&mut self, form: &Form, items: &[Form], out: &mut Vec<Instr>) {
        match items.len() {
            2 => {
                self.form(&items[1], out);
                out.push(Instr::Tail(1));
            }
            3 => {
                self.form(&items[2], out);
                self.form(&items[1], out);
                out.push(Instr::Tail(2));
            }
            _ => {
                self.diag(form, "'tail' takes one or two operands");
                out.push(Instr::PushNil);
            }
        }
    }

    /// An empty literal still pushes one nil placeholder.
    fn emit_list(&mut self, items: &[Form], out: &mut Vec<Instr>) {
        if items.len() == 1 {
            out.push(Instr::PushNil);
            out.push(Instr::PushList(1));
            return;
        }
        for item in &items[1..] {
            self.form(item, out);
        }
        out.push(Instr::PushList(items.len() - 1));
    }

    /// Generic call: every child (callee included) in reverse, so the
    /// callee ends up on top, then `CALL` with the argument count.
    fn emit_call(&mut self, items: &[Form], out: &mut Vec<Instr>) {
        for child in items.iter().rev() {
            self.form(child, out);
        }
        out.push(Instr::Call(items.len() - 1));
    }
}
