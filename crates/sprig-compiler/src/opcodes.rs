//! Instruction vocabulary of the external stack-and-environment VM.
//!
//! `Display` produces the exact mnemonics consumers key on; branch operands
//! are instruction-count offsets relative to the *next* instruction, with
//! backward branches negative.

use std::fmt;

use lasso::Spur;
use sprig_core::{fmt_float, with_resolved};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    PushI(i64),
    PushD(f64),
    PushSym(Spur),
    PushNil,
    /// Pop n values, push a sequence of them.
    PushList(usize),
    /// Load slot s of the environment d frames out.
    GetEnv(usize, usize),
    /// Store the top of stack into slot s of the environment d frames out.
    SetEnv(usize, usize),
    /// Enter a fresh environment frame with n slots.
    PushEnv(usize),
    PopEnv,
    /// Discard n values.
    Pop(usize),
    /// Call with n pushed operands, callee on top.
    Call(usize),
    /// Dereference the sequence tail; n is the pushed operand count.
    Tail(usize),
    /// Field/index access with n pushed operands, object on top.
    Get(usize),
    /// Dereference the sequence head.
    GetRef,
    Br(i32),
    /// Branch when the popped value is truthy.
    BrIf(i32),
    /// Branch when the popped value is nil or false.
    BrNif(i32),
    /// Push root-environment primitive number i.
    PushPrim(u32),
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    AddI,
    SubI,
    MulI,
    DivI,
    GtI,
    GeI,
    LtI,
    LeI,
    EqI,
    Nop,
    /// Source-line marker for tracing.
    Trc(u32),
    DbgDumpStack,
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instr::PushI(n) => write!(f, "PUSH_I {n}"),
            Instr::PushD(x) => write!(f, "PUSH_D {}", fmt_float(x)),
            Instr::PushSym(s) => with_resolved(s, |text| write!(f, "PUSH_SYM {text}")),
            Instr::PushNil => write!(f, "PUSH_NIL"),
            Instr::PushList(n) => write!(f, "PUSH_LIST {n}"),
            Instr::GetEnv(d, s) => write!(f, "GET_ENV {d} {s}"),
            Instr::SetEnv(d, s) => write!(f, "SET_ENV {d} {s}"),
            Instr::PushEnv(n) => write!(f, "PUSH_ENV {n}"),
            Instr::PopEnv => write!(f, "POP_ENV"),
            Instr::Pop(n) => write!(f, "POP {n}"),
            Instr::Call(n) => write!(f, "CALL {n}"),
            Instr::Tail(n) => write!(f, "TAIL {n}"),
            Instr::Get(n) => write!(f, "GET {n}"),
            Instr::GetRef => write!(f, "GET_REF"),
            Instr::Br(n) => write!(f, "BR {n}"),
            Instr::BrIf(n) => write!(f, "BR_IF {n}"),
            Instr::BrNif(n) => write!(f, "BR_NIF {n}"),
            Instr::PushPrim(i) => write!(f, "PUSH_PRIM {i}"),
            Instr::Add => write!(f, "ADD"),
            Instr::Sub => write!(f, "SUB"),
            Instr::Mul => write!(f, "MUL"),
            Instr::Div => write!(f, "DIV"),
            Instr::Gt => write!(f, "GT"),
            Instr::Ge => write!(f, "GE"),
            Instr::Lt => write!(f, "LT"),
            Instr::Le => write!(f, "LE"),
            Instr::Eq => write!(f, "EQ"),
            Instr::AddI => write!(f, "ADD_I"),
            Instr::SubI => write!(f, "SUB_I"),
            Instr::MulI => write!(f, "MUL_I"),
            Instr::DivI => write!(f, "DIV_I"),
            Instr::GtI => write!(f, "GT_I"),
            Instr::GeI => write!(f, "GE_I"),
            Instr::LtI => write!(f, "LT_I"),
            Instr::LeI => write!(f, "LE_I"),
            Instr::EqI => write!(f, "EQ_I"),
            Instr::Nop => write!(f, "NOP"),
            Instr::Trc(line) => write!(f, "TRC {line}"),
            Instr::DbgDumpStack => write!(f, "DBG_DUMP_STACK"),
        }
    }
}

/// Render a block one mnemonic per line, the form VM consumers ingest.
pub fn disassemble(block: &[Instr]) -> String {
    let mut out = String::new();
    for instr in block {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    out
}
