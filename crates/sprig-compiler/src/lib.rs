//! Form trees, lexical environments and the bytecode emitter.

pub mod compiler;
pub mod env;
pub mod form;
pub mod opcodes;

pub use compiler::{Compiler, Diagnostic};
pub use env::{Env, Resolved, SlotKind};
pub use form::{Form, FormKind};
pub use opcodes::{disassemble, Instr};
