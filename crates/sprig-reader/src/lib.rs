pub mod builder;
pub mod lexer;
pub mod reader;

pub use builder::{Builder, TreeBuilder};
pub use lexer::{tokenize, SpannedToken, Token, TokenStream};
pub use reader::{parse, read};
