//! Recursive-descent parser over the token list, driving a [`Builder`].

use sprig_core::{Heap, SprigError, Value};

use crate::builder::{Builder, TreeBuilder};
use crate::lexer::{tokenize, SpannedToken, Token, TokenStream};

/// Read every top-level datum of `text` into one result sequence.
///
/// All-or-nothing: the first lexical or syntax error aborts the whole read
/// and nothing is returned. The result sequence is not rooted; callers that
/// keep it across a collection must root it themselves.
pub fn read(heap: &mut Heap, name: &str, text: &str) -> Result<Value, SprigError> {
    let stream = tokenize(name, text)?;
    let mut builder = TreeBuilder::new(heap);
    let outcome = Parser::new(&stream, &mut builder).run();
    match outcome {
        Ok(()) => builder.finish(),
        Err(err) => {
            builder.error(&err);
            builder.abort();
            Err(err)
        }
    }
}

/// Parse an already-tokenized stream into an arbitrary builder.
pub fn parse<B: Builder>(stream: &TokenStream, builder: &mut B) -> Result<(), SprigError> {
    Parser::new(stream, builder).run()
}

struct Parser<'a, B: Builder> {
    name: &'a str,
    tokens: &'a [SpannedToken],
    pos: usize,
    /// Non-zero while inside a datum comment: the cursor advances but the
    /// builder hears nothing.
    muted: u32,
    builder: &'a mut B,
}

impl<'a, B: Builder> Parser<'a, B> {
    fn new(stream: &'a TokenStream, builder: &'a mut B) -> Self {
        Parser {
            name: &stream.name,
            tokens: &stream.tokens,
            pos: 0,
            muted: 0,
            builder,
        }
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> SpannedToken {
        let spanned = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or(SpannedToken {
                token: Token::Eof,
                line: 0,
            });
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        spanned
    }

    fn live(&self) -> bool {
        self.muted == 0
    }

    fn syntax_error(&self, message: impl Into<String>, at: &SpannedToken) -> SprigError {
        SprigError::read(message, self.name, at.line, &at.token)
    }

    fn run(&mut self) -> Result<(), SprigError> {
        while !matches!(self.peek(), Token::Eof) {
            self.datum()?;
        }
        Ok(())
    }

    /// Parse until exactly one datum has been produced (datum comments in
    /// between consume their operand silently).
    fn one(&mut self) -> Result<(), SprigError> {
        while !self.datum()? {}
        Ok(())
    }

    /// Parse one syntactic datum. Returns false when the consumed tokens
    /// produced nothing (a datum comment and its operand).
    fn datum(&mut self) -> Result<bool, SprigError> {
        let spanned = self.advance();
        match spanned.token {
            Token::DatumComment => {
                self.muted += 1;
                let skipped = self.one();
                self.muted -= 1;
                skipped?;
                Ok(false)
            }
            Token::LabelDef(label) => {
                if self.live() {
                    self.builder.label_def(label)?;
                }
                // The label binds to the next datum.
                self.one()?;
                Ok(true)
            }
            Token::LabelRef(label) => {
                if self.live() && !self.builder.label_ref(label)? {
                    return Err(
                        self.syntax_error(format!("reference to undefined label #{label}#"), &spanned)
                    );
                }
                Ok(true)
            }
            Token::Delim(open @ ('(' | '[')) => {
                if self.live() {
                    self.builder.start_list()?;
                    self.builder.set_debug_info(self.name, spanned.line)?;
                    if open == '[' {
                        // Implicitly quoted sequence.
                        self.builder.atom_sym("list")?;
                    }
                }
                let close = if open == '(' { ')' } else { ']' };
                loop {
                    match self.peek() {
                        Token::Eof => {
                            return Err(self.syntax_error(
                                format!("unterminated '{open}'"),
                                &spanned,
                            ))
                        }
                        Token::Delim(c) if *c == close => {
                            self.advance();
                            break;
                        }
                        Token::Delim(c @ (')' | ']' | '}')) => {
                            let c = *c;
                            let bad = self.advance();
                            return Err(self.syntax_error(
                                format!("mismatched '{c}' inside '{open}'"),
                                &bad,
                            ));
                        }
                        _ => {
                            self.datum()?;
                        }
                    }
                }
                if self.live() {
                    self.builder.end_list()?;
                }
                Ok(true)
            }
            Token::Delim('{') => {
                if self.live() {
                    self.builder.start_map()?;
                    self.builder.set_debug_info(self.name, spanned.line)?;
                }
                loop {
                    match self.peek() {
                        Token::Eof => {
                            return Err(self.syntax_error("unterminated '{'", &spanned))
                        }
                        Token::Delim('}') => {
                            self.advance();
                            break;
                        }
                        Token::Delim(c @ (')' | ']')) => {
                            let c = *c;
                            let bad = self.advance();
                            return Err(
                                self.syntax_error(format!("mismatched '{c}' inside '{{'"), &bad)
                            );
                        }
                        Token::DatumComment => {
                            // Discards its operand; not a pair member.
                            self.datum()?;
                        }
                        _ => {
                            if self.live() {
                                self.builder.start_pair()?;
                            }
                            self.one()?;
                            if self.live() {
                                self.builder.end_key()?;
                            }
                            if matches!(self.peek(), Token::Delim('}') | Token::Eof) {
                                let at = self.advance();
                                return Err(self.syntax_error(
                                    "mapping entry is missing a value",
                                    &at,
                                ));
                            }
                            self.one()?;
                            if self.live() {
                                self.builder.end_pair()?;
                            }
                        }
                    }
                }
                if self.live() {
                    self.builder.end_map()?;
                }
                Ok(true)
            }
            Token::Delim('\'') => {
                if self.live() {
                    self.builder.start_list()?;
                    self.builder.set_debug_info(self.name, spanned.line)?;
                    self.builder.atom_sym("quote")?;
                }
                if matches!(self.peek(), Token::Eof) {
                    return Err(self.syntax_error("quote at end of input", &spanned));
                }
                self.one()?;
                if self.live() {
                    self.builder.end_list()?;
                }
                Ok(true)
            }
            Token::Delim(c) => {
                Err(self.syntax_error(format!("unexpected closing '{c}'"), &spanned))
            }
            Token::Sym(ref s) => {
                if self.live() {
                    match s.as_str() {
                        "nil" => self.builder.atom_nil()?,
                        "true" => self.builder.atom_bool(true)?,
                        "false" => self.builder.atom_bool(false)?,
                        _ => self.builder.atom_sym(s)?,
                    }
                }
                Ok(true)
            }
            Token::Keyword(ref s) => {
                if self.live() {
                    self.builder.atom_keyword(s)?;
                }
                Ok(true)
            }
            Token::Str(ref s) => {
                if self.live() {
                    self.builder.atom_str(s)?;
                }
                Ok(true)
            }
            Token::Int(n) => {
                if self.live() {
                    self.builder.atom_int(n)?;
                }
                Ok(true)
            }
            Token::Float(x) => {
                if self.live() {
                    self.builder.atom_float(x)?;
                }
                Ok(true)
            }
            Token::BadNumber(ref s) => {
                Err(self.syntax_error(format!("malformed number '{s}'"), &spanned))
            }
            Token::Eof => Err(self.syntax_error("unexpected end of input", &spanned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_one(heap: &mut Heap, text: &str) -> Value {
        let top = read(heap, "test", text).unwrap();
        assert_eq!(heap.seq_len(top), 1, "expected one datum from {text:?}");
        heap.seq_get(top, 0).unwrap()
    }

    #[test]
    fn atoms() {
        let mut heap = Heap::new();
        let top = read(&mut heap, "test", "1 2.5 \"s\" sym :kw nil true false").unwrap();
        assert_eq!(heap.seq_len(top), 8);
        assert_eq!(heap.seq_get(top, 0), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(top, 1), Some(Value::Float(2.5)));
        assert_eq!(heap.seq_get(top, 2), Some(Value::string("s")));
        assert_eq!(heap.seq_get(top, 3), Some(Value::symbol("sym")));
        assert_eq!(heap.seq_get(top, 4), Some(Value::keyword("kw")));
        assert_eq!(heap.seq_get(top, 5), Some(Value::Nil));
        assert_eq!(heap.seq_get(top, 6), Some(Value::Bool(true)));
        assert_eq!(heap.seq_get(top, 7), Some(Value::Bool(false)));
    }

    #[test]
    fn nested_lists() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "(a (b c) d)");
        assert_eq!(heap.seq_len(v), 3);
        let inner = heap.seq_get(v, 1).unwrap();
        assert_eq!(heap.seq_len(inner), 2);
        assert_eq!(heap.seq_get(inner, 0), Some(Value::symbol("b")));
    }

    #[test]
    fn bracket_injects_list_symbol() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "[1 2]");
        assert_eq!(heap.seq_len(v), 3);
        assert_eq!(heap.seq_get(v, 0), Some(Value::symbol("list")));
        assert_eq!(heap.seq_get(v, 1), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(v, 2), Some(Value::Int(2)));
    }

    #[test]
    fn quote_wraps_datum() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "'x");
        assert_eq!(heap.seq_len(v), 2);
        assert_eq!(heap.seq_get(v, 0), Some(Value::symbol("quote")));
        assert_eq!(heap.seq_get(v, 1), Some(Value::symbol("x")));
    }

    #[test]
    fn maps_parse_pairs() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "{a 1 b 2}");
        assert_eq!(heap.map_len(v), 2);
        assert_eq!(heap.map_get(v, Value::symbol("a")), Some(Value::Int(1)));
        assert_eq!(heap.map_get(v, Value::symbol("b")), Some(Value::Int(2)));
    }

    #[test]
    fn odd_map_is_an_error() {
        let mut heap = Heap::new();
        assert!(read(&mut heap, "test", "{a 1 b}").is_err());
    }

    #[test]
    fn debug_info_is_stamped() {
        let mut heap = Heap::new();
        let top = read(&mut heap, "demo.sl", "\n\n(a)").unwrap();
        let v = heap.seq_get(top, 0).unwrap();
        assert_eq!(heap.meta(v, sprig_core::META_NAME), Value::string("demo.sl"));
        assert_eq!(heap.meta(v, sprig_core::META_LINE), Value::Int(3));
    }

    #[test]
    fn self_referential_label() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "#1=(1 #1#)");
        assert_eq!(heap.seq_len(v), 2);
        assert_eq!(heap.seq_get(v, 0), Some(Value::Int(1)));
        // Identity, not a copy.
        assert_eq!(heap.seq_get(v, 1), Some(v));
    }

    #[test]
    fn shared_label_across_siblings() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "(#1=(x) #1#)");
        let first = heap.seq_get(v, 0).unwrap();
        let second = heap.seq_get(v, 1).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn labelled_atom() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "(#1=7 #1#)");
        assert_eq!(heap.seq_get(v, 0), Some(Value::Int(7)));
        assert_eq!(heap.seq_get(v, 1), Some(Value::Int(7)));
    }

    #[test]
    fn undefined_label_aborts() {
        let mut heap = Heap::new();
        assert!(read(&mut heap, "test", "(#9#)").is_err());
    }

    #[test]
    fn datum_comment_discards() {
        let mut heap = Heap::new();
        let top = read(&mut heap, "test", "1 #;(2 3) 4").unwrap();
        assert_eq!(heap.seq_len(top), 2);
        assert_eq!(heap.seq_get(top, 0), Some(Value::Int(1)));
        assert_eq!(heap.seq_get(top, 1), Some(Value::Int(4)));
    }

    #[test]
    fn nested_datum_comments() {
        let mut heap = Heap::new();
        let top = read(&mut heap, "test", "#;#;1 2 3").unwrap();
        assert_eq!(heap.seq_len(top), 1);
        assert_eq!(heap.seq_get(top, 0), Some(Value::Int(3)));
    }

    #[test]
    fn datum_comment_inside_map() {
        let mut heap = Heap::new();
        let v = read_one(&mut heap, "{#;x a 1}");
        assert_eq!(heap.map_len(v), 1);
        assert_eq!(heap.map_get(v, Value::symbol("a")), Some(Value::Int(1)));
    }

    #[test]
    fn trailing_datum_comment_at_top_level() {
        let mut heap = Heap::new();
        let top = read(&mut heap, "test", "1 #;2").unwrap();
        assert_eq!(heap.seq_len(top), 1);
    }

    #[test]
    fn syntax_errors_abort_whole_read() {
        let mut heap = Heap::new();
        for bad in ["(a", "(]", ")", "{a 1", "'", "12.x3", "(ok) ("] {
            let before = heap.root_count();
            assert!(read(&mut heap, "test", bad).is_err(), "{bad:?}");
            assert_eq!(heap.root_count(), before, "roots leaked for {bad:?}");
        }
    }

    #[test]
    fn error_carries_position() {
        let mut heap = Heap::new();
        let err = read(&mut heap, "demo.sl", "(a\nb").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("demo.sl"), "{text}");
        assert!(text.contains("unterminated"), "{text}");
    }
}
