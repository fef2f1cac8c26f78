//! Tokenizer: one eager pass over the source text, producing a flat token
//! list consumed by position index (peek-one lookahead).

use std::fmt;

use sprig_core::{fmt_float, SprigError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Eof,
    /// One of `( ) [ ] { }` or the quote mark `'`.
    Delim(char),
    Sym(String),
    Keyword(String),
    Str(String),
    Int(i64),
    Float(f64),
    /// Numeric-looking text that parses as neither int nor float. Surfaces
    /// as a parse error, not a lex abort, so the rest of the input still
    /// tokenizes.
    BadNumber(String),
    /// `#N=` — bind the next datum to label N.
    LabelDef(u32),
    /// `#N#` — reference to a previously bound label.
    LabelRef(u32),
    /// `#;` — the next datum is parsed but discarded.
    DatumComment,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Delim(c) => write!(f, "{c}"),
            Token::Sym(s) => write!(f, "{s}"),
            Token::Keyword(s) => write!(f, "{s}:"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Int(n) => write!(f, "{n}"),
            Token::Float(x) => write!(f, "{}", fmt_float(*x)),
            Token::BadNumber(s) => write!(f, "{s}"),
            Token::LabelDef(n) => write!(f, "#{n}="),
            Token::LabelRef(n) => write!(f, "#{n}#"),
            Token::DatumComment => write!(f, "#;"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
}

/// All tokens of one input, ending with an explicit `Eof` token.
#[derive(Debug, Clone)]
pub struct TokenStream {
    pub name: String,
    pub tokens: Vec<SpannedToken>,
}

pub fn tokenize(name: &str, text: &str) -> Result<TokenStream, SprigError> {
    let mut lexer = Lexer {
        name,
        chars: text.chars().collect(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(TokenStream {
        name: name.to_string(),
        tokens: lexer.tokens,
    })
}

struct Lexer<'a> {
    name: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    tokens: Vec<SpannedToken>,
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '\'')
}

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || c == ',' || c == ';' || c == '"' || is_delimiter(c)
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, token: Token, line: u32) {
        self.tokens.push(SpannedToken { token, line });
    }

    fn err(&self, message: impl Into<String>, line: u32) -> SprigError {
        SprigError::lex(message, self.name, line)
    }

    fn run(&mut self) -> Result<(), SprigError> {
        while let Some(c) = self.peek() {
            let line = self.line;
            match c {
                _ if c.is_whitespace() || c == ',' => {
                    self.bump();
                }
                ';' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '(' | ')' | '[' | ']' | '{' | '}' | '\'' => {
                    self.bump();
                    self.push(Token::Delim(c), line);
                }
                '"' => self.string()?,
                '#' => self.dispatch()?,
                _ => self.word(),
            }
        }
        let line = self.line;
        self.push(Token::Eof, line);
        Ok(())
    }

    /// Everything after `#`: block comments, datum comments, datum labels
    /// and raw strings.
    fn dispatch(&mut self) -> Result<(), SprigError> {
        let line = self.line;
        self.bump(); // '#'
        match self.peek() {
            Some('|') => {
                self.bump();
                self.block_comment(line)
            }
            Some(';') => {
                self.bump();
                self.push(Token::DatumComment, line);
                Ok(())
            }
            Some('q') if self.peek_at(1) == Some('\'') => {
                self.bump();
                self.bump();
                self.raw_string(line)
            }
            Some(c) if c.is_ascii_digit() => self.datum_label(line),
            Some(c) => Err(self.err(format!("unknown dispatch character '#{c}'"), line)),
            None => Err(self.err("dangling '#' at end of input", line)),
        }
    }

    fn block_comment(&mut self, line: u32) -> Result<(), SprigError> {
        let mut depth = 1u32;
        while depth > 0 {
            match self.bump() {
                Some('#') if self.peek() == Some('|') => {
                    self.bump();
                    depth += 1;
                }
                Some('|') if self.peek() == Some('#') => {
                    self.bump();
                    depth -= 1;
                }
                Some(_) => {}
                None => return Err(self.err("unterminated block comment", line)),
            }
        }
        Ok(())
    }

    fn datum_label(&mut self, line: u32) -> Result<(), SprigError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.bump();
        }
        let id: u32 = digits
            .parse()
            .map_err(|_| self.err(format!("datum label #{digits} out of range"), line))?;
        match self.bump() {
            Some('=') => {
                self.push(Token::LabelDef(id), line);
                Ok(())
            }
            Some('#') => {
                self.push(Token::LabelRef(id), line);
                Ok(())
            }
            _ => Err(self.err(format!("malformed datum label #{digits}"), line)),
        }
    }

    fn string(&mut self) -> Result<(), SprigError> {
        let line = self.line;
        self.bump(); // '"'
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => {
                    if self.continuation() {
                        continue;
                    }
                    match self.bump() {
                        Some('t') => body.push('\t'),
                        Some('n') => body.push('\n'),
                        Some('a') => body.push('\x07'),
                        Some('b') => body.push('\x08'),
                        Some('v') => body.push('\x0b'),
                        Some('f') => body.push('\x0c'),
                        Some('r') => body.push('\r'),
                        Some('\\') => body.push('\\'),
                        Some('"') => body.push('"'),
                        Some('x') | Some('u') => body.push(self.hex_escape(line)?),
                        Some(c) => {
                            return Err(self.err(format!("unknown string escape '\\{c}'"), line))
                        }
                        None => return Err(self.err("unterminated string", line)),
                    }
                }
                Some(c) => body.push(c),
                None => return Err(self.err("unterminated string", line)),
            }
        }
        self.push(Token::Str(body), line);
        Ok(())
    }

    /// Backslash + intraline whitespace + LF elides the line break (and the
    /// next line's leading indentation). The backslash is already consumed.
    fn continuation(&mut self) -> bool {
        let mut ahead = 0;
        while matches!(self.peek_at(ahead), Some(' ') | Some('\t')) {
            ahead += 1;
        }
        if self.peek_at(ahead) != Some('\n') {
            return false;
        }
        for _ in 0..=ahead {
            self.bump();
        }
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        true
    }

    /// `\xH...;` / `\uH...;` — hex digits up to the closing semicolon.
    fn hex_escape(&mut self, line: u32) -> Result<char, SprigError> {
        let mut digits = String::new();
        loop {
            match self.bump() {
                Some(';') => break,
                Some(c) if c.is_ascii_hexdigit() => digits.push(c),
                _ => return Err(self.err("malformed hex escape in string", line)),
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.err(format!("hex escape \\x{digits}; is not a character"), line))
    }

    /// Raw string `#q'...'`: only `\'` and `\\` are escapes; every other
    /// backslash is literal.
    fn raw_string(&mut self, line: u32) -> Result<(), SprigError> {
        let mut body = String::new();
        loop {
            match self.bump() {
                Some('\'') => break,
                Some('\\') => match self.bump() {
                    Some('\'') => body.push('\''),
                    Some('\\') => body.push('\\'),
                    Some(c) => {
                        body.push('\\');
                        body.push(c);
                    }
                    None => return Err(self.err("unterminated raw string", line)),
                },
                Some(c) => body.push(c),
                None => return Err(self.err("unterminated raw string", line)),
            }
        }
        self.push(Token::Str(body), line);
        Ok(())
    }

    fn word(&mut self) {
        let line = self.line;
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_word_break(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        // Infix arrows split a word into separate tokens: `a->b` reads the
        // same as `a -> b`.
        if word.contains("->") && word != "->" {
            let pieces: Vec<&str> = word.split("->").collect();
            for (i, piece) in pieces.iter().enumerate() {
                if i > 0 {
                    self.push(Token::Sym("->".to_string()), line);
                }
                if !piece.is_empty() {
                    let token = classify_word(piece);
                    self.push(token, line);
                }
            }
        } else {
            let token = classify_word(&word);
            self.push(token, line);
        }
    }
}

fn looks_numeric(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+') | Some('-') | Some('.') => {
            matches!(chars.next(), Some(c) if c.is_ascii_digit() || c == '.')
                && word.chars().any(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Classify one word: keyword (either colon position), number, or symbol.
fn classify_word(word: &str) -> Token {
    if word.len() > 1 {
        if let Some(rest) = word.strip_prefix(':') {
            return Token::Keyword(rest.to_string());
        }
        if let Some(rest) = word.strip_suffix(':') {
            return Token::Keyword(rest.to_string());
        }
    }
    if looks_numeric(word) {
        if let Ok(n) = word.parse::<i64>() {
            return Token::Int(n);
        }
        if let Ok(x) = word.parse::<f64>() {
            return Token::Float(x);
        }
        return Token::BadNumber(word.to_string());
    }
    Token::Sym(word.to_string())
}
