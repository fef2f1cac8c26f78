use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SprigError {
    #[error("Read error in {name}:{line}: {message} (near {token})")]
    Read {
        message: String,
        name: String,
        line: u32,
        token: String,
    },

    #[error("Lex error in {name}:{line}: {message}")]
    Lex {
        message: String,
        name: String,
        line: u32,
    },

    /// The mapping store ran off the end of its size ladder. Fatal: the
    /// operation that triggered the growth must not silently drop data.
    #[error("mapping store cannot grow past {capacity} buckets")]
    TableOverflow { capacity: usize },

    /// Builder events arrived out of order (e.g. `end_list` without a
    /// matching `start_list`). Indicates a broken parser/builder pairing.
    #[error("builder protocol violation: {0}")]
    Builder(String),

    #[error("cannot lower value to a compilable form: {0}")]
    BadForm(String),
}

impl SprigError {
    pub fn read(
        message: impl Into<String>,
        name: impl Into<String>,
        line: u32,
        token: impl fmt::Display,
    ) -> Self {
        SprigError::Read {
            message: message.into(),
            name: name.into(),
            line,
            token: token.to_string(),
        }
    }

    pub fn lex(message: impl Into<String>, name: impl Into<String>, line: u32) -> Self {
        SprigError::Lex {
            message: message.into(),
            name: name.into(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_display() {
        let e = SprigError::read("unexpected closing delimiter", "demo.sl", 3, ")");
        assert_eq!(
            e.to_string(),
            "Read error in demo.sl:3: unexpected closing delimiter (near ))"
        );
    }

    #[test]
    fn overflow_display() {
        let e = SprigError::TableOverflow { capacity: 2147483647 };
        assert!(e.to_string().contains("2147483647"));
    }
}
