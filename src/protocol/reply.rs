//! Reply definitions

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Simple(String),

    /// Binary-safe string
    Bulk(Vec<u8>),

    Integer(i64),

    /// Absent value (`$-1`)
    Null,

    /// Full error line without the leading `-`, e.g. `ERR unknown command`
    Error(String),

    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    /// Generic error reply, prefixed with `ERR`
    pub fn error(message: impl std::fmt::Display) -> Self {
        Reply::Error(format!("ERR {}", message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}
