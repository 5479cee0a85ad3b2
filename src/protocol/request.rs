//! Request definitions

use crate::error::{FlatError, Result};

/// One parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name as sent (case preserved)
    pub name: String,

    /// Arguments after the name, as raw bytes
    pub args: Vec<Vec<u8>>,
}

impl Request {
    pub fn new(name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Split a raw argument vector into name and arguments
    pub fn from_parts(mut parts: Vec<Vec<u8>>) -> Result<Self> {
        if parts.is_empty() {
            return Err(FlatError::Protocol("empty command".to_string()));
        }
        let args = parts.split_off(1);
        let name = String::from_utf8_lossy(&parts[0]).into_owned();
        Ok(Self { name, args })
    }
}
