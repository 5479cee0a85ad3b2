//! Command Dispatch Module
//!
//! Maps command names onto handlers that drive the [`Store`].
//!
//! ## Flow
//! ```text
//!   Request ──▶ CommandTable::dispatch
//!                 ├─ lookup (case-insensitive)   → "unknown command"
//!                 ├─ arity check                 → "wrong number of arguments"
//!                 └─ handler(&Context) ──▶ Store ──▶ Backend
//!                        │
//!                        └─ Result<Reply>, errors become `-ERR <message>`
//! ```
//!
//! Handlers validate and parse every argument before touching the store,
//! so a rejected command never mutates anything.

mod duration;
mod server;
mod strings;

use std::collections::HashMap;
use std::time::Duration;

pub use duration::parse_duration;

use crate::error::{FlatError, Result};
use crate::protocol::{Reply, Request};
use crate::store::Store;

/// Namespace prepended to every user key
pub const SCALAR_PREFIX: &[u8] = b"s:";

/// Handler signature; `Err` is rendered as an error reply by the dispatcher
pub type CommandHandler = fn(&Context<'_>) -> Result<Reply>;

/// Accepted argument counts, command name excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == n,
            Arity::AtLeast(n) => argc >= n,
            Arity::Range(min, max) => (min..=max).contains(&argc),
        }
    }
}

/// One command table entry
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Lowercase command name
    pub name: &'static str,
    pub arity: Arity,
    pub handler: CommandHandler,
}

/// What a handler gets to work with
pub struct Context<'a> {
    /// Arguments after the command name
    pub args: &'a [Vec<u8>],
    pub store: &'a Store,
}

impl Context<'_> {
    /// Argument `i`; callers rely on the arity check for bounds
    pub fn arg(&self, i: usize) -> &[u8] {
        &self.args[i]
    }

    /// Argument `i` with the scalar namespace applied
    pub fn key(&self, i: usize) -> Vec<u8> {
        scalar_key(&self.args[i])
    }
}

/// Name → handler mapping, built once and shared by all connections
pub struct CommandTable {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Every command flatkv serves
    pub fn builtin() -> Self {
        let mut table = Self::new();
        strings::register(&mut table);
        server::register(&mut table);
        table
    }

    /// Add or replace a command
    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name.to_ascii_lowercase().as_str())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run one request, producing exactly one reply
    pub fn dispatch(&self, request: &Request, store: &Store) -> Reply {
        let Some(spec) = self.get(&request.name) else {
            return Reply::error(format!("unknown command '{}'", request.name));
        };

        if !spec.arity.accepts(request.args.len()) {
            return wrong_arity(spec.name);
        }

        let ctx = Context {
            args: &request.args,
            store,
        };
        match (spec.handler)(&ctx) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(command = spec.name, error = %e, "command failed");
                Reply::error(e)
            }
        }
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Argument Helpers
// =============================================================================

pub fn scalar_key(user_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(SCALAR_PREFIX.len() + user_key.len());
    key.extend_from_slice(SCALAR_PREFIX);
    key.extend_from_slice(user_key);
    key
}

pub(crate) fn wrong_arity(name: &str) -> Reply {
    Reply::error(format!("wrong number of arguments for '{}' command", name))
}

/// A TTL argument: a positive duration
pub(crate) fn parse_ttl(arg: &[u8]) -> Result<Duration> {
    let text = std::str::from_utf8(arg)
        .map_err(|_| FlatError::Argument("invalid expire time".to_string()))?;
    let ttl = parse_duration(text)?;
    if ttl.is_zero() {
        return Err(FlatError::Argument(format!(
            "invalid expire time '{}': must be positive",
            text
        )));
    }
    Ok(ttl)
}

/// A finite floating-point argument
pub(crate) fn parse_float(arg: &[u8]) -> Result<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| FlatError::Argument("value is not a valid float".to_string()))
}

/// Integer reply for whole numbers within `i64`, decimal bulk otherwise
pub(crate) fn number_reply(value: f64) -> Reply {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Reply::Integer(value as i64)
    } else {
        Reply::Bulk(value.to_string().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert!(Arity::Exact(1).accepts(1));
        assert!(!Arity::Exact(1).accepts(2));
        assert!(Arity::AtLeast(0).accepts(0));
        assert!(Arity::Range(1, 3).accepts(3));
        assert!(!Arity::Range(1, 3).accepts(0));
        assert!(!Arity::Range(1, 3).accepts(4));
    }

    #[test]
    fn test_number_reply() {
        assert_eq!(number_reply(10.0), Reply::Integer(10));
        assert_eq!(number_reply(-3.0), Reply::Integer(-3));
        assert_eq!(number_reply(10.5), Reply::Bulk(b"10.5".to_vec()));
        assert_eq!(number_reply(0.1 + 0.2), Reply::Bulk(b"0.30000000000000004".to_vec()));
        assert_eq!(number_reply(1e19), Reply::Bulk(b"10000000000000000000".to_vec()));
    }

    #[test]
    fn test_parse_ttl_rejects_zero() {
        assert_eq!(parse_ttl(b"1s").unwrap(), Duration::from_secs(1));
        assert!(parse_ttl(b"0").is_err());
        assert!(parse_ttl(b"0s").is_err());
        assert!(parse_ttl(b"soon").is_err());
    }
}
