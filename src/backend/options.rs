//! Opaque backend options
//!
//! The server never interprets these; each backend reads the keys it knows.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{FlatError, Result};

/// String-keyed option map handed to `BackendFactory::open`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOptions {
    values: BTreeMap<String, String>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `key=value` pairs, as given on the command line
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                FlatError::Config(format!("backend option '{}' is not key=value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(FlatError::Config(format!(
                    "backend option '{}' has an empty key",
                    pair
                )));
            }
            options.set(key, value.trim());
        }
        Ok(options)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parse an option with `FromStr`, failing with a config error that
    /// names the offending key
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                FlatError::Config(format!("invalid value '{}' for backend option '{}'", raw, key))
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
