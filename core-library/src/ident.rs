//! Validated SQL identifiers
//!
//! Table, column and trigger names come from configuration, never from row
//! data, but they are still interpolated into DDL and queries. Every such
//! name goes through [`SqlIdent::new`] first; values always travel as bound
//! parameters.

use crate::error::{LibraryError, Result};
use std::fmt;

const MAX_IDENT_LEN: usize = 64;

/// A table, column or trigger name that passed the allow-list.
///
/// Allowed: ASCII letter or `_` first, then ASCII letters, digits or `_`,
/// at most 64 characters, not in SQLite's reserved `sqlite_` namespace.
/// `Display` renders the double-quoted form ready for interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_allowed(&name) {
            Ok(Self(name))
        } else {
            Err(LibraryError::InvalidIdentifier(name))
        }
    }

    /// The bare name, as stored in `sqlite_master`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join two identifiers with `_`, e.g. a namespace and a suffix.
    pub fn suffixed(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}_{}", self.0, suffix))
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl AsRef<str> for SqlIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_allowed(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_IDENT_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.to_ascii_lowercase().starts_with("sqlite_")
}

/// Render a comma-separated list of quoted identifiers.
pub fn join_idents(idents: &[SqlIdent]) -> String {
    idents
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
