//! Query variants and bound parameters

use crate::value::SqlValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a variant in a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantTag {
    /// Reference query / index state
    Baseline,
    /// Rewrite or alternative index state measured against a baseline
    Candidate,
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantTag::Baseline => f.write_str("baseline"),
            VariantTag::Candidate => f.write_str("candidate"),
        }
    }
}

/// A named, parameterized query
///
/// `setup` statements run once before the first execution and `teardown`
/// statements once after the last, both outside measurement. They model
/// index states (`CREATE INDEX` / `DROP INDEX`) alongside query rewrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    /// Unique name
    pub name: String,
    /// Baseline or candidate
    pub tag: VariantTag,
    /// SQL text with positional placeholders (`?`, `?N` or `$N`)
    pub sql: String,
    /// Statements run before measurement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<String>,
    /// Statements run after measurement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<String>,
    /// Free-form description for reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl QueryVariant {
    /// Create a variant
    pub fn new(name: impl Into<String>, tag: VariantTag, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag,
            sql: sql.into(),
            setup: Vec::new(),
            teardown: Vec::new(),
            description: None,
        }
    }

    /// Baseline variant
    pub fn baseline(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, VariantTag::Baseline, sql)
    }

    /// Candidate variant
    pub fn candidate(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(name, VariantTag::Candidate, sql)
    }

    /// Add a setup statement
    pub fn with_setup(mut self, sql: impl Into<String>) -> Self {
        self.setup.push(sql.into());
        self
    }

    /// Add a teardown statement
    pub fn with_teardown(mut self, sql: impl Into<String>) -> Self {
        self.teardown.push(sql.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether running this variant changes database state (setup or teardown)
    pub fn changes_state(&self) -> bool {
        !self.setup.is_empty() || !self.teardown.is_empty()
    }

    /// Number of positional parameters the SQL expects
    pub fn param_count(&self) -> usize {
        placeholder_count(&self.sql)
    }
}

/// Count positional placeholders in `sql`.
///
/// Numbered placeholders (`?3`, `$3`) count up to their highest index. A bare
/// `?` takes the number after the highest one seen so far, as SQLite numbers
/// them. Quoted literals, quoted identifiers and comments are skipped.
pub fn placeholder_count(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut highest = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
            }
            sigil @ (b'?' | b'$') => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    let n: usize = sql[start..end].parse().unwrap_or(0);
                    highest = highest.max(n);
                } else if sigil == b'?' {
                    highest += 1;
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    highest
}

/// Bound parameter values for one variant run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(pub Vec<SqlValue>);

impl Params {
    /// No parameters
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Parameter values
    pub fn as_slice(&self) -> &[SqlValue] {
        &self.0
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no values are bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SqlValue>> for Params {
    fn from(values: Vec<SqlValue>) -> Self {
        Self(values)
    }
}
