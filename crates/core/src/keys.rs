use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum allowed length for an [`OperationKind`].
const OPERATION_KIND_MAX_LEN: usize = 64;

/// Errors from constructing an [`OperationKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationKindError {
    /// The input was empty or contained only whitespace.
    #[error("operation kind cannot be empty or whitespace")]
    Empty,
    /// The normalized kind contains characters other than `a-z`, `0-9` and `_`.
    #[error("operation kind contains invalid characters (only a-z, 0-9 and _ allowed)")]
    InvalidCharacters,
    /// The normalized kind exceeds [`OPERATION_KIND_MAX_LEN`] characters.
    #[error("operation kind exceeds maximum length of {OPERATION_KIND_MAX_LEN} characters")]
    TooLong,
}

/// The normalized name of an operation type, e.g. `table_input`.
///
/// Logical operations name their kind; the runtime registers one handler per
/// kind. Normalization trims, lowercases, turns whitespace and hyphens into
/// underscores and collapses runs of underscores, so `"Table Input"` and
/// `"table-input"` name the same kind.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationKind(String);

impl OperationKind {
    /// Normalize and validate `raw`.
    pub fn new(raw: &str) -> Result<Self, OperationKindError> {
        let lowered = raw.to_lowercase();
        let normalized = lowered
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        let allowed = |b: u8| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_');
        if normalized.is_empty() {
            Err(OperationKindError::Empty)
        } else if !normalized.bytes().all(allowed) {
            Err(OperationKindError::InvalidCharacters)
        } else if normalized.len() > OPERATION_KIND_MAX_LEN {
            Err(OperationKindError::TooLong)
        } else {
            Ok(Self(normalized))
        }
    }

    /// The normalized kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OperationKind {
    type Err = OperationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OperationKind {
    type Error = OperationKindError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.0
    }
}

impl AsRef<str> for OperationKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for OperationKind {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
