//! Server addressing.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How a caller names the server a command is meant for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A literal server name.
    ByName(String),
    /// A 1-based position in the persisted server list.
    ByOrdinal(usize),
}

impl Target {
    /// Parses an optional target argument. Blank input means "every server".
    pub fn optional(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        (!raw.is_empty()).then(|| Self::from(raw))
    }
}

impl From<&str> for Target {
    /// Digit-only input is an ordinal, anything else a name.
    fn from(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            // Saturates on overflow; such an ordinal is never in range.
            Target::ByOrdinal(raw.parse().unwrap_or(usize::MAX))
        } else {
            Target::ByName(raw.to_string())
        }
    }
}

impl From<String> for Target {
    fn from(raw: String) -> Self {
        Target::from(raw.as_str())
    }
}

impl From<usize> for Target {
    fn from(index: usize) -> Self {
        Target::ByOrdinal(index)
    }
}

impl FromStr for Target {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Target::from(s))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::ByName(name) => f.write_str(name),
            Target::ByOrdinal(index) => write!(f, "#{index}"),
        }
    }
}
