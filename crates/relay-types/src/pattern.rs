//! # Subscription Patterns
//!
//! A pattern is an exact event name, a trailing wildcard (`input.*`,
//! `decision.intent.*`) or the match-all `*`.

use crate::errors::ValidationError;
use crate::events::EventName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    /// Matches one event name.
    Exact(String),
    /// Matches every name starting with the stored prefix (dot included).
    Prefix(String),
    /// Matches every event.
    All,
}

impl Pattern {
    /// Parse a pattern string.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw == "*" {
            return Ok(Self::All);
        }

        if let Some(prefix) = raw.strip_suffix(".*") {
            let segments: Vec<&str> = prefix.split('.').collect();
            let valid = !prefix.is_empty()
                && segments.len() <= 2
                && segments.iter().all(|s| {
                    !s.is_empty()
                        && s.bytes()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
                });
            if !valid {
                return Err(ValidationError::MalformedName {
                    name: raw.to_string(),
                });
            }
            return Ok(Self::Prefix(format!("{prefix}.")));
        }

        EventName::parse(raw).map(|name| Self::Exact(name.as_str().to_string()))
    }

    /// Whether this pattern is a wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }

    /// Whether `name` is matched by this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::All => true,
        }
    }

    /// Whether every name matched by `other` is also matched by `self`.
    #[must_use]
    pub fn covers(&self, other: &Pattern) -> bool {
        match (self, other) {
            (Self::All, _) => true,
            (_, Self::All) => false,
            (Self::Prefix(prefix), Self::Prefix(inner)) => inner.starts_with(prefix.as_str()),
            (_, Self::Exact(name)) => self.matches(name),
            (Self::Exact(_), Self::Prefix(_)) => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::All => f.write_str("*"),
        }
    }
}

impl FromStr for Pattern {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.to_string()
    }
}
