// 🪪 Name splitting - pluggable "full name → first/last" rules
//
// Exports only give a single "full name" string for Bolt and Heetch.
// The split is positional and heuristic, so it lives behind a trait.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersonName {
    pub first_name: String,
    pub last_name: String,
}

/// NameParser - splits a full name into first and last name
pub trait NameParser: Send + Sync {
    fn split(&self, full_name: &str) -> PersonName;
}

/// First whitespace-delimited token is the first name; following tokens form
/// the last name, optionally capped at `max_last_tokens`.
///
/// A single-word name yields an empty last name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstTokenNameParser {
    pub max_last_tokens: Option<usize>,
}

impl FirstTokenNameParser {
    /// Bolt rule: last name is tokens 2-4
    pub fn bolt() -> Self {
        FirstTokenNameParser {
            max_last_tokens: Some(3),
        }
    }

    /// Heetch rule: last name is every remaining token
    pub fn unbounded() -> Self {
        FirstTokenNameParser {
            max_last_tokens: None,
        }
    }
}

impl Default for FirstTokenNameParser {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl NameParser for FirstTokenNameParser {
    fn split(&self, full_name: &str) -> PersonName {
        let mut tokens = full_name.split_whitespace();

        let first_name = tokens.next().unwrap_or("").to_string();
        let rest: Vec<&str> = match self.max_last_tokens {
            Some(max) => tokens.take(max).collect(),
            None => tokens.collect(),
        };

        PersonName {
            first_name,
            last_name: rest.join(" "),
        }
    }
}

/// Key used to recognise the same driver across platforms:
/// lowercase, whitespace collapsed.
pub fn match_key(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
