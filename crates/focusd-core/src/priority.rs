//! Stream-type priority table.
//!
//! The table is fetched once at startup from an external stream policy and
//! never changes afterwards. Which end of the integer range wins is a
//! property of the policy, captured by [`Precedence`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::focus::validate_name;

/// Direction in which priority numbers rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// A smaller number outranks a larger one
    #[default]
    LowerWins,
    /// A larger number outranks a smaller one
    HigherWins,
}

/// Source of the stream-type priority mapping.
pub trait StreamPolicySource {
    /// Fetch every stream type with its priority, in policy order.
    ///
    /// # Errors
    /// Returns an error if the policy cannot be read.
    fn fetch_stream_priorities(&self) -> Result<Vec<(String, i32)>>;
}

/// Immutable mapping from stream-type name to priority.
#[derive(Debug, Clone)]
pub struct PriorityTable {
    entries: Vec<(String, i32)>,
    index: HashMap<String, i32>,
    precedence: Precedence,
}

impl PriorityTable {
    /// Build a table from `(name, priority)` pairs.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty table, an over-long name, or a
    /// name listed twice.
    pub fn new(
        entries: impl IntoIterator<Item = (String, i32)>,
        precedence: Precedence,
    ) -> Result<Self> {
        let entries: Vec<_> = entries.into_iter().collect();
        if entries.is_empty() {
            return Err(Error::InvalidArgument("empty stream priority table".to_string()));
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (name, priority) in &entries {
            validate_name("stream type", name)?;
            if index.insert(name.clone(), *priority).is_some() {
                return Err(Error::InvalidArgument(format!("duplicate stream type: {name}")));
            }
        }

        Ok(Self { entries, index, precedence })
    }

    /// Fetch the table from a stream policy source.
    ///
    /// # Errors
    /// Propagates source failures and table validation errors.
    pub fn fetch(source: &dyn StreamPolicySource, precedence: Precedence) -> Result<Self> {
        Self::new(source.fetch_stream_priorities()?, precedence)
    }

    /// Priority of a stream type, if known.
    #[must_use]
    pub fn priority_of(&self, stream_type: &str) -> Option<i32> {
        self.index.get(stream_type).copied()
    }

    /// True if priority `a` strictly outranks priority `b`.
    #[must_use]
    pub fn outranks(&self, a: i32, b: i32) -> bool {
        match self.precedence {
            Precedence::LowerWins => a < b,
            Precedence::HigherWins => a > b,
        }
    }

    #[must_use]
    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// Entries in policy order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.entries.iter().map(|(name, priority)| (name.as_str(), *priority))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
