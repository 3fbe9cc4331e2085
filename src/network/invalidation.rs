//! Invalidation levels.
//!
//! Levels are totally ordered; combining two levels always takes the more
//! severe one. Invalidation is the only way a level rises and a successful
//! `process()` is the only way it falls back to [`InvalidationLevel::Valid`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// How stale a port or processor is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum InvalidationLevel {
    /// Up to date.
    #[default]
    Valid,
    /// Outputs must be recomputed from the current inputs.
    InvalidOutput,
    /// Internal resources must be rebuilt before outputs can be recomputed.
    InvalidResources,
}

impl InvalidationLevel {
    #[inline]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// The more severe of the two levels.
    #[inline]
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    /// Raise `self` to at least `level`. Returns true if the level changed.
    #[inline]
    pub fn raise(&mut self, level: Self) -> bool {
        let next = self.combine(level);
        let changed = next != *self;
        *self = next;
        changed
    }
}

impl fmt::Display for InvalidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidationLevel::Valid => "valid",
            InvalidationLevel::InvalidOutput => "invalid-output",
            InvalidationLevel::InvalidResources => "invalid-resources",
        };
        f.write_str(name)
    }
}
