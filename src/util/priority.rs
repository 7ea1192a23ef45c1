//! Queued work priorities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority of a unit of queued work.
///
/// Lower numeric values are more important. `Blocking` is reserved for work a
/// caller is synchronously waiting on: it always bypasses concurrency ceilings
/// and pause budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum QueuedWorkPriority {
    /// A caller is blocked waiting on this item.
    Blocking = 0,
    /// Most important regular priority.
    Highest = 1,
    /// Above normal.
    High = 2,
    /// Default priority.
    #[default]
    Normal = 3,
    /// Below normal.
    Low = 4,
    /// Least important.
    Lowest = 5,
}

impl QueuedWorkPriority {
    /// Number of priority levels (and queue buckets).
    pub const COUNT: usize = 6;

    /// All levels, most important first.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Blocking,
        Self::Highest,
        Self::High,
        Self::Normal,
        Self::Low,
        Self::Lowest,
    ];

    /// Bucket index of this priority.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Priority for a bucket index, if in range.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Whether this is the ceiling-bypassing `Blocking` level.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }

    /// Whether `self` is strictly less important than `other`.
    #[must_use]
    pub fn is_lower_than(self, other: Self) -> bool {
        self.index() > other.index()
    }
}

impl fmt::Display for QueuedWorkPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocking => "blocking",
            Self::Highest => "highest",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Lowest => "lowest",
        };
        f.write_str(name)
    }
}
