// Priority bands shared by the command bus and the worker pool

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::DomainError;

/// Scheduling priority. Lower value wins the queue position.
///
/// The derived `Ord` follows the discriminant, so `Critical < High < Normal < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Stop operations, UI-blocking work
    Critical = 0,
    /// Start operations, user-initiated actions
    High = 1,
    /// Info/list operations, background work
    Normal = 2,
    /// Install/batch operations, maintenance
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Numeric band value (0 = most urgent)
    pub fn value(self) -> u8 {
        self as u8
    }

    /// One step less urgent, saturating at `Low`
    pub fn demote(self) -> Priority {
        match self {
            Priority::Critical => Priority::High,
            Priority::High => Priority::Normal,
            Priority::Normal | Priority::Low => Priority::Low,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "CRITICAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Priority::Critical),
            "HIGH" => Ok(Priority::High),
            "NORMAL" => Ok(Priority::Normal),
            "LOW" => Ok(Priority::Low),
            other => Err(DomainError::InvalidPriority(other.to_string())),
        }
    }
}
