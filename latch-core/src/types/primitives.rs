use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Urgency of a lock request. Lower numeric value = more urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Highest = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
    Lowest = 4,
}

impl Priority {
    /// Returns the numeric level (0 = most urgent)
    pub fn level(self) -> u8 {
        self as u8
    }

    /// True if `self` is strictly more urgent than `other`
    pub fn outranks(self, other: Priority) -> bool {
        self.level() < other.level()
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Highest => write!(f, "HIGHEST"),
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
            Priority::Lowest => write!(f, "LOWEST"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGHEST" | "0" => Ok(Priority::Highest),
            "HIGH" | "1" => Ok(Priority::High),
            "MEDIUM" | "2" => Ok(Priority::Medium),
            "LOW" | "3" => Ok(Priority::Low),
            "LOWEST" | "4" => Ok(Priority::Lowest),
            _ => Err(format!(
                "Invalid priority '{}'. Must be one of: HIGHEST, HIGH, MEDIUM, LOW, LOWEST",
                s
            )),
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
