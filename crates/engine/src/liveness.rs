use std::fmt;

use raidsync_core::Timestamp;

pub const DEFAULT_ACTIVE_WINDOW_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No heartbeat has ever been recorded.
    NeverSeen,
    Active,
    Stale,
}

impl Liveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverSeen => "never seen",
            Self::Active => "active",
            Self::Stale => "stale",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies the bridge from the age of its heartbeat.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    active_window_secs: i64,
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVE_WINDOW_SECS)
    }
}

impl LivenessMonitor {
    pub fn new(active_window_secs: u64) -> Self {
        Self {
            active_window_secs: i64::try_from(active_window_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn active_window_secs(&self) -> i64 {
        self.active_window_secs
    }

    pub fn evaluate(&self, heartbeat: Option<Timestamp>, now: Timestamp) -> Liveness {
        match heartbeat {
            None => Liveness::NeverSeen,
            // A heartbeat ahead of our clock still proves the bridge is alive.
            Some(hb) if now.secs_since(hb) <= self.active_window_secs => Liveness::Active,
            Some(_) => Liveness::Stale,
        }
    }
}
