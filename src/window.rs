//! Window accounting.
//!
//! Maps wall-clock time onto fixed, time-aligned buckets. Every process that
//! shares a counter store derives the same key for the same second, so no
//! coordination is needed to agree on which counter is current.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const MINUTE_SECS: u64 = 60;
pub const HOUR_SECS: u64 = 3_600;
pub const DAY_SECS: u64 = 86_400;

/// What a counter counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    SustainedLimit,
    BurstLimit,
    DailyStat,
    MinuteStat,
    SustainedLimitHits,
    BurstLimitHits,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::SustainedLimit,
        Scope::BurstLimit,
        Scope::DailyStat,
        Scope::MinuteStat,
        Scope::SustainedLimitHits,
        Scope::BurstLimitHits,
    ];

    /// Label used inside store keys. Changing these orphans live counters.
    pub fn label(&self) -> &'static str {
        match self {
            Scope::SustainedLimit => "personal_limit",
            Scope::BurstLimit => "burst_limit",
            Scope::DailyStat => "daily_requests",
            Scope::MinuteStat => "minute_requests",
            Scope::SustainedLimitHits => "rate_limit_hits",
            Scope::BurstLimitHits => "burst_limit_hits",
        }
    }

    /// How long a counter of this scope outlives its window.
    pub fn ttl(&self, window_secs: u64) -> Duration {
        match self {
            Scope::SustainedLimit | Scope::BurstLimit => {
                Duration::from_secs(window_secs.saturating_add((window_secs / 2).max(20)))
            }
            Scope::MinuteStat => Duration::from_secs(5 * MINUTE_SECS),
            Scope::DailyStat => Duration::from_secs(2 * DAY_SECS),
            Scope::SustainedLimitHits | Scope::BurstLimitHits => {
                Duration::from_secs(25 * HOUR_SECS)
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `floor(now_secs / window_secs)`.
pub fn bucket_index(now_secs: u64, window_secs: u64) -> u64 {
    now_secs / window_secs.max(1)
}

/// Identifies one counter: a scope within one bucket of one window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub scope: Scope,
    pub window_secs: u64,
    pub bucket: u64,
}

impl WindowKey {
    /// Key of the bucket containing `now`. Sub-second precision is dropped.
    pub fn at(scope: Scope, now: Duration, window_secs: u64) -> Self {
        let window_secs = window_secs.max(1);
        Self {
            scope,
            window_secs,
            bucket: bucket_index(now.as_secs(), window_secs),
        }
    }

    /// `<namespace>:<scope>:<window>s:<bucket>`
    pub fn render(&self, namespace: &str) -> String {
        format!(
            "{}:{}:{}s:{}",
            namespace,
            self.scope.label(),
            self.window_secs,
            self.bucket
        )
    }

    /// Unix time in seconds at which the next bucket begins.
    pub fn next_boundary_secs(&self) -> u64 {
        self.bucket.saturating_add(1).saturating_mul(self.window_secs)
    }

    /// Time left until the next bucket begins. Never zero for a `now`
    /// inside this bucket.
    pub fn time_until_next(&self, now: Duration) -> Duration {
        Duration::from_secs(self.next_boundary_secs()).saturating_sub(now)
    }

    pub fn ttl(&self) -> Duration {
        self.scope.ttl(self.window_secs)
    }
}

/// Prefix shared by every key of `scope` under `namespace`.
pub fn scope_prefix(namespace: &str, scope: Scope) -> String {
    format!("{}:{}:", namespace, scope.label())
}
