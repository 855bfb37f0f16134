use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LimiterError, Result};
use crate::window::{Scope, DAY_SECS};

pub const DEFAULT_NAMESPACE: &str = "riot";

/// Longest window a gate may use.
pub const MAX_WINDOW_SECS: u64 = DAY_SECS;

/// Quota tier a gate enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// The long-window quota granted for the API key.
    Sustained,
    /// Short-window cap that smooths spikes inside the sustained window.
    Burst,
}

impl Tier {
    /// Scope of the admission counter for this tier.
    pub fn counter_scope(&self) -> Scope {
        match self {
            Tier::Sustained => Scope::SustainedLimit,
            Tier::Burst => Scope::BurstLimit,
        }
    }

    /// Scope of the counter recording denials by this tier.
    pub fn hits_scope(&self) -> Scope {
        match self {
            Tier::Sustained => Scope::SustainedLimitHits,
            Tier::Burst => Scope::BurstLimitHits,
        }
    }
}

/// One fixed-window quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub tier: Tier,
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Gate {
    pub fn new(tier: Tier, limit: u64, window: Duration) -> Self {
        Self {
            tier,
            limit,
            window,
        }
    }

    pub fn sustained(limit: u64, window: Duration) -> Self {
        Self::new(Tier::Sustained, limit, window)
    }

    pub fn burst(limit: u64, window: Duration) -> Self {
        Self::new(Tier::Burst, limit, window)
    }

    pub fn window_secs(&self) -> u64 {
        self.window.as_secs()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.limit == 0 {
            return Err(format!("{:?} limit must be greater than 0", self.tier));
        }
        if self.window.as_secs() == 0 {
            return Err(format!("{:?} window must be at least one second", self.tier));
        }
        if self.window.as_secs() > MAX_WINDOW_SECS {
            return Err(format!("{:?} window must be at most one day", self.tier));
        }
        if self.window.subsec_nanos() != 0 {
            return Err(format!("{:?} window must be a whole number of seconds", self.tier));
        }
        Ok(())
    }
}

/// Immutable limiter parameters: a key namespace and the gates evaluated,
/// in order, before every admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub gates: Vec<Gate>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for RateLimiterConfig {
    /// Personal development key limits: 100 requests per 2 minutes, with at
    /// most 20 in any 10 second window.
    fn default() -> Self {
        Self::new(100, Duration::from_secs(120), 20, Duration::from_secs(10))
    }
}

impl RateLimiterConfig {
    pub fn new(
        sustained_limit: u64,
        sustained_window: Duration,
        burst_limit: u64,
        burst_window: Duration,
    ) -> Self {
        Self {
            namespace: default_namespace(),
            gates: vec![
                Gate::sustained(sustained_limit, sustained_window),
                Gate::burst(burst_limit, burst_window),
            ],
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Parse a JSON gate file, e.g.
    /// `{"gates":[{"tier":"sustained","limit":100,"window":"2m"}]}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LimiterError::Configuration(format!("Invalid gate file: {}", e)))
    }

    pub fn gate(&self, tier: Tier) -> Option<&Gate> {
        self.gates.iter().find(|g| g.tier == tier)
    }

    /// The sustained gate. Validation guarantees there is one.
    pub fn sustained(&self) -> Option<&Gate> {
        self.gate(Tier::Sustained)
    }
}
