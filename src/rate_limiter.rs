//! Admission control for outbound calls to the quota-limited upstream API.
//!
//! Every gate is a fixed-window counter held in the shared [`CounterStore`].
//! A gate is open while its current bucket count is below its limit and
//! closes until the next bucket boundary once the limit is reached.
//!
//! The check and the increment are separate store operations, so callers
//! racing at a bucket boundary may overshoot a limit by up to the number of
//! requests in flight. No distributed lock is taken to prevent this.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config_validator::ConfigValidator;
use crate::error::{LimiterError, Result};
use crate::rate_limit_config::{Gate, RateLimiterConfig, Tier};
use crate::store::CounterStore;
use crate::window::{scope_prefix, Scope, WindowKey, DAY_SECS, HOUR_SECS, MINUTE_SECS};

/// Outcome of an admission check or a read-only peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Zero when allowed, otherwise the time until the denying gate reopens.
    pub wait_time: Duration,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            wait_time: Duration::ZERO,
        }
    }

    pub fn deny(wait_time: Duration) -> Self {
        Self {
            allowed: false,
            wait_time,
        }
    }
}

/// Counters for the current minute, sustained window, day and hour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests_this_minute: u64,
    pub requests_this_sustained_window: u64,
    pub requests_today: u64,
    /// Sustained-gate denials this hour.
    pub sustained_limit_hits: u64,
    /// Burst-gate denials this hour.
    pub burst_limit_hits: u64,
}

/// Read-only view combining the limited check, remaining quota and statistics.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterStatus {
    pub limited: bool,
    pub wait_time_ms: u64,
    pub remaining: u64,
    pub stats: StatsSnapshot,
}

/// Shared handle to the limiter. Cheap to clone; holds no counters itself.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        ConfigValidator::validate_limiter_config(&config)?;

        Ok(RateLimiter {
            config: Arc::new(config),
            store,
            clock,
        })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Try to admit one request.
    ///
    /// Gates are read in order and the first closed gate denies; its hit
    /// counter is bumped on a best-effort basis. When every gate is open all
    /// gate and reporting counters are incremented in one batch. A store
    /// failure is returned as an error, never as an admission.
    pub async fn check_rate_limit(&self) -> Result<Decision> {
        let now = self.clock.now();

        for gate in &self.config.gates {
            let key = self.gate_key(gate, now);
            let count = self.read(&key).await?;

            if count >= gate.limit {
                let wait_time = key.time_until_next(now);
                debug!(
                    tier = ?gate.tier,
                    count,
                    limit = gate.limit,
                    wait_ms = wait_time.as_millis() as u64,
                    "Rate limit gate closed"
                );
                self.record_hit(gate.tier, now).await;
                return Ok(Decision::deny(wait_time));
            }
        }

        let mut batch: Vec<(String, Duration)> = self
            .config
            .gates
            .iter()
            .map(|gate| {
                let key = self.gate_key(gate, now);
                (key.render(&self.config.namespace), key.ttl())
            })
            .collect();
        for (scope, window_secs) in [(Scope::MinuteStat, MINUTE_SECS), (Scope::DailyStat, DAY_SECS)] {
            let key = WindowKey::at(scope, now, window_secs);
            batch.push((key.render(&self.config.namespace), key.ttl()));
        }

        self.store.increment_all(&batch).await.map_err(|e| {
            warn!(error = %e, "Failed to increment rate limit counters");
            e
        })?;

        Ok(Decision::allow())
    }

    /// Block until a request is admitted.
    ///
    /// Sleeps for the wait time reported by each denial and tries again.
    /// Store errors are returned at once. Dropping the future cancels it.
    pub async fn wait_for_rate_limit(&self) -> Result<()> {
        self.wait_for_rate_limit_until(std::future::pending::<()>()).await
    }

    /// Like [`wait_for_rate_limit`](Self::wait_for_rate_limit), returning
    /// [`LimiterError::Cancelled`] as soon as `cancel` completes.
    pub async fn wait_for_rate_limit_until<F>(&self, cancel: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(LimiterError::Cancelled),
            result = self.admission_loop() => result,
        }
    }

    /// Like [`wait_for_rate_limit`](Self::wait_for_rate_limit), returning
    /// [`LimiterError::DeadlineExceeded`] once `timeout` elapses.
    pub async fn wait_for_rate_limit_timeout(&self, timeout: Duration) -> Result<()> {
        self.wait_for_rate_limit_until_timeout(std::future::pending::<()>(), timeout)
            .await
    }

    /// Waits until admitted, `cancel` completes or `timeout` elapses,
    /// whichever comes first.
    pub async fn wait_for_rate_limit_until_timeout<F>(
        &self,
        cancel: F,
        timeout: Duration,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::time::timeout(timeout, self.wait_for_rate_limit_until(cancel))
            .await
            .map_err(|_| LimiterError::DeadlineExceeded)?
    }

    async fn admission_loop(&self) -> Result<()> {
        loop {
            let decision = self.check_rate_limit().await?;
            if decision.allowed {
                return Ok(());
            }
            debug!(wait_ms = decision.wait_time.as_millis() as u64, "Waiting for rate limit");
            tokio::time::sleep(decision.wait_time).await;
        }
    }

    /// Requests left in the current sustained window.
    pub async fn remaining_requests(&self) -> Result<u64> {
        let Some(gate) = self.config.sustained() else {
            return Err(LimiterError::Validation("No sustained gate configured".to_string()));
        };
        let key = self.gate_key(gate, self.clock.now());
        let count = self.read(&key).await?;
        Ok(gate.limit.saturating_sub(count))
    }

    /// Check every gate without counting anything.
    ///
    /// `allowed == false` means a call made now would be denied.
    pub async fn is_rate_limited(&self) -> Result<Decision> {
        let now = self.clock.now();
        for gate in &self.config.gates {
            let key = self.gate_key(gate, now);
            if self.read(&key).await? >= gate.limit {
                return Ok(Decision::deny(key.time_until_next(now)));
            }
        }
        Ok(Decision::allow())
    }

    /// Best-effort statistics. A field whose counter cannot be read is 0.
    pub async fn stats(&self) -> Result<StatsSnapshot> {
        let now = self.clock.now();
        let sustained_window = self
            .config
            .sustained()
            .map(Gate::window_secs)
            .unwrap_or(MINUTE_SECS);

        Ok(StatsSnapshot {
            requests_this_minute: self
                .read_or_zero(WindowKey::at(Scope::MinuteStat, now, MINUTE_SECS))
                .await,
            requests_this_sustained_window: self
                .read_or_zero(WindowKey::at(Scope::SustainedLimit, now, sustained_window))
                .await,
            requests_today: self
                .read_or_zero(WindowKey::at(Scope::DailyStat, now, DAY_SECS))
                .await,
            sustained_limit_hits: self
                .read_or_zero(WindowKey::at(Scope::SustainedLimitHits, now, HOUR_SECS))
                .await,
            burst_limit_hits: self
                .read_or_zero(WindowKey::at(Scope::BurstLimitHits, now, HOUR_SECS))
                .await,
        })
    }

    pub async fn status(&self) -> Result<LimiterStatus> {
        let peek = self.is_rate_limited().await?;
        let remaining = self.remaining_requests().await?;
        let stats = self.stats().await?;
        Ok(LimiterStatus {
            limited: !peek.allowed,
            wait_time_ms: peek.wait_time.as_millis() as u64,
            remaining,
            stats,
        })
    }

    /// Delete every counter owned by this limiter's namespace.
    ///
    /// For administration and tests only. Every prefix is attempted; the
    /// first failure is returned afterwards.
    pub async fn reset_counters(&self) -> Result<()> {
        let mut first_error = None;
        for scope in Scope::ALL {
            let prefix = scope_prefix(&self.config.namespace, scope);
            match self.store.delete_by_prefix(&prefix).await {
                Ok(deleted) => debug!(prefix = %prefix, deleted, "Reset counters"),
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "Failed to reset counters");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Store reachability, for health reporting.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    fn gate_key(&self, gate: &Gate, now: Duration) -> WindowKey {
        WindowKey::at(gate.tier.counter_scope(), now, gate.window_secs())
    }

    async fn read(&self, key: &WindowKey) -> Result<u64> {
        let count = self.store.get(&key.render(&self.config.namespace)).await?;
        Ok(count.unwrap_or(0))
    }

    async fn read_or_zero(&self, key: WindowKey) -> u64 {
        match self.read(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(scope = %key.scope, error = %e, "Failed to read statistics counter");
                0
            }
        }
    }

    async fn record_hit(&self, tier: Tier, now: Duration) {
        let key = WindowKey::at(tier.hits_scope(), now, HOUR_SECS);
        if let Err(e) = self
            .store
            .increment_and_expire(&key.render(&self.config.namespace), key.ttl())
            .await
        {
            warn!(tier = ?tier, error = %e, "Failed to record rate limit hit");
        }
    }
}
