pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod health;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod redis;
pub mod store;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{LimiterError, Result};
pub use rate_limit_config::{Gate, RateLimiterConfig, Tier};
pub use rate_limiter::{Decision, LimiterStatus, RateLimiter, StatsSnapshot};
pub use self::redis::RedisStore;
pub use store::{CounterStore, MemoryStore};
