use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_enabled")]
    pub enabled: bool,

    /// Requests allowed per client in each window
    #[serde(default = "RateLimitConfig::default_max_requests")]
    pub max_requests: u32,

    /// Window length in seconds
    #[serde(default = "RateLimitConfig::default_window")]
    pub window: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: RateLimitConfig::default_enabled(),
            max_requests: RateLimitConfig::default_max_requests(),
            window: RateLimitConfig::default_window(),
        }
    }
}

impl RateLimitConfig {
    pub const fn default_enabled() -> bool {
        true
    }

    pub const fn default_max_requests() -> u32 {
        100
    }

    // 15 minutes
    pub const fn default_window() -> u64 {
        60 * 15
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }
}
