use std::time::Duration;

use serde::{Deserialize, Serialize};
use txlens_core::RefreshPolicy;
use typed_builder::TypedBuilder;

use crate::backend::LevelSpelling;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8080/ws";

/// Settings for an [`Observer`](crate::observer::Observer).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TypedBuilder)]
#[serde(default)]
pub struct ObserverConfig {
    /// Root of the backend's HTTP API.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    /// WebSocket endpoint streaming transaction events.
    #[builder(default = DEFAULT_STREAM_URL.to_string(), setter(into))]
    pub stream_url: String,
    /// Delay between a mutating statement and the entity refetch, giving the
    /// backend's write time to settle.
    #[builder(default = 100)]
    pub refresh_delay_ms: u64,
    #[builder(default = 5_000)]
    pub request_timeout_ms: u64,
    /// Capacity of the monitor's input queue.
    #[builder(default = 1_024)]
    pub queue_capacity: usize,
    #[builder(default)]
    pub refresh_policy: RefreshPolicy,
    #[builder(default)]
    pub level_spelling: LevelSpelling,
}

impl ObserverConfig {
    #[must_use]
    pub const fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.stream_url, "ws://localhost:8080/ws");
        assert_eq!(config.refresh_delay(), Duration::from_millis(100));
        assert_eq!(config.refresh_policy, RefreshPolicy::MutatingStatements);
        assert_eq!(config.level_spelling, LevelSpelling::Hyphenated);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: ObserverConfig = serde_json::from_str(
            r#"{"base_url":"http://db-lab:9000","refresh_policy":"update-keyword"}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://db-lab:9000");
        assert_eq!(config.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.refresh_policy, RefreshPolicy::UpdateKeyword);
        assert_eq!(config.queue_capacity, 1_024);
    }
}
