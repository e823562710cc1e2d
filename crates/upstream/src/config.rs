//! Upstream service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::retry::RetryPolicy;

/// Configuration for all upstream collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Index service base URL (summaries + per-character history)
    pub index_url: String,
    /// Detail service base URL (full attacker/victim payloads)
    pub detail_url: String,
    /// Long-poll queue endpoint
    pub queue_url: String,
    /// Push feed websocket URL
    pub push_url: String,
    /// Topic to join on the push feed
    #[serde(default = "default_push_topic")]
    pub push_topic: String,

    /// Request timeout for index/queue calls in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Request timeout for detail calls (larger payloads)
    #[serde(default = "default_detail_timeout_secs")]
    pub detail_timeout_secs: u64,

    /// Consecutive failures before a breaker trips
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    /// Open-breaker cooldown in seconds
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,

    /// Retry attempts per upstream call
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Initial retry delay in milliseconds
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// Retry delay cap in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Server-side wait for the long-poll queue in seconds
    #[serde(default = "default_queue_wait_secs")]
    pub queue_wait_secs: u64,

    /// Cap on subscribed character ids (bounds memory under roster growth)
    #[serde(default = "default_max_subscribed_characters")]
    pub max_subscribed_characters: usize,
    /// Cap on subscribed solar system ids
    #[serde(default = "default_max_subscribed_systems")]
    pub max_subscribed_systems: usize,

    /// User-Agent sent to upstream services
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_push_topic() -> String {
    "killmails:lobby".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_detail_timeout_secs() -> u64 {
    30
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_secs() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_queue_wait_secs() -> u64 {
    10
}

fn default_max_subscribed_characters() -> usize {
    500
}

fn default_max_subscribed_systems() -> usize {
    200
}

fn default_user_agent() -> String {
    format!("killfeed/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            index_url: "http://localhost:9001".to_string(),
            detail_url: "http://localhost:9002".to_string(),
            queue_url: "http://localhost:9003/queue".to_string(),
            push_url: "ws://localhost:9004/socket".to_string(),
            push_topic: default_push_topic(),
            request_timeout_secs: default_request_timeout_secs(),
            detail_timeout_secs: default_detail_timeout_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            queue_wait_secs: default_queue_wait_secs(),
            max_subscribed_characters: default_max_subscribed_characters(),
            max_subscribed_systems: default_max_subscribed_systems(),
            user_agent: default_user_agent(),
        }
    }
}

impl UpstreamConfig {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            threshold: self.breaker_threshold,
            cooldown: Duration::from_secs(self.breaker_cooldown_secs),
        }
    }

    /// Retry policy for index/queue calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            attempt_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Retry policy for detail calls, with the longer timeout budget.
    pub fn detail_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_secs(self.detail_timeout_secs),
            ..self.retry_policy()
        }
    }
}
