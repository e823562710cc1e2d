//! Detail service client.
//!
//! The heavyweight upstream: full attacker/victim/location payloads,
//! addressed by (killmail id, content hash). Gets its own breaker and
//! a longer timeout budget than the index service.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use feed_core::{Attacker, Error, Result, Victim};
use telemetry::health;

use crate::breaker::CircuitBreaker;
use crate::config::UpstreamConfig;
use crate::index::check_status;
use crate::retry::{retry, RetryPolicy};

/// Full detail payload for one killmail.
#[derive(Debug, Clone, Deserialize)]
pub struct KillmailDetail {
    pub killmail_id: u64,
    pub killmail_time: DateTime<Utc>,
    pub solar_system_id: u64,
    pub victim: Victim,
    #[serde(default)]
    pub attackers: Vec<Attacker>,
}

/// HTTP client for the detail service.
pub struct DetailClient {
    http: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl DetailClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.detail_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::internal(format!("failed to build detail client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.detail_url.trim_end_matches('/').to_string(),
            breaker: Arc::new(CircuitBreaker::new("detail", config.breaker_config())),
            policy: config.detail_retry_policy(),
        })
    }

    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Fetches the full payload for one killmail.
    pub async fn detail(&self, killmail_id: u64, hash: &str) -> Result<KillmailDetail> {
        let result = self
            .breaker
            .call(retry(&self.policy, "detail", || {
                self.get_detail(killmail_id, hash)
            }))
            .await;
        match &result {
            Ok(_) => health().detail_service.set_healthy(),
            Err(err) if err.is_client_rejection() => health().detail_service.set_healthy(),
            Err(err) => health().detail_service.set_unhealthy(err.to_string()),
        }
        result
    }

    async fn get_detail(&self, killmail_id: u64, hash: &str) -> Result<KillmailDetail> {
        let url = format!("{}/killmails/{}/{}", self.base_url, killmail_id, hash);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?;

        let response = check_status(response).await?;
        let detail: KillmailDetail = response
            .json()
            .await
            .map_err(|e| Error::invalid_payload(format!("detail decode: {e}")))?;

        if detail.killmail_id != killmail_id {
            return Err(Error::invalid_payload(format!(
                "detail id mismatch: asked {killmail_id}, got {}",
                detail.killmail_id
            )));
        }

        debug!(
            killmail_id,
            attackers = detail.attackers.len(),
            "fetched detail"
        );
        Ok(detail)
    }
}
