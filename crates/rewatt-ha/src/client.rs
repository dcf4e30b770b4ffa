// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, trace, warn};

use crate::errors::{HaError, HaResult};
use crate::types::{HaHistoryState, HistoryDataPoint};

/// Home Assistant REST API client used by the history fetcher.
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HomeAssistantClient {
    /// Create a new HA client with custom configuration.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Create a client from `HA_URL`/`HA_TOKEN` in the environment or a
    /// `.env` file with the same keys.
    pub fn from_env() -> HaResult<Self> {
        // A missing .env file is fine; real env vars take precedence
        dotenvy::dotenv().ok();

        let base_url =
            std::env::var("HA_URL").unwrap_or_else(|_| "http://localhost:8123".to_owned());
        let token = std::env::var("HA_TOKEN")
            .map_err(|_| HaError::ConfigError("HA_TOKEN environment variable not set".to_owned()))?;

        info!("Initializing HA client for {}", base_url);
        Self::new(base_url, token)
    }

    /// Health check - ping the HA API.
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Fetch historical data for one sensor entity.
    ///
    /// Non-numeric states (`unknown`, `unavailable`, text) are skipped, as
    /// are rows with unparseable timestamps; parsing continues.
    pub async fn get_history(
        &self,
        entity_id: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> HaResult<Vec<HistoryDataPoint>> {
        let end = end_time.unwrap_or_else(Utc::now);
        let start_str = start_time.to_rfc3339();
        let end_encoded = urlencoding::encode(&end.to_rfc3339()).into_owned();

        let url = format!(
            "{}/api/history/period/{}?filter_entity_id={}&end_time={}",
            self.base_url, start_str, entity_id, end_encoded
        );

        debug!("📊 [HA HISTORY] Fetching history for: {}", entity_id);
        debug!("   Time range: {} to {}", start_str, end.to_rfc3339());

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                // HA returns an array of arrays, one inner array per entity
                let history: Vec<Vec<HaHistoryState>> = response.json().await?;
                let Some(entity_history) = history.first() else {
                    debug!("⚠️ [HA HISTORY] No history data returned for {}", entity_id);
                    return Ok(Vec::new());
                };

                let mut data_points = Vec::new();
                for state in entity_history {
                    let Ok(value) = state.state.parse::<f64>() else {
                        trace!("Skipping non-numeric state: {}", state.state);
                        continue;
                    };
                    let Ok(timestamp) = DateTime::parse_from_rfc3339(&state.last_updated) else {
                        trace!("Could not parse timestamp: {}", state.last_updated);
                        continue;
                    };
                    data_points.push(HistoryDataPoint {
                        timestamp: timestamp.with_timezone(&Utc),
                        value,
                    });
                }

                info!(
                    "✅ [HA HISTORY] Retrieved {} data points for {}",
                    data_points.len(),
                    entity_id
                );
                Ok(data_points)
            }
            StatusCode::NOT_FOUND => {
                error!("❌ [HA HISTORY] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA HISTORY] Authentication failed for: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("❌ [HA HISTORY] Status {}: {}", status, error_text);
                Err(HaError::ApiError {
                    status: status.as_u16(),
                    message: error_text,
                })
            }
        }
    }

    /// Retry a request with exponential backoff.
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> HaResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(HaError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

impl std::fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_history_parses_numeric_states() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/api/history/period/.*".to_owned()),
            )
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([[
                    {
                        "entity_id": "sensor.grid_power",
                        "state": "1250.5",
                        "last_updated": "2024-03-01T06:00:00+00:00"
                    },
                    {
                        "entity_id": "sensor.grid_power",
                        "state": "unavailable",
                        "last_updated": "2024-03-01T06:05:00+00:00"
                    },
                    {
                        "entity_id": "sensor.grid_power",
                        "state": "1300.0",
                        "last_updated": "not-a-timestamp"
                    }
                ]])
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let start = "2024-03-01T00:00:00Z".parse().unwrap();
        let points = client
            .get_history("sensor.grid_power", start, None)
            .await
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 1250.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/api/history/period/.*".to_owned()),
            )
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let start = "2024-03-01T00:00:00Z".parse().unwrap();
        let result = client.get_history("sensor.nope", start, None).await;

        assert!(matches!(result, Err(HaError::EntityNotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_history_empty_response() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "GET",
                mockito::Matcher::Regex(r"^/api/history/period/.*".to_owned()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let start = "2024-03-01T00:00:00Z".parse().unwrap();
        let points = client.get_history("sensor.grid_power", start, None).await.unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_ping_reports_failure_without_error() {
        let client = HomeAssistantClient::new("http://127.0.0.1:1", "token").unwrap();
        assert!(!client.ping().await.unwrap());
    }
}
