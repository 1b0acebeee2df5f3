// src/http_client.rs
use crate::config::Config;
use crate::error::{Result, WatchError};
use crate::modules::transport::{long_poll_timeout, ConfigFetcher, LongPollTransport};
use crate::modules::watch_key::WatchKey;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use std::time::Duration;

pub const CONFIG_API_PATH: &str = "nacos/v1/cs/configs";
pub const LISTENER_API_PATH: &str = "nacos/v1/cs/configs/listener";
pub const LONG_PULLING_TIMEOUT_HEADER: &str = "Long-Pulling-Timeout";
pub const LISTENING_CONFIGS_FIELD: &str = "Listening-Configs";

/// HTTP access to the Nacos config API: the listener long-poll and the plain
/// config fetch used after a change.
pub struct NacosHttpClient {
    http_client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl NacosHttpClient {
    pub fn new(base_url: &str, request_timeout: Duration, user_agent: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(WatchError::Config("server_addr must not be empty".to_string()));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| WatchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        info!("Using Nacos server at {}", config.server_addr);
        Self::new(
            &config.server_addr,
            config.request_timeout(),
            &config.user_agent,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `GET nacos/v1/cs/configs`. A 404 means the config does not exist.
    pub async fn get_config(&self, key: &WatchKey) -> Result<Option<String>> {
        let url = self.url(CONFIG_API_PATH);
        let fetch_error = |reason: String| WatchError::Fetch {
            key: key.to_string(),
            reason,
        };
        debug!("Fetching config {} from {}", key, url);
        let resp = self
            .http_client
            .get(&url)
            .query(&[
                ("dataId", key.data_id()),
                ("group", key.group()),
                ("tenant", key.tenant()),
            ])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| fetch_error(format!("HTTP request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Config {} not found", key);
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(fetch_error(format!("HTTP {} returned status {}: {}", url, status, body)));
        }
        let content = resp
            .text()
            .await
            .map_err(|e| fetch_error(format!("Failed to read response body: {}", e)))?;
        Ok(Some(content))
    }

    /// `POST nacos/v1/cs/configs/listener`, held by the server for up to
    /// `hold`.
    pub async fn listen(&self, watch_list: &str, hold: Duration) -> Result<String> {
        let url = self.url(LISTENER_API_PATH);
        let hold_ms = hold.as_millis().to_string();
        debug!("Long-polling {} with hold timeout {} ms", url, hold_ms);
        let resp = self
            .http_client
            .post(&url)
            .header(LONG_PULLING_TIMEOUT_HEADER, hold_ms)
            .form(&[(LISTENING_CONFIGS_FIELD, watch_list)])
            .timeout(long_poll_timeout(hold))
            .send()
            .await
            .map_err(|e| WatchError::Transport(format!("HTTP request to {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WatchError::Transport(format!(
                "HTTP {} returned status {}: {}",
                url, status, body
            )));
        }
        resp.text()
            .await
            .map_err(|e| WatchError::Transport(format!("Failed to read listener response: {}", e)))
    }
}

#[async_trait]
impl LongPollTransport for NacosHttpClient {
    async fn poll(&self, watch_list: &str, hold: Duration) -> Result<String> {
        self.listen(watch_list, hold).await
    }
}

#[async_trait]
impl ConfigFetcher for NacosHttpClient {
    async fn fetch_config(&self, key: &WatchKey) -> Result<Option<String>> {
        self.get_config(key).await
    }
}
