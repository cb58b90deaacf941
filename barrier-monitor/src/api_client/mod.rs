//! HTTP client for the daemon's status API.

pub mod types;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use types::{CircuitView, MonitorState, SignalView};

/// Base URL the daemon listens on by default.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7790";

const API_PREFIX: &str = "/api/v0";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_status(&self) -> Result<MonitorState> {
        self.get("/status").await
    }

    pub async fn get_circuits(&self) -> Result<Vec<CircuitView>> {
        self.get("/circuits").await
    }

    pub async fn get_circuit(&self, id: &str) -> Result<CircuitView> {
        self.get(&format!("/circuits/{id}")).await
    }

    pub async fn get_signal(&self) -> Result<SignalView> {
        self.get("/modem/signal").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error"))?;

        response
            .json()
            .await
            .with_context(|| format!("invalid response from {url}"))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
