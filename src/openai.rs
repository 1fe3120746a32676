//! Thin HTTP client for the OpenAI REST API.
//!
//! Shared by the vision extractor, the vector-store service, and the chat
//! runtime. Requests are made once: remote-call failures surface to the
//! caller without automatic retry. Non-success responses become errors
//! carrying the status and the first 500 characters of the body.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

use crate::config::OpenAIConfig;

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAIClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from `[openai]`, reading `OPENAI_API_KEY`.
    pub fn from_config(config: &OpenAIConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("OpenAI request failed: GET {}", path))?;
        read_json(resp, path).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("OpenAI request failed: POST {}", path))?;
        read_json(resp, path).await
    }

    pub async fn post_multipart(&self, path: &str, form: reqwest::multipart::Form) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("OpenAI request failed: POST {}", path))?;
        read_json(resp, path).await
    }
}

async fn read_json(resp: reqwest::Response, path: &str) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "OpenAI API error {} on {}: {}",
            status,
            path,
            body.chars().take(500).collect::<String>()
        );
    }
    Ok(resp.json().await?)
}

/// Read a required string field from a JSON response object.
pub fn required_str<'a>(json: &'a Value, field: &str) -> Result<&'a str> {
    json.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing '{}'", field))
}
