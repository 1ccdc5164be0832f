use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::api::{Payload, StatusReply, SubmitReply};
use crate::config::ClientConfig;
use crate::error::{ApiErrorResponse, format_api_error};
use crate::util::{guess_filename_from_url, urljoin};

/// The three calls a submit-poll-download API needs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, body: &Value) -> Result<SubmitReply>;

    async fn status(&self, request_id: &str) -> Result<StatusReply>;

    async fn download(&self, url: &str) -> Result<Payload>;
}

/// [`Transport`] over HTTPS with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    key: String,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        Self::with_timeout(cfg, Duration::from_secs(60))
    }

    pub fn with_timeout(cfg: &ClientConfig, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sgapi-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("sgapi-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !cfg.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            key: cfg.key.clone(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn api_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        let url = resp.url().to_string();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            // Try to parse API error payloads for actionable messages.
            if let Ok(err_json) = serde_json::from_str::<ApiErrorResponse>(&text) {
                return Err(format_api_error(status, &url, &err_json));
            }

            bail!(
                "API request failed: HTTP {} for url ({})\n{}",
                status,
                url,
                text
            );
        }

        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse API JSON (url={}, status={})", url, status))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, body: &Value) -> Result<SubmitReply> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(self.key.trim())
            .json(body)
            .send()
            .await
            .with_context(|| format!("could not connect to {}", self.url))?;
        Self::api_json(resp).await
    }

    async fn status(&self, request_id: &str) -> Result<StatusReply> {
        let status_url = urljoin(&self.url, request_id);
        let resp = self
            .http
            .get(&status_url)
            .bearer_auth(self.key.trim())
            .send()
            .await
            .with_context(|| format!("could not connect to {}", status_url))?;
        Self::api_json(resp).await
    }

    async fn download(&self, url: &str) -> Result<Payload> {
        // Download links are pre-signed; no auth header.
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("could not connect to {}", url))?;
        let resp = resp.error_for_status().context("download request failed")?;

        let file_name = guess_filename_from_url(resp.url().as_str());
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .context("download interrupted")?
            .to_vec();

        Ok(Payload {
            bytes,
            file_name,
            content_type,
        })
    }
}
