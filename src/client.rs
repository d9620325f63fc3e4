use crate::model::{ControlAction, StatusReport, SyncConfig};
use anyhow::{anyhow, Context, Result};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

const CSRF_HEADER: &str = "X-CSRFToken";
const COUNTS_PATH: &str = "/api/detection/get_counts/";

#[derive(Debug, Deserialize)]
struct ControlReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the detection service.
///
/// Control calls are POSTs carrying the CSRF token; the status poll is a
/// plain GET. Transport failures, non-2xx responses, `{"status":"error"}`
/// bodies, and mismatched acknowledgements all surface as errors and are
/// handled uniformly by the caller.
pub struct DetectionClient {
    http: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl DetectionClient {
    pub fn new(cfg: &SyncConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            csrf_token: cfg.csrf_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue one control action and verify its acknowledgement.
    pub async fn control(&self, action: ControlAction) -> Result<()> {
        let url = self.url(action.endpoint());
        debug!(%url, action = action.as_str(), "sending control request");

        let mut req = self.http.post(&url).header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.csrf_token {
            req = req.header(CSRF_HEADER, token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", action.as_str()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("{} returned HTTP {status}", action.as_str()));
        }

        let reply: ControlReply = resp
            .json()
            .await
            .with_context(|| format!("malformed {} response", action.as_str()))?;
        if reply.status == "error" {
            return Err(anyhow!(reply
                .message
                .unwrap_or_else(|| "unspecified service error".to_string())));
        }
        if reply.status != action.expected_ack() {
            return Err(anyhow!(
                "unexpected {} acknowledgement: {:?}",
                action.as_str(),
                reply.status
            ));
        }
        Ok(())
    }

    /// Fetch the current job status and counters.
    pub async fn fetch_status(&self) -> Result<StatusReport> {
        let resp = self
            .http
            .get(self.url(COUNTS_PATH))
            .send()
            .await
            .context("status request failed")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("status endpoint returned HTTP {status}"));
        }

        let body: serde_json::Value = resp.json().await.context("malformed status response")?;
        if body.get("status").and_then(|v| v.as_str()) == Some("error") {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unspecified service error");
            return Err(anyhow!("service reported error: {message}"));
        }
        serde_json::from_value(body).context("malformed status response")
    }
}
