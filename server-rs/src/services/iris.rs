use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use sha2::Sha512;

use crate::config::IrisConfig;
use crate::error::{AppError, AppResult};

type HmacSha512 = Hmac<Sha512>;

/// Lookup of escalation plans by name.
#[async_trait]
pub trait PlanLookup: Send + Sync {
    async fn plan_exists(&self, name: &str) -> AppResult<bool>;
}

/// Thin client for the Iris escalation service. Every request is signed with
/// an HMAC over a five second time window, the method, path and body.
#[derive(Clone)]
pub struct IrisClient {
    base_url: String,
    app: String,
    key: String,
    client: reqwest::Client,
}

impl IrisClient {
    pub fn new(config: &IrisConfig) -> Option<Self> {
        if !config.enabled() {
            return None;
        }
        let mut base_url = config.api_host.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Some(Self {
            base_url,
            app: config.app.clone(),
            key: config.key.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn plans_url(&self, name: &str) -> AppResult<reqwest::Url> {
        let url = format!("{}v0/plans", self.base_url);
        reqwest::Url::parse_with_params(&url, &[("name", name), ("active", "1")])
            .map_err(|e| AppError::Internal(format!("Invalid iris url {url}: {e}")))
    }

    async fn get(&self, url: reqwest::Url) -> AppResult<reqwest::Response> {
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let window = chrono::Utc::now().timestamp() / 5;
        let signature = sign(&self.key, window, &Method::GET, &path, "")?;

        let resp = self
            .client
            .get(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("hmac {}:{}", self.app, signature),
            )
            .send()
            .await?;
        Ok(resp)
    }
}

#[async_trait]
impl PlanLookup for IrisClient {
    /// Only a 200 carrying a non-empty list names a real plan. Other client
    /// errors mean the plan does not resolve; server errors are `Unavailable`.
    async fn plan_exists(&self, name: &str) -> AppResult<bool> {
        let resp = self.get(self.plans_url(name)?).await?;
        let status = resp.status();
        if status.is_server_error() {
            tracing::warn!(plan = %name, status = %status, "iris plan lookup failed");
            return Err(AppError::Unavailable(format!(
                "iris returned {status} for plan lookup"
            )));
        }
        if status != StatusCode::OK {
            tracing::info!(plan = %name, status = %status, "iris did not resolve plan");
            return Ok(false);
        }
        let body: Value = resp.json().await?;
        Ok(body.as_array().is_some_and(|plans| !plans.is_empty()))
    }
}

/// Signature for one request: url-safe base64 of
/// HMAC-SHA512(key, "{window} {method} {path} {body}").
pub fn sign(key: &str, window: i64, method: &Method, path: &str, body: &str) -> AppResult<String> {
    let mut mac = HmacSha512::new_from_slice(key.as_bytes())
        .map_err(|_| AppError::Internal("HMAC key error".into()))?;
    mac.update(format!("{window} {method} {path} {body}").as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}
