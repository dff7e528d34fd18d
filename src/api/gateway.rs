//! Signed REST gateway
//! Rotates through mirror hosts, retrying transient failures with capped backoff

use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api::signing::{canonical_query, Credentials, RequestSigner};
use crate::api::{classify_response, describe_code, ApiError};
use crate::utils::clock::Clock;
use crate::utils::retry::{retry_with_backoff, BackoffPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Gateway settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Mirror hosts, tried in order, wrapping around
    pub hosts: Vec<String>,
    pub recv_window_ms: u64,
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["https://fapi.binance.com".to_string()],
            recv_window_ms: 5000,
            request_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Exchange REST gateway
pub struct ExchangeGateway {
    http: Client,
    config: GatewayConfig,
    api_key: String,
    signer: RequestSigner,
    clock: Arc<dyn Clock>,
    time_offset_ms: AtomicI64,
}

impl ExchangeGateway {
    /// Create new gateway with per-call timeout
    pub fn new(
        config: GatewayConfig,
        credentials: &Credentials,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ApiError> {
        if config.hosts.is_empty() {
            return Err(ApiError::Network("no exchange hosts configured".to_string()));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            api_key: credentials.api_key.clone(),
            signer: credentials.signer(),
            clock,
            time_offset_ms: AtomicI64::new(0),
        })
    }

    /// Signed call
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, ApiError> {
        self.dispatch(method, path, params, true).await
    }

    /// Unsigned call for public market data
    pub async fn call_public(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, ApiError> {
        self.dispatch(method, path, params, false).await
    }

    /// Fetch server time and store the local clock offset used for signing
    pub async fn sync_server_time(&self) -> Result<i64, ApiError> {
        let value = self.call_public(Method::Get, "/fapi/v1/time", &[]).await?;
        let server_ms = value
            .get("serverTime")
            .and_then(|t| t.as_i64())
            .ok_or_else(|| ApiError::Decode("missing serverTime".to_string()))?;
        let offset = server_ms - self.clock.now_ms();
        self.time_offset_ms.store(offset, Ordering::Relaxed);
        if offset.abs() > 1000 {
            warn!("⏱️ Local clock differs from exchange by {}ms", offset);
        } else {
            debug!("Server time offset {}ms", offset);
        }
        Ok(offset)
    }

    pub fn time_offset_ms(&self) -> i64 {
        self.time_offset_ms.load(Ordering::Relaxed)
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        signed: bool,
    ) -> Result<Value, ApiError> {
        let operation = format!("{} {}", method.as_str(), path);
        let result = retry_with_backoff(
            &operation,
            &self.config.backoff,
            self.clock.as_ref(),
            ApiError::is_retryable,
            |attempt| self.send_once(attempt, method, path, params, signed),
        )
        .await;

        if let Err(ApiError::Validation { code, message }) = &result {
            error!(
                "❌ {} rejected: code={} ({}) msg={}",
                operation,
                code,
                describe_code(*code),
                message
            );
        }
        result
    }

    async fn send_once(
        &self,
        attempt: u32,
        method: Method,
        path: &str,
        params: &[(String, String)],
        signed: bool,
    ) -> Result<Value, ApiError> {
        let host = &self.config.hosts[attempt as usize % self.config.hosts.len()];

        let query = if signed {
            let timestamp = self.clock.now_ms() + self.time_offset_ms();
            self.signer
                .signed_query(params, timestamp, self.config.recv_window_ms)?
        } else {
            canonical_query(params)
        };

        let url = if query.is_empty() {
            format!("{}{}", host, path)
        } else {
            format!("{}{}?{}", host, path, query)
        };

        if attempt > 0 {
            info!("🔁 Retrying {} {} via {}", method.as_str(), path, host);
        }

        let mut request = match method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Delete => self.http.delete(&url),
        };
        if signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(classify_response(status, &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}
