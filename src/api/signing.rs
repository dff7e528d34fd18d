//! Request signing
//! HMAC-SHA256 over the sorted query string plus timestamp and recvWindow

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::Path;

use crate::api::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// API credentials read from local secret files
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"******")
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Load key and secret from two files, trimming surrounding whitespace
    pub fn from_files<P: AsRef<Path>>(key_path: P, secret_path: P) -> Result<Self, ApiError> {
        let api_key = read_secret(key_path.as_ref())?;
        let api_secret = read_secret(secret_path.as_ref())?;
        Ok(Self { api_key, api_secret })
    }

    pub fn signer(&self) -> RequestSigner {
        RequestSigner {
            secret: self.api_secret.clone(),
        }
    }
}

fn read_secret(path: &Path) -> Result<String, ApiError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ApiError::Credentials(format!("cannot read {}: {}", path.display(), e))
    })?;
    let value = content.trim().to_string();
    if value.is_empty() {
        return Err(ApiError::Credentials(format!("{} is empty", path.display())));
    }
    Ok(value)
}

fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{}****", prefix)
}

/// Signs query strings with the account secret
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl RequestSigner {
    /// Hex encoded HMAC-SHA256 of `payload`
    pub fn sign(&self, payload: &str) -> Result<String, ApiError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ApiError::Credentials(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Build the signed query: sorted params, then timestamp and recvWindow,
    /// then `signature`
    pub fn signed_query(
        &self,
        params: &[(String, String)],
        timestamp_ms: i64,
        recv_window_ms: u64,
    ) -> Result<String, ApiError> {
        let mut payload = canonical_query(params);
        if !payload.is_empty() {
            payload.push('&');
        }
        payload.push_str(&format!(
            "timestamp={}&recvWindow={}",
            timestamp_ms, recv_window_ms
        ));
        let signature = self.sign(&payload)?;
        Ok(format!("{}&signature={}", payload, signature))
    }
}

/// Parameters sorted by key and joined as `k=v&k=v`
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
