//! Paystack API client.
//!
//! Covers the two calls checkout needs (initialize and verify) and webhook
//! signature verification.

pub mod types;

use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;
use thiserror::Error;

use crate::config::PaystackConfig;

use types::{ApiResponse, InitializeTransaction, InitializedTransaction, VerifiedTransaction};

type HmacSha512 = Hmac<Sha512>;

/// Request timeout for provider calls.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Errors that can occur when interacting with the Paystack API.
#[derive(Debug, Error)]
pub enum PaystackError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl PaystackError {
    /// Whether asking again later could give a different answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::Parse(_) => false,
        }
    }
}

/// Paystack API client.
#[derive(Clone)]
pub struct PaystackClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: SecretString,
}

impl PaystackClient {
    /// Create a new Paystack client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PaystackConfig) -> Result<Self, PaystackError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaystackError::Parse(format!("Invalid secret key format: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            secret_key: config.secret_key.clone(),
        })
    }

    /// Start a transaction and get the hosted checkout URL.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or is rejected.
    pub async fn initialize_transaction(
        &self,
        body: &InitializeTransaction,
    ) -> Result<InitializedTransaction, PaystackError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        Self::parse(response).await
    }

    /// Look up the outcome of a transaction.
    ///
    /// Returns the typed fields alongside the raw `data` object, which is
    /// stored with the payment attempt.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or is rejected.
    pub async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<(VerifiedTransaction, serde_json::Value), PaystackError> {
        let url = format!("{}/transaction/verify/{reference}", self.base_url);
        let response = self.client.get(&url).send().await?;
        let raw: serde_json::Value = Self::parse(response).await?;
        let typed = serde_json::from_value(raw.clone())
            .map_err(|e| PaystackError::Parse(e.to_string()))?;
        Ok((typed, raw))
    }

    /// Check an `x-paystack-signature` header against the raw body.
    #[must_use]
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_signature(self.secret_key.expose_secret().as_bytes(), body, signature)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PaystackError> {
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaystackError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| PaystackError::Parse(e.to_string()))?;

        if !envelope.status {
            return Err(PaystackError::Api {
                status: status.as_u16(),
                message: envelope.message,
            });
        }

        envelope
            .data
            .ok_or_else(|| PaystackError::Parse("response has no data".to_owned()))
    }
}

/// HMAC-SHA512 of `body` keyed with `key`, compared in constant time with
/// the hex `signature`.
#[must_use]
pub fn verify_signature(key: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(key) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::types::ChargeOutcome;
    use super::*;

    fn sign(key: &[u8], body: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(key).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"event":"charge.success","data":{"reference":"tp_1"}}"#;
        let signature = sign(b"sk_test_abc", body);
        assert!(verify_signature(b"sk_test_abc", body, &signature));
        assert!(verify_signature(b"sk_test_abc", body, &signature.to_uppercase()));
    }

    #[test]
    fn test_tampered_body_or_wrong_key() {
        let body = br#"{"event":"charge.success"}"#;
        let signature = sign(b"sk_test_abc", body);
        assert!(!verify_signature(b"sk_test_abc", br#"{"event":"charge.failed"}"#, &signature));
        assert!(!verify_signature(b"sk_test_xyz", body, &signature));
    }

    #[test]
    fn test_malformed_signature() {
        assert!(!verify_signature(b"key", b"body", "not hex"));
        assert!(!verify_signature(b"key", b"body", ""));
    }

    #[test]
    fn test_transient_errors() {
        let server = PaystackError::Api { status: 503, message: String::new() };
        let declined = PaystackError::Api { status: 400, message: String::new() };
        assert!(server.is_transient());
        assert!(!declined.is_transient());
        assert!(!PaystackError::Parse("bad".to_owned()).is_transient());
    }

    #[test]
    fn test_verified_transaction_parses() {
        let raw = serde_json::json!({
            "status": "success",
            "reference": "tp_abc",
            "amount": 250_000,
            "currency": "NGN",
            "gateway_response": "Successful",
            "metadata": {"cart_id": "x"}
        });
        let tx: VerifiedTransaction = serde_json::from_value(raw).unwrap();
        assert!(tx.is_success());
        assert_eq!(tx.amount, 250_000);
    }

    #[test]
    fn test_only_failed_and_reversed_are_final() {
        let with_status = |status: &str| VerifiedTransaction {
            status: status.to_owned(),
            reference: "tp_abc".to_owned(),
            amount: 250_000,
            currency: "NGN".to_owned(),
            gateway_response: None,
        };

        assert_eq!(with_status("success").outcome(), ChargeOutcome::Charged);
        assert_eq!(with_status("failed").outcome(), ChargeOutcome::Declined);
        assert_eq!(with_status("reversed").outcome(), ChargeOutcome::Declined);
        for open in ["abandoned", "ongoing", "pending", "processing", "queued"] {
            assert_eq!(with_status(open).outcome(), ChargeOutcome::Open, "{open}");
        }
    }
}
