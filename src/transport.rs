//! HTTP transport to the TagSoft ingest API.
//!
//! The [`IngestClient`] ships validated capture events to
//! `POST {api_url}/v1/ingest` with the API key header, optionally HMAC-signed
//! (see [`crate::signing`]). Non-2xx responses surface as
//! [`IngestError::Status`] carrying the status code and raw body; a 2xx
//! response with an empty or non-JSON body is treated as `{}`.
//!
//! At-most-once delivery: the transport never retries.

use crate::event::{Event, ValidationError};
use crate::signing::{self, SigningError};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the ingest transport.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The event failed schema validation before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Signing was requested but could not be performed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The event could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Transport-level failure (connect, timeout, ...).
    #[error("ingest request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The ingest endpoint answered with a non-2xx status.
    #[error("ingest rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Client for the ingest endpoint.
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: Client,
    api_url: String,
    api_key: String,
}

impl IngestClient {
    /// Trailing slashes on `api_url` are trimmed, so both
    /// `https://collect.tagsoft.io` and `https://collect.tagsoft.io/` work.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn ingest_url(&self) -> String {
        format!("{}/v1/ingest", self.api_url)
    }

    /// Validate and send one event.
    pub async fn send(&self, event: &Event) -> Result<Value, IngestError> {
        event.validate()?;
        let payload = serde_json::to_string(event)?;
        self.post(&payload, None).await
    }

    /// Validate, sign, and send one event.
    ///
    /// The signature covers the exact payload bytes that go on the wire.
    pub async fn send_signed(&self, event: &Event, secret: &str) -> Result<Value, IngestError> {
        event.validate()?;
        let payload = serde_json::to_string(event)?;
        let sig = signing::sign_now(secret, &payload)?;
        self.post(&payload, Some(sig)).await
    }

    async fn post(
        &self,
        payload: &str,
        signature: Option<signing::Signature>,
    ) -> Result<Value, IngestError> {
        let url = self.ingest_url();
        debug!(url = %url, signed = signature.is_some(), "Sending capture event");

        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .body(payload.to_string());

        if let Some(sig) = signature {
            request = request
                .header("x-ts-timestamp", sig.timestamp)
                .header("x-ts-nonce", sig.nonce)
                .header("x-ts-signature", sig.signature);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, "Ingest rejected event");
            return Err(IngestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await.unwrap_or_else(|_| json!({})))
    }
}
