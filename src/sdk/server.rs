//! Server capture SDK.
//!
//! One `track` primitive: the caller supplies the kind-specific fields as a
//! JSON object, the SDK merges its own base fields underneath (the caller's
//! fields win), parses the result into a validated [`Event`], and ships it.
//! With an `hmac_secret` configured every request is signed (see
//! [`crate::signing`]).

use crate::event::{Event, Source};
use crate::transport::{IngestClient, IngestError};
use serde_json::{json, Map, Value};
use tracing::debug;

/// Construction options for [`ServerSdk`].
#[derive(Debug, Clone)]
pub struct ServerSdkOptions {
    pub api_url: String,
    pub api_key: String,
    pub account_id: String,
    pub container_id: Option<String>,
    pub app_version: Option<String>,
    /// When set, every ingest request is HMAC-signed.
    pub hmac_secret: Option<String>,
}

/// Server-side capture client.
pub struct ServerSdk {
    client: IngestClient,
    account_id: String,
    container_id: Option<String>,
    app_version: Option<String>,
    hmac_secret: Option<String>,
}

impl ServerSdk {
    pub fn new(opts: ServerSdkOptions) -> Self {
        Self {
            client: IngestClient::new(opts.api_url, opts.api_key),
            account_id: opts.account_id,
            container_id: opts.container_id,
            app_version: opts.app_version,
            hmac_secret: opts.hmac_secret,
        }
    }

    /// Track one event. `fields` must contain the `event` discriminator and
    /// any kind-specific fields; SDK defaults fill in underneath.
    pub async fn track(&self, fields: Value) -> Result<Value, IngestError> {
        let merged = self.merged_payload(fields);
        let event = Event::from_json(Value::Object(merged))?;
        debug!(
            kind = event.kind_name(),
            signed = self.hmac_secret.is_some(),
            "Tracking server event"
        );

        match &self.hmac_secret {
            Some(secret) => self.client.send_signed(&event, secret).await,
            None => self.client.send(&event).await,
        }
    }

    /// SDK base fields merged under the caller's fields; the caller wins on
    /// conflicts.
    fn merged_payload(&self, fields: Value) -> Map<String, Value> {
        let mut merged = Map::new();
        merged.insert("account_id".to_string(), json!(self.account_id));
        if let Some(container_id) = &self.container_id {
            merged.insert("container_id".to_string(), json!(container_id));
        }
        merged.insert("source".to_string(), json!(Source::Server));
        if let Some(app_version) = &self.app_version {
            merged.insert("app_version".to_string(), json!(app_version));
        }

        if let Some(caller) = fields.as_object() {
            for (key, value) in caller {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(server: &MockServer, secret: Option<&str>) -> ServerSdkOptions {
        ServerSdkOptions {
            api_url: server.uri(),
            api_key: "k1".to_string(),
            account_id: "acc1".to_string(),
            container_id: Some("ctr1".to_string()),
            app_version: Some("2.0.0".to_string()),
            hmac_secret: secret.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn test_track_merges_base_under_caller_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/ingest"))
            .and(body_partial_json(json!({
                "event": "milestone_completed",
                "milestone": "first_export",
                "account_id": "acc1",
                "container_id": "ctr1",
                "source": "server",
                "app_version": "2.0.0"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sdk = ServerSdk::new(options(&server, None));
        sdk.track(json!({
            "event": "milestone_completed",
            "milestone": "first_export"
        }))
        .await
        .unwrap();
    }

    #[test]
    fn test_caller_fields_override_defaults() {
        let sdk = ServerSdk::new(ServerSdkOptions {
            api_url: "http://127.0.0.1:1".to_string(),
            api_key: "k".to_string(),
            account_id: "acc1".to_string(),
            container_id: None,
            app_version: None,
            hmac_secret: None,
        });
        let merged = sdk.merged_payload(json!({
            "event": "session_start",
            "account_id": "acc_override"
        }));
        assert_eq!(merged["account_id"], "acc_override");
        assert_eq!(merged["source"], "server");
    }

    #[tokio::test]
    async fn test_track_with_secret_signs_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("x-ts-timestamp"))
            .and(header_exists("x-ts-nonce"))
            .and(header_exists("x-ts-signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sdk = ServerSdk::new(options(&server, Some("secret")));
        sdk.track(json!({ "event": "session_start" })).await.unwrap();
    }

    #[tokio::test]
    async fn test_track_rejects_invalid_payload_before_network() {
        let sdk = ServerSdk::new(ServerSdkOptions {
            api_url: "http://127.0.0.1:1".to_string(),
            api_key: "k".to_string(),
            account_id: "acc1".to_string(),
            container_id: None,
            app_version: None,
            hmac_secret: None,
        });
        let err = sdk.track(json!({ "event": "made_up" })).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
