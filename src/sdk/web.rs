//! Web capture SDK.
//!
//! Keeps an in-memory session id across calls and stamps every event with
//! the SDK defaults (`account_id`, `container_id`, `source: web`,
//! `app_version`, current session). Each helper builds a validated event via
//! the schema builders and hands it to the ingest transport; validation
//! failures surface before any network call.

use crate::event::{BaseFields, Event, Severity, Source};
use crate::transport::{IngestClient, IngestError};
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

/// Construction options for [`WebSdk`].
#[derive(Debug, Clone)]
pub struct WebSdkOptions {
    pub api_url: String,
    pub api_key: String,
    pub account_id: String,
    pub container_id: Option<String>,
    pub app_version: Option<String>,
}

/// Parameters for [`WebSdk::track_action`].
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    pub action: String,
    pub module_key: Option<String>,
    pub feature_key: Option<String>,
    pub user_id: Option<String>,
    pub success: Option<bool>,
    pub latency_ms: Option<u64>,
    pub biz: Map<String, Value>,
}

impl ActionParams {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }
}

/// Parameters for [`WebSdk::error`].
#[derive(Debug, Clone, Default)]
pub struct ErrorParams {
    pub code: String,
    pub severity: Option<Severity>,
    pub message_hash: Option<String>,
    pub retry_count: Option<u64>,
    pub user_id: Option<String>,
}

impl ErrorParams {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }
}

/// Parameters for [`WebSdk::performance`].
#[derive(Debug, Clone, Default)]
pub struct PerformanceParams {
    pub lcp_ms: Option<u64>,
    pub inp_ms: Option<u64>,
    pub cls: Option<f64>,
    pub ttfb_ms: Option<u64>,
}

/// Session-stateful web capture client.
pub struct WebSdk {
    client: IngestClient,
    account_id: String,
    container_id: Option<String>,
    app_version: Option<String>,
    session_id: Option<String>,
}

impl WebSdk {
    pub fn new(opts: WebSdkOptions) -> Self {
        Self {
            client: IngestClient::new(opts.api_url, opts.api_key),
            account_id: opts.account_id,
            container_id: opts.container_id,
            app_version: opts.app_version,
            session_id: None,
        }
    }

    /// The current session id, if a session is open.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn base(&self, user_id: Option<&str>) -> BaseFields {
        let mut base = BaseFields::new(&self.account_id).with_source(Source::Web);
        if let Some(container_id) = &self.container_id {
            base = base.with_container_id(container_id);
        }
        if let Some(app_version) = &self.app_version {
            base = base.with_app_version(app_version);
        }
        if let Some(session_id) = &self.session_id {
            base = base.with_session_id(session_id);
        }
        if let Some(user_id) = user_id {
            base = base.with_user_id(user_id);
        }
        base
    }

    /// Open a new session and emit `session_start`.
    pub async fn start_session(&mut self, user_id: Option<&str>) -> Result<Value, IngestError> {
        let session_id = new_session_id();
        debug!(session_id = %session_id, "Starting web session");
        self.session_id = Some(session_id);
        let event = Event::session_start(self.base(user_id))?;
        self.client.send(&event).await
    }

    /// Emit `session_end` and close the session. Without an open session
    /// this is a no-op returning `Ok(None)`.
    pub async fn end_session(&mut self) -> Result<Option<Value>, IngestError> {
        if self.session_id.is_none() {
            return Ok(None);
        }
        let event = Event::session_end(self.base(None), None)?;
        self.session_id = None;
        Ok(Some(self.client.send(&event).await?))
    }

    pub async fn screen_start(
        &self,
        module_key: &str,
        screen: &str,
        user_id: Option<&str>,
    ) -> Result<Value, IngestError> {
        let base = self
            .base(user_id)
            .with_module_key(module_key)
            .with_context_entry("screen", json!(screen));
        let event = Event::screen_view_start(base)?;
        self.client.send(&event).await
    }

    pub async fn screen_end(
        &self,
        module_key: &str,
        screen: &str,
        duration_ms: Option<u64>,
        user_id: Option<&str>,
    ) -> Result<Value, IngestError> {
        let base = self
            .base(user_id)
            .with_module_key(module_key)
            .with_context_entry("screen", json!(screen));
        let event = Event::screen_view_end(base, duration_ms)?;
        self.client.send(&event).await
    }

    pub async fn track_action(&self, params: ActionParams) -> Result<Value, IngestError> {
        let mut base = self.base(params.user_id.as_deref()).with_biz(params.biz);
        if let Some(module_key) = params.module_key {
            base = base.with_module_key(module_key);
        }
        if let Some(feature_key) = params.feature_key {
            base = base.with_feature_key(feature_key);
        }
        let event = Event::action_performed(
            base,
            params.action,
            None,
            None,
            params.success,
            params.latency_ms,
        )?;
        self.client.send(&event).await
    }

    pub async fn error(&self, params: ErrorParams) -> Result<Value, IngestError> {
        let event = Event::error(
            self.base(params.user_id.as_deref()),
            params.code,
            params.severity.unwrap_or_default(),
            params.message_hash,
            params.retry_count,
        )?;
        self.client.send(&event).await
    }

    pub async fn performance(&self, params: PerformanceParams) -> Result<Value, IngestError> {
        let event = Event::performance_timing(
            self.base(None),
            params.lcp_ms,
            params.inp_ms,
            params.cls,
            params.ttfb_ms,
        )?;
        self.client.send(&event).await
    }
}

/// Session ids look like `s_9f8a2bc1`.
fn new_session_id() -> String {
    format!("s_{}", &Uuid::new_v4().simple().to_string()[..8])
}
