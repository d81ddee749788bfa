//! Capture event model.
//!
//! Every event flowing into the engine is a validated, typed record: a set of
//! base fields shared by all kinds (account/user/session identifiers, open
//! `context`/`biz` maps) plus kind-specific fields carried by [`EventKind`],
//! an internally tagged union discriminated by the `event` field.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "event": "action_performed",
//!   "account_id": "acc_1",
//!   "session_id": "s_9f8a2bc1",
//!   "module_key": "billing",
//!   "action": "invoice.download",
//!   "latency_ms": 112,
//!   "source": "web",
//!   "biz": { "plan": "pro" }
//! }
//! ```
//!
//! Construction goes through the kind-specific builders
//! ([`Event::session_start`], [`Event::action_performed`], ...), all of which
//! run [`Event::validate`] before handing the event out, so anything
//! downstream can assume a well-formed record. The `context` and `biz` maps
//! stay open: unknown keys inside them are always accepted.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Where an event was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Web,
    Server,
    Ios,
    Android,
}

/// Severity of an error event. Defaults to `error` at the schema level, so
/// hand-built payloads get the default too, not only SDK-constructed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    #[default]
    Error,
    Fatal,
}

/// A single violated constraint: the event field path plus the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Schema validation failure listing every violated field, not just the first.
#[derive(Debug)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event failed validation: ")?;
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Base fields shared by every event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseFields {
    pub account_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_key: Option<String>,

    /// RFC 3339 timestamp; the ingestion side may fill it when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    /// Open map for arbitrary application context (screen, route, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,

    /// Open map for arbitrary business data (price, qty, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub biz: Map<String, Value>,
}

impl BaseFields {
    /// Base fields with only the mandatory account id set.
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: None,
            session_id: None,
            container_id: None,
            module_key: None,
            feature_key: None,
            timestamp: None,
            source: None,
            app_version: None,
            device: None,
            os: None,
            lang: None,
            plan: None,
            context: Map::new(),
            biz: Map::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn with_module_key(mut self, module_key: impl Into<String>) -> Self {
        self.module_key = Some(module_key.into());
        self
    }

    pub fn with_feature_key(mut self, feature_key: impl Into<String>) -> Self {
        self.feature_key = Some(feature_key.into());
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    pub fn with_context_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_biz(mut self, biz: Map<String, Value>) -> Self {
        self.biz = biz;
        self
    }
}

/// Kind-specific event fields, tagged by the `event` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SessionStart,

    SessionEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// Requires `context.screen` (validated, since `context` is an open map).
    ScreenViewStart,

    ScreenViewEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    ActionPerformed {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        object: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        object_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
    },

    Error {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_hash: Option<String>,
        #[serde(default)]
        severity: Severity,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_count: Option<u64>,
    },

    MilestoneCompleted {
        milestone: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        ttfv_seconds: Option<u64>,
    },

    PerformanceTiming {
        #[serde(skip_serializing_if = "Option::is_none")]
        lcp_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        inp_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cls: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ttfb_ms: Option<u64>,
    },
}

impl EventKind {
    /// The wire value of the `event` discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "session_start",
            EventKind::SessionEnd { .. } => "session_end",
            EventKind::ScreenViewStart => "screen_view_start",
            EventKind::ScreenViewEnd { .. } => "screen_view_end",
            EventKind::ActionPerformed { .. } => "action_performed",
            EventKind::Error { .. } => "error",
            EventKind::MilestoneCompleted { .. } => "milestone_completed",
            EventKind::PerformanceTiming { .. } => "performance_timing",
        }
    }
}

/// A validated capture event: base fields plus the kind-specific extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub base: BaseFields,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Build and validate an event from its parts.
    pub fn new(base: BaseFields, kind: EventKind) -> Result<Self, ValidationError> {
        let event = Self { base, kind };
        event.validate()?;
        Ok(event)
    }

    pub fn session_start(base: BaseFields) -> Result<Self, ValidationError> {
        Self::new(base, EventKind::SessionStart)
    }

    pub fn session_end(base: BaseFields, duration_ms: Option<u64>) -> Result<Self, ValidationError> {
        Self::new(base, EventKind::SessionEnd { duration_ms })
    }

    pub fn screen_view_start(base: BaseFields) -> Result<Self, ValidationError> {
        Self::new(base, EventKind::ScreenViewStart)
    }

    pub fn screen_view_end(base: BaseFields, duration_ms: Option<u64>) -> Result<Self, ValidationError> {
        Self::new(base, EventKind::ScreenViewEnd { duration_ms })
    }

    pub fn action_performed(
        base: BaseFields,
        action: impl Into<String>,
        object: Option<String>,
        object_id: Option<String>,
        success: Option<bool>,
        latency_ms: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Self::new(
            base,
            EventKind::ActionPerformed {
                action: action.into(),
                object,
                object_id,
                success,
                latency_ms,
            },
        )
    }

    pub fn error(
        base: BaseFields,
        code: impl Into<String>,
        severity: Severity,
        message_hash: Option<String>,
        retry_count: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Self::new(
            base,
            EventKind::Error {
                code: code.into(),
                message_hash,
                severity,
                retry_count,
            },
        )
    }

    pub fn milestone_completed(
        base: BaseFields,
        milestone: impl Into<String>,
        ttfv_seconds: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Self::new(
            base,
            EventKind::MilestoneCompleted {
                milestone: milestone.into(),
                ttfv_seconds,
            },
        )
    }

    pub fn performance_timing(
        base: BaseFields,
        lcp_ms: Option<u64>,
        inp_ms: Option<u64>,
        cls: Option<f64>,
        ttfb_ms: Option<u64>,
    ) -> Result<Self, ValidationError> {
        Self::new(
            base,
            EventKind::PerformanceTiming {
                lcp_ms,
                inp_ms,
                cls,
                ttfb_ms,
            },
        )
    }

    /// Parse a raw JSON payload into a validated event.
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        let event: Event = serde_json::from_value(value).map_err(|e| ValidationError {
            violations: vec![Violation {
                path: "$".to_string(),
                reason: e.to_string(),
            }],
        })?;
        event.validate()?;
        Ok(event)
    }

    /// The wire value of the `event` discriminator.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Serialize to the JSON shape the engine evaluates against.
    ///
    /// Serialization of an already-validated event cannot fail.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check every schema constraint, collecting all violations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if self.base.account_id.trim().is_empty() {
            violations.push(Violation {
                path: "account_id".to_string(),
                reason: "must be a non-empty string".to_string(),
            });
        }

        if let Some(ts) = &self.base.timestamp {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                violations.push(Violation {
                    path: "timestamp".to_string(),
                    reason: "must be an RFC 3339 datetime".to_string(),
                });
            }
        }

        match &self.kind {
            EventKind::ScreenViewStart | EventKind::ScreenViewEnd { .. } => {
                match self.base.context.get("screen") {
                    Some(Value::String(_)) => {}
                    Some(_) => violations.push(Violation {
                        path: "context.screen".to_string(),
                        reason: "must be a string".to_string(),
                    }),
                    None => violations.push(Violation {
                        path: "context.screen".to_string(),
                        reason: "required for screen view events".to_string(),
                    }),
                }
            }
            EventKind::ActionPerformed { action, .. } => {
                if action.trim().is_empty() {
                    violations.push(Violation {
                        path: "action".to_string(),
                        reason: "must be a non-empty string".to_string(),
                    });
                }
            }
            EventKind::Error { code, .. } => {
                if code.trim().is_empty() {
                    violations.push(Violation {
                        path: "code".to_string(),
                        reason: "must be a non-empty string".to_string(),
                    });
                }
            }
            EventKind::MilestoneCompleted { milestone, .. } => {
                if milestone.trim().is_empty() {
                    violations.push(Violation {
                        path: "milestone".to_string(),
                        reason: "must be a non-empty string".to_string(),
                    });
                }
            }
            EventKind::PerformanceTiming { cls, .. } => {
                if let Some(cls) = cls {
                    if !cls.is_finite() || *cls < 0.0 {
                        violations.push(Violation {
                            path: "cls".to_string(),
                            reason: "must be a non-negative number".to_string(),
                        });
                    }
                }
            }
            EventKind::SessionStart | EventKind::SessionEnd { .. } => {}
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> BaseFields {
        BaseFields::new("acc_1").with_source(Source::Web)
    }

    #[test]
    fn test_builders_validate() {
        let event = Event::session_start(base()).unwrap();
        assert_eq!(event.kind_name(), "session_start");
        assert_eq!(event.base.account_id, "acc_1");
    }

    #[test]
    fn test_empty_account_id_rejected() {
        let err = Event::session_start(BaseFields::new("  ")).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].path, "account_id");
    }

    #[test]
    fn test_screen_event_requires_context_screen() {
        let err = Event::screen_view_start(base()).unwrap_err();
        assert_eq!(err.violations[0].path, "context.screen");

        let ok = Event::screen_view_start(base().with_context_entry("screen", json!("Dashboard")));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_validation_collects_every_violation() {
        let err = Event::error(BaseFields::new(""), "", Severity::Warn, None, None).unwrap_err();
        let paths: Vec<&str> = err.violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["account_id", "code"]);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let mut b = base();
        b.timestamp = Some("yesterday".to_string());
        let err = Event::session_start(b).unwrap_err();
        assert_eq!(err.violations[0].path, "timestamp");
    }

    #[test]
    fn test_negative_cls_rejected() {
        let err = Event::performance_timing(base(), None, None, Some(-0.3), None).unwrap_err();
        assert_eq!(err.violations[0].path, "cls");
    }

    #[test]
    fn test_serializes_with_flat_discriminator() {
        let event = Event::action_performed(base(), "export.csv", None, None, Some(true), Some(85))
            .unwrap();
        let v = event.to_json();
        assert_eq!(v["event"], "action_performed");
        assert_eq!(v["account_id"], "acc_1");
        assert_eq!(v["action"], "export.csv");
        assert_eq!(v["latency_ms"], 85);
        assert_eq!(v["source"], "web");
        // Unset optionals stay off the wire
        assert!(v.get("user_id").is_none());
    }

    #[test]
    fn test_severity_defaults_in_schema_for_raw_payloads() {
        // Hand-built JSON without severity still parses with the default,
        // not only the SDK builder path.
        let event = Event::from_json(json!({
            "event": "error",
            "account_id": "acc_1",
            "code": "E_TIMEOUT"
        }))
        .unwrap();
        match event.kind {
            EventKind::Error { severity, .. } => assert_eq!(severity, Severity::Error),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_from_json_open_maps_accept_unknown_keys() {
        let event = Event::from_json(json!({
            "event": "milestone_completed",
            "account_id": "acc_1",
            "milestone": "first_export",
            "context": { "screen": "Settings", "experiment": "b" },
            "biz": { "seats": 12 }
        }))
        .unwrap();
        assert_eq!(event.base.biz["seats"], 12);
        assert_eq!(event.base.context["experiment"], "b");
    }

    #[test]
    fn test_from_json_rejects_unknown_kind() {
        let err = Event::from_json(json!({ "event": "made_up", "account_id": "a" }));
        assert!(err.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let event = Event::error(
            base().with_user_id("u1"),
            "E_DB",
            Severity::Fatal,
            Some("abc123".to_string()),
            Some(2),
        )
        .unwrap();
        let back = Event::from_json(event.to_json()).unwrap();
        assert_eq!(back.kind_name(), "error");
        assert_eq!(back.base.user_id.as_deref(), Some("u1"));
    }
}
