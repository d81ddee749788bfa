//! Engine orchestration - evaluate triggers, select tags, execute.
//!
//! One [`run_engine`] call processes a single event against one immutable
//! ruleset snapshot:
//!
//! ```text
//! Event + Snapshot
//!     │
//!     ▼
//! ┌──────────────────────────────────────────┐
//! │ 1. evaluate every trigger  → fired ids   │
//! │ 2. select tags whose trigger_ids         │
//! │    intersect the fired set (once each)   │
//! │ 3. execute selected tags sequentially,   │
//! │    isolating failures per tag            │
//! └──────────────────────────────────────────┘
//!     │
//!     ▼
//! EngineReport { fired_triggers, tag_results }
//! ```
//!
//! A failing tag never aborts its siblings: execution errors are folded into
//! that tag's result as [`TagOutcome::Failed`] and the loop continues. Tag
//! results keep the snapshot's tag order. Runs are independent; concurrent
//! runs for different events share nothing but the read-only registry.

use crate::evaluator::evaluate_trigger;
use crate::event::Event;
use crate::executor::{TagExecutor, TagOutcome};
use crate::ruleset::{ContainerVersionSnapshot, Tag};
use crate::variables::RuntimeContext;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// The outcome of one selected tag.
#[derive(Debug, Clone, Serialize)]
pub struct TagResult {
    pub tag_id: String,
    #[serde(flatten)]
    pub outcome: TagOutcome,
}

/// The report of one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    /// Fired trigger ids, deduplicated, in snapshot order.
    pub fired_triggers: Vec<String>,
    /// One result per selected tag, in snapshot tag order.
    pub tag_results: Vec<TagResult>,
}

impl EngineReport {
    /// True when no selected tag failed.
    pub fn is_success(&self) -> bool {
        !self
            .tag_results
            .iter()
            .any(|r| matches!(r.outcome, TagOutcome::Failed { .. }))
    }
}

/// Run one event through a ruleset snapshot.
pub async fn run_engine(
    event: &Value,
    snapshot: &ContainerVersionSnapshot,
    runtime: &RuntimeContext,
    executor: &TagExecutor,
) -> EngineReport {
    let fired = fired_triggers(snapshot, event);
    let fired_set: HashSet<&str> = fired.iter().map(String::as_str).collect();
    let selected = select_tags(&snapshot.tags, &fired_set);

    debug!(
        version = snapshot.version,
        fired = fired.len(),
        selected = selected.len(),
        "Evaluated snapshot"
    );

    let mut tag_results = Vec::with_capacity(selected.len());
    for tag in selected {
        let outcome = match executor.execute(tag, event, runtime).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    tag_id = %tag.tag_id,
                    error = %e,
                    "Tag execution failed, continuing with remaining tags"
                );
                TagOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        tag_results.push(TagResult {
            tag_id: tag.tag_id.clone(),
            outcome,
        });
    }

    info!(
        version = snapshot.version,
        fired_triggers = fired.len(),
        tags_executed = tag_results.len(),
        "Engine run complete"
    );

    EngineReport {
        fired_triggers: fired,
        tag_results,
    }
}

/// Fired trigger ids, deduplicated, preserving snapshot order.
fn fired_triggers(snapshot: &ContainerVersionSnapshot, event: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    snapshot
        .triggers
        .iter()
        .filter(|t| evaluate_trigger(t, event))
        .filter(|t| seen.insert(t.trigger_id.clone()))
        .map(|t| t.trigger_id.clone())
        .collect()
}

/// Tags whose `trigger_ids` intersect the fired set, each at most once, in
/// snapshot order.
fn select_tags<'a>(tags: &'a [Tag], fired: &HashSet<&str>) -> Vec<&'a Tag> {
    tags.iter()
        .filter(|tag| tag.trigger_ids.iter().any(|id| fired.contains(id.as_str())))
        .collect()
}

/// A reusable engine: executor plus registry, ready for repeated runs.
pub struct Engine {
    executor: TagExecutor,
}

impl Engine {
    pub fn new(executor: TagExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &TagExecutor {
        &self.executor
    }

    /// Run a raw JSON event payload through a snapshot.
    pub async fn run(
        &self,
        event: &Value,
        snapshot: &ContainerVersionSnapshot,
        runtime: &RuntimeContext,
    ) -> EngineReport {
        run_engine(event, snapshot, runtime, &self.executor).await
    }

    /// Run a validated capture event through a snapshot.
    pub async fn run_event(
        &self,
        event: &Event,
        snapshot: &ContainerVersionSnapshot,
        runtime: &RuntimeContext,
    ) -> EngineReport {
        self.run(&event.to_json(), snapshot, runtime).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruleset::{Condition, Op, TagType, Trigger, VariableBinding, VariableSpec};
    use crate::variables::ResolverRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor() -> TagExecutor {
        TagExecutor::new(Arc::new(ResolverRegistry::with_builtins()))
    }

    fn trigger(id: &str, conditions: Vec<Condition>) -> Trigger {
        Trigger {
            trigger_id: id.to_string(),
            name: id.to_string(),
            conditions,
        }
    }

    fn eq_condition(field: &str, value: Value) -> Condition {
        Condition {
            field: field.to_string(),
            op: Op::Eq,
            value,
        }
    }

    fn skipped_tag(id: &str, trigger_ids: &[&str]) -> Tag {
        Tag {
            tag_id: id.to_string(),
            tag_type: TagType::Queue,
            endpoint: None,
            method: None,
            headers: Default::default(),
            body_template: None,
            query_params_template: None,
            variable_bindings: vec![],
            trigger_ids: trigger_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_full_run_fires_trigger_and_dispatches_tag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({ "uid": 42 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger(
                "T1",
                vec![eq_condition("$.event", json!("page_view"))],
            )],
            tags: vec![Tag {
                tag_id: "TG1".to_string(),
                tag_type: TagType::HttpWebhook,
                endpoint: Some(format!("{}/hook", server.uri())),
                method: None,
                headers: Default::default(),
                body_template: Some(json!({ "uid": null })),
                query_params_template: None,
                variable_bindings: vec![VariableBinding {
                    target_path: "$.uid".to_string(),
                    variable: VariableSpec {
                        type_name: "jsonpath".to_string(),
                        config: json!({ "expr": "$.user.id" }),
                    },
                }],
                trigger_ids: vec!["T1".to_string()],
            }],
        };

        let event = json!({ "event": "page_view", "account_id": "acc1", "user": { "id": 42 } });
        let report = run_engine(&event, &snapshot, &RuntimeContext::new(), &executor()).await;

        assert_eq!(report.fired_triggers, vec!["T1"]);
        assert_eq!(report.tag_results.len(), 1);
        assert!(matches!(
            report.tag_results[0].outcome,
            TagOutcome::Dispatched { ok: true, status: 200 }
        ));
    }

    #[tokio::test]
    async fn test_tag_selected_once_even_when_multiple_triggers_fire() {
        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger("T1", vec![]), trigger("T2", vec![])],
            tags: vec![skipped_tag("TG1", &["T1", "T2"])],
        };

        let report = run_engine(&json!({}), &snapshot, &RuntimeContext::new(), &executor()).await;

        assert_eq!(report.fired_triggers, vec!["T1", "T2"]);
        assert_eq!(report.tag_results.len(), 1);
        assert_eq!(report.tag_results[0].tag_id, "TG1");
    }

    #[tokio::test]
    async fn test_unmatched_tags_not_selected() {
        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger(
                "T1",
                vec![eq_condition("$.event", json!("purchase"))],
            )],
            tags: vec![skipped_tag("TG1", &["T1"]), skipped_tag("TG2", &[])],
        };

        let event = json!({ "event": "page_view" });
        let report = run_engine(&event, &snapshot, &RuntimeContext::new(), &executor()).await;

        assert!(report.fired_triggers.is_empty());
        assert!(report.tag_results.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_trigger_ids_deduplicated() {
        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger("T1", vec![]), trigger("T1", vec![])],
            tags: vec![],
        };

        let report = run_engine(&json!({}), &snapshot, &RuntimeContext::new(), &executor()).await;
        assert_eq!(report.fired_triggers, vec!["T1"]);
    }

    #[tokio::test]
    async fn test_failing_tag_does_not_abort_siblings() {
        // First tag has an unparseable endpoint and fails before any I/O;
        // the second must still execute and report.
        let bad = Tag {
            tag_id: "BAD".to_string(),
            tag_type: TagType::Pixel,
            endpoint: Some("not a url".to_string()),
            method: None,
            headers: Default::default(),
            body_template: None,
            query_params_template: None,
            variable_bindings: vec![],
            trigger_ids: vec!["T1".to_string()],
        };

        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger("T1", vec![])],
            tags: vec![bad, skipped_tag("GOOD", &["T1"])],
        };

        let report = run_engine(&json!({}), &snapshot, &RuntimeContext::new(), &executor()).await;

        assert_eq!(report.tag_results.len(), 2);
        assert!(matches!(report.tag_results[0].outcome, TagOutcome::Failed { .. }));
        assert!(matches!(report.tag_results[1].outcome, TagOutcome::Skipped));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_results_preserve_snapshot_tag_order() {
        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger("T1", vec![])],
            tags: vec![
                skipped_tag("C", &["T1"]),
                skipped_tag("A", &["T1"]),
                skipped_tag("B", &["T1"]),
            ],
        };

        let report = run_engine(&json!({}), &snapshot, &RuntimeContext::new(), &executor()).await;
        let ids: Vec<&str> = report.tag_results.iter().map(|r| r.tag_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_engine_run_event_uses_validated_event() {
        use crate::event::{BaseFields, Event};

        let snapshot = ContainerVersionSnapshot {
            version: 1,
            triggers: vec![trigger(
                "T1",
                vec![eq_condition("$.event", json!("session_start"))],
            )],
            tags: vec![skipped_tag("TG1", &["T1"])],
        };

        let event = Event::session_start(BaseFields::new("acc1")).unwrap();
        let engine = Engine::new(executor());
        let report = engine
            .run_event(&event, &snapshot, &RuntimeContext::new())
            .await;
        assert_eq!(report.fired_triggers, vec!["T1"]);
    }
}
