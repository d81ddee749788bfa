//! Ruleset types: triggers, tags, variable bindings, snapshots.
//!
//! A [`ContainerVersionSnapshot`] is the immutable, versioned view of one
//! container's ruleset used for a single evaluation pass. Snapshots come from
//! an external configuration store (the admin surface publishes them); the
//! engine only ever borrows them and never mutates them.
//!
//! Field casing mirrors the stored container JSON: snake_case for ids and
//! trigger fields, camelCase for the tag template/binding keys
//! (`bodyTemplate`, `targetPath`, ...).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Comparison operator of a trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Neq,
    Contains,
    Gte,
    Lte,
    In,
}

/// One field comparison inside a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Path into the event, e.g. `$.event` or `$.biz.value`.
    pub field: String,
    pub op: Op,
    pub value: Value,
}

/// A named predicate over an event: the conjunction of its conditions.
///
/// An empty condition list always matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_id: String,
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// The dispatch mechanism of a tag.
///
/// Only `http_webhook` and `pixel` are executable; `ga4` and `queue` are
/// recognized in stored rulesets but skipped at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    HttpWebhook,
    Pixel,
    Ga4,
    Queue,
}

/// HTTP method a webhook tag may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// A named value source for one template location: resolver type plus its
/// configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
}

/// Maps a location inside a tag's payload template to a resolved value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableBinding {
    /// Path into the tag's template, e.g. `$.customer.id`.
    #[serde(rename = "targetPath")]
    pub target_path: String,
    pub variable: VariableSpec,
}

/// A configured outbound action associated with one or more triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: String,

    #[serde(rename = "type")]
    pub tag_type: TagType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Defaults to POST for webhooks when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(rename = "bodyTemplate", skip_serializing_if = "Option::is_none")]
    pub body_template: Option<Value>,

    #[serde(rename = "queryParamsTemplate", skip_serializing_if = "Option::is_none")]
    pub query_params_template: Option<Value>,

    #[serde(rename = "variableBindings", default, skip_serializing_if = "Vec::is_empty")]
    pub variable_bindings: Vec<VariableBinding>,

    #[serde(default)]
    pub trigger_ids: Vec<String>,
}

/// An immutable, versioned bundle of triggers and tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerVersionSnapshot {
    pub version: u64,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}
