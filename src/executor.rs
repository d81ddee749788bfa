//! Tag execution: template rendering plus HTTP dispatch.
//!
//! The [`TagExecutor`] renders a tag's payload template by substituting
//! resolved variable values, then performs the tag's network action:
//!
//! - `http_webhook`: JSON request to the tag endpoint, method defaulting to
//!   POST, tag headers merged over `content-type: application/json`.
//! - `pixel`: the rendered query template is appended to the endpoint's query
//!   string and fetched with GET.
//! - `ga4` / `queue`: recognized but skipped without I/O.
//!
//! Rendering always works on a deep clone; the ruleset's template objects are
//! never mutated. When a binding's `targetPath` matches several nodes, every
//! matched node receives the resolved value.
//!
//! Dispatch carries a per-request timeout because tag endpoints are untrusted
//! third parties. There are no retries and response bodies are not
//! interpreted; the outcome only reflects the transport success flag and
//! status code.

use crate::ruleset::{Method, Tag, TagType, VariableBinding};
use crate::variables::{ResolveError, ResolverRegistry, RuntimeContext, VariableContext};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default per-tag dispatch timeout.
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while executing a single tag.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A binding referenced a resolver type that is not registered and the
    /// executor is configured to fail on that.
    #[error("no resolver registered for variable type '{type_name}'")]
    UnknownResolver { type_name: String },

    /// An executable tag has no endpoint configured.
    #[error("tag '{tag_id}' has no endpoint")]
    MissingEndpoint { tag_id: String },

    /// The tag endpoint is not a valid URL.
    #[error("tag endpoint '{endpoint}' is invalid: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A binding's target path could not be parsed.
    #[error("invalid targetPath '{path}': {source}")]
    BadTargetPath {
        path: String,
        #[source]
        source: crate::path::PathError,
    },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header '{name}'")]
    BadHeader { name: String },

    /// A resolver rejected its configuration.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// HTTP transport failure during dispatch.
    #[error("dispatch failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// What happened to one tag.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TagOutcome {
    /// The network call completed; `ok` reflects a 2xx status.
    Dispatched { ok: bool, status: u16 },

    /// Tag type not executable in this engine; no I/O performed.
    Skipped,

    /// Execution failed; produced by the engine's per-tag failure boundary.
    Failed { error: String },
}

/// Policy for bindings whose resolver type is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingResolverPolicy {
    /// Leave the template's original placeholder untouched.
    #[default]
    Skip,
    /// Fail the whole tag.
    Fail,
}

/// Execution options shared by every tag in a run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub on_missing_resolver: MissingResolverPolicy,
    pub dispatch_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            on_missing_resolver: MissingResolverPolicy::Skip,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

/// Renders tag templates and dispatches their network actions.
///
/// Holds a shared HTTP client (connection pooling) and the resolver registry;
/// cheap to share behind an `Arc` across concurrent runs.
pub struct TagExecutor {
    http: Client,
    registry: Arc<ResolverRegistry>,
    options: ExecutorOptions,
}

impl TagExecutor {
    pub fn new(registry: Arc<ResolverRegistry>) -> Self {
        Self {
            http: Client::new(),
            registry,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    /// Execute one tag against an event payload.
    pub async fn execute(
        &self,
        tag: &Tag,
        event: &Value,
        runtime: &RuntimeContext,
    ) -> Result<TagOutcome, ExecuteError> {
        let ctx = VariableContext { event, runtime };

        match tag.tag_type {
            TagType::HttpWebhook => {
                let endpoint = require_endpoint(tag)?;
                let empty = Value::Object(Map::new());
                let template = tag.body_template.as_ref().unwrap_or(&empty);
                let body = self
                    .render_template(template, &tag.variable_bindings, &ctx)
                    .await?;
                self.dispatch_webhook(tag, endpoint, &body).await
            }
            TagType::Pixel => {
                let endpoint = require_endpoint(tag)?;
                let empty = Value::Object(Map::new());
                let template = tag.query_params_template.as_ref().unwrap_or(&empty);
                let params = self
                    .render_template(template, &tag.variable_bindings, &ctx)
                    .await?;
                let url = build_pixel_url(endpoint, &params)?;
                self.dispatch_pixel(tag, url).await
            }
            TagType::Ga4 | TagType::Queue => {
                debug!(
                    tag_id = %tag.tag_id,
                    tag_type = ?tag.tag_type,
                    "Tag type not executable, skipping"
                );
                Ok(TagOutcome::Skipped)
            }
        }
    }

    /// Render a payload template by applying every variable binding.
    ///
    /// Works on a clone; the input template is never mutated. Bindings apply
    /// sequentially, so a later binding sees the substitutions of earlier
    /// ones.
    pub async fn render_template(
        &self,
        template: &Value,
        bindings: &[VariableBinding],
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ExecuteError> {
        let mut rendered = template.clone();

        for binding in bindings {
            let type_name = &binding.variable.type_name;
            let resolver = match self.registry.lookup(type_name) {
                Some(resolver) => resolver,
                None => match self.options.on_missing_resolver {
                    MissingResolverPolicy::Skip => {
                        warn!(
                            resolver = %type_name,
                            target_path = %binding.target_path,
                            "Unknown resolver type, leaving placeholder untouched"
                        );
                        continue;
                    }
                    MissingResolverPolicy::Fail => {
                        return Err(ExecuteError::UnknownResolver {
                            type_name: type_name.clone(),
                        })
                    }
                },
            };

            let value = resolver.resolve(&binding.variable.config, ctx).await?;

            let raw_path = if binding.target_path.is_empty() {
                "$"
            } else {
                binding.target_path.as_str()
            };
            let path = crate::path::PathExpr::parse(raw_path).map_err(|source| {
                ExecuteError::BadTargetPath {
                    path: binding.target_path.clone(),
                    source,
                }
            })?;

            // Every matched node receives the value; an unmatched path is a
            // no-op for this binding.
            for pointer in path.locate(&rendered) {
                if let Some(slot) = rendered.pointer_mut(&pointer) {
                    *slot = value.clone();
                }
            }
        }

        Ok(rendered)
    }

    async fn dispatch_webhook(
        &self,
        tag: &Tag,
        endpoint: &str,
        body: &Value,
    ) -> Result<TagOutcome, ExecuteError> {
        let method = match tag.method {
            Some(Method::Get) => reqwest::Method::GET,
            _ => reqwest::Method::POST,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &tag.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ExecuteError::BadHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| ExecuteError::BadHeader { name: name.clone() })?;
            headers.insert(header_name, header_value);
        }

        debug!(
            tag_id = %tag.tag_id,
            endpoint = %endpoint,
            method = %method,
            "Dispatching webhook tag"
        );

        let response = self
            .http
            .request(method, endpoint)
            .timeout(self.options.dispatch_timeout)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        info!(
            tag_id = %tag.tag_id,
            endpoint = %endpoint,
            status = %status,
            "Webhook tag dispatched"
        );

        Ok(TagOutcome::Dispatched {
            ok: status.is_success(),
            status: status.as_u16(),
        })
    }

    async fn dispatch_pixel(&self, tag: &Tag, url: Url) -> Result<TagOutcome, ExecuteError> {
        debug!(tag_id = %tag.tag_id, url = %url, "Dispatching pixel tag");

        let response = self
            .http
            .get(url)
            .timeout(self.options.dispatch_timeout)
            .send()
            .await?;

        let status = response.status();
        info!(tag_id = %tag.tag_id, status = %status, "Pixel tag dispatched");

        Ok(TagOutcome::Dispatched {
            ok: status.is_success(),
            status: status.as_u16(),
        })
    }
}

fn require_endpoint(tag: &Tag) -> Result<&str, ExecuteError> {
    tag.endpoint
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ExecuteError::MissingEndpoint {
            tag_id: tag.tag_id.clone(),
        })
}

/// Merge every top-level key of the rendered query template into the
/// endpoint's query string, replacing a pre-existing pair of the same name.
/// Scalars are written bare; composite values as compact JSON.
fn build_pixel_url(endpoint: &str, params: &Value) -> Result<Url, ExecuteError> {
    let mut url = Url::parse(endpoint).map_err(|e| ExecuteError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(map) = params.as_object().filter(|m| !m.is_empty()) {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !map.contains_key(k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => "null".to_string(),
                composite => serde_json::to_string(composite).unwrap_or_default(),
            };
            pairs.push((key.clone(), rendered));
        }
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }

    Ok(url)
}
