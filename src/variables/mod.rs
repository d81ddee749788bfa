//! Variable resolution for tag payload templates.
//!
//! A variable resolver is a named value-producing function: given its
//! configuration object and the evaluation context (event + runtime), it
//! computes the value substituted into a tag template. The
//! [`VariableResolver`] trait defines the interface; the
//! [`ResolverRegistry`] holds resolvers keyed by their type name.
//!
//! The registry is an explicit value passed to the executor rather than
//! process-global state: construct one with [`ResolverRegistry::with_builtins`]
//! at startup, extend it with [`ResolverRegistry::register`], and share it
//! behind an `Arc`. Concurrent evaluations read it freely; registration
//! happens before the registry is shared.
//!
//! ## Builtins
//!
//! | type         | config                         | behavior                                  |
//! |--------------|--------------------------------|-------------------------------------------|
//! | constant     | `{value}`                      | returns `value` verbatim                  |
//! | contextField | `{path}`                       | dot-walks into the event                  |
//! | jsonpath     | `{expr}`                       | path query; first match or full array     |
//! | envVar       | `{name, fallback?}`            | runtime env lookup                        |
//! | now          | `{format?: "iso"\|"epoch"}`    | runtime clock instant                     |
//! | math         | `{op, a, b}`                   | arithmetic over literals or path operands |
//! | lookupTable  | `{keyPath, table, default?}`   | key query mapped through a table          |
//!
//! ## Custom resolvers
//!
//! ```rust,ignore
//! use tagsoft::variables::{ResolverRegistry, VariableResolver, VariableContext, ResolveError};
//! use async_trait::async_trait;
//! use serde_json::Value;
//!
//! struct GeoIp;
//!
//! #[async_trait]
//! impl VariableResolver for GeoIp {
//!     fn type_name(&self) -> &str {
//!         "geoip"
//!     }
//!
//!     async fn resolve(&self, config: &Value, ctx: &VariableContext<'_>)
//!         -> Result<Value, ResolveError> {
//!         // Your lookup here
//!         Ok(Value::Null)
//!     }
//! }
//!
//! let mut registry = ResolverRegistry::with_builtins();
//! registry.register(std::sync::Arc::new(GeoIp));
//! ```

pub mod builtins;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors a resolver may raise about its own configuration.
///
/// Data-shaped problems (missing event fields, unmatched paths) never error;
/// they resolve to `null`. Only a config the resolver cannot interpret at all
/// is reported.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid config for resolver '{resolver}': {reason}")]
    InvalidConfig { resolver: String, reason: String },
}

/// Runtime inputs threaded through every resolution: the evaluation clock and
/// an injected environment snapshot (never read ambiently, for testability).
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub now: DateTime<Utc>,
    pub env: HashMap<String, String>,
}

impl RuntimeContext {
    /// Current wall clock, empty environment.
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            env: HashMap::new(),
        }
    }

    /// Current wall clock, environment snapshotted from the process.
    pub fn from_process_env() -> Self {
        Self {
            now: Utc::now(),
            env: std::env::vars().collect(),
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The context a resolver computes against: the event payload plus runtime.
pub struct VariableContext<'a> {
    pub event: &'a Value,
    pub runtime: &'a RuntimeContext,
}

/// A named value-producing function for template bindings.
///
/// Resolvers must be `Send + Sync`; they are shared across concurrent
/// evaluations behind an `Arc`.
#[async_trait]
pub trait VariableResolver: Send + Sync {
    /// Unique type key this resolver registers under (e.g. `"constant"`).
    fn type_name(&self) -> &str;

    /// Compute the value for one binding.
    async fn resolve(&self, config: &Value, ctx: &VariableContext<'_>)
        -> Result<Value, ResolveError>;
}

/// Lookup of resolvers by type name.
///
/// Last registration wins for a given type, which is how host applications
/// override a builtin.
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn VariableResolver>>,
}

impl ResolverRegistry {
    /// An empty registry (mostly useful in tests).
    pub fn new() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// A registry pre-populated with the seven builtin resolvers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for resolver in builtins::all() {
            registry.register(resolver);
        }
        registry
    }

    /// Insert a resolver, replacing any previous one of the same type.
    pub fn register(&mut self, resolver: Arc<dyn VariableResolver>) {
        let type_name = resolver.type_name().to_string();
        debug!(resolver = %type_name, "Registering variable resolver");
        self.resolvers.insert(type_name, resolver);
    }

    /// Look up a resolver by its type name.
    pub fn lookup(&self, type_name: &str) -> Option<&Arc<dyn VariableResolver>> {
        self.resolvers.get(type_name)
    }

    /// All registered type names.
    pub fn type_names(&self) -> Vec<&str> {
        self.resolvers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
