//! # TagSoft Tag Engine
//!
//! An event-driven tag execution engine: captured events are matched against
//! a published container version, and matching tags are rendered through
//! variable resolution and dispatched over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! SDK -> Ingest API -> Engine -> Evaluator -> Executor -> HTTP endpoints
//!                                   |             |
//!                               Triggers     Variables
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Captured event model and validation
//! - [`ruleset`]: Container version snapshots (triggers, tags, bindings)
//! - [`evaluator`]: Trigger condition evaluation against event payloads
//! - [`variables`]: Variable resolver trait, registry, and builtins
//! - [`executor`]: Template rendering and per-tag dispatch
//! - [`engine`]: One-event engine run tying the above together
//! - [`path`]: The JSON path subset used by conditions and bindings
//! - [`config`]: TOML configuration with environment substitution
//! - [`signing`]: HMAC request signing for the ingest transport
//! - [`transport`]: HTTP client for the ingest API
//! - [`sdk`]: Web and server capture SDKs

pub mod config;
pub mod engine;
pub mod evaluator;
pub mod event;
pub mod executor;
pub mod path;
pub mod ruleset;
pub mod sdk;
pub mod signing;
pub mod transport;
pub mod variables;

// Re-export commonly used types at crate root
pub use config::TagsoftConfig;
pub use engine::{run_engine, Engine, EngineReport, TagResult};
pub use event::{BaseFields, Event, EventKind, Severity, Source, ValidationError};
pub use executor::{ExecutorOptions, MissingResolverPolicy, TagExecutor, TagOutcome};
pub use ruleset::{Condition, ContainerVersionSnapshot, Op, Tag, TagType, Trigger};
pub use sdk::{ServerSdk, ServerSdkOptions, WebSdk, WebSdkOptions};
pub use transport::IngestClient;
pub use variables::{ResolverRegistry, RuntimeContext, VariableContext, VariableResolver};
