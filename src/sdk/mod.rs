//! Capture SDKs.
//!
//! Thin clients that build typed events with SDK-level defaults and ship
//! them to the ingest endpoint:
//!
//! - [`WebSdk`]: session-stateful helper for browser-like callers
//!   (`start_session`, `screen_start`, `track_action`, ...).
//! - [`ServerSdk`]: a single `track` primitive for backend callers, with
//!   optional HMAC-signed ingest.

pub mod server;
pub mod web;

pub use server::{ServerSdk, ServerSdkOptions};
pub use web::{ActionParams, ErrorParams, PerformanceParams, WebSdk, WebSdkOptions};
