//! TagSoft Replay - Offline Engine Runner
//!
//! Loads a ruleset snapshot and a captured event from disk, runs the engine
//! once, and prints the run report as JSON. Useful for debugging container
//! versions against recorded payloads without a live ingest pipeline.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `TAGSOFT_SNAPSHOT`: Path to the container version snapshot JSON (required)
//! - `TAGSOFT_EVENT`: Path to the event payload JSON (required)
//! - `TAGSOFT_CONFIG`: Path to the TOML config file (default: "config/tagsoft.toml")
//! - `RUST_LOG`: Logging level (default: "info")

use std::env;
use std::fs;
use std::process;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use tagsoft::config::{load_snapshot, TagsoftConfig};
use tagsoft::event::Event;
use tagsoft::variables::{ResolverRegistry, RuntimeContext};
use tagsoft::{run_engine, TagExecutor};

fn required_path(var: &str) -> String {
    match env::var(var) {
        Ok(path) => path,
        Err(_) => {
            error!(var = var, "Required environment variable not set");
            process::exit(1);
        }
    }
}

fn load_event(path: &str) -> Value {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            error!(path = path, error = %e, "Failed to read event file");
            process::exit(1);
        }
    };
    let value: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            error!(path = path, error = %e, "Event file is not valid JSON");
            process::exit(1);
        }
    };

    // Validate through the typed model, but replay the raw payload as-is so
    // open context/biz fields survive untouched.
    match Event::from_json(value.clone()) {
        Ok(event) => info!(kind = event.kind_name(), "Loaded event"),
        Err(e) => warn!(error = %e, "Event failed validation, replaying anyway"),
    }
    value
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let snapshot_path = required_path("TAGSOFT_SNAPSHOT");
    let event_path = required_path("TAGSOFT_EVENT");

    let config = match TagsoftConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            process::exit(1);
        }
    };

    let snapshot = match load_snapshot(&snapshot_path) {
        Ok(s) => s,
        Err(e) => {
            error!(path = %snapshot_path, error = %e, "Failed to load snapshot");
            process::exit(1);
        }
    };

    let event = load_event(&event_path);

    let registry = Arc::new(ResolverRegistry::with_builtins());
    let executor = TagExecutor::new(registry).with_options(config.executor_options());
    let runtime = RuntimeContext::from_process_env();

    info!(version = snapshot.version, "Replaying event against snapshot");
    let report = run_engine(&event, &snapshot, &runtime, &executor).await;

    info!(
        fired_triggers = report.fired_triggers.len(),
        tags = report.tag_results.len(),
        success = report.is_success(),
        "Replay complete"
    );

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error = %e, "Failed to serialize report");
            process::exit(1);
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}
