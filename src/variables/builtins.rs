//! The builtin variable resolvers.
//!
//! Each builtin degrades to `Value::Null` on missing data rather than
//! erroring; only an uninterpretable configuration raises [`ResolveError`].

use super::{ResolveError, VariableContext, VariableResolver};
use crate::path::{dot_get, PathExpr};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{json, Value};
use std::sync::Arc;

/// Every builtin, in registration order.
pub fn all() -> Vec<Arc<dyn VariableResolver>> {
    vec![
        Arc::new(ConstantVar),
        Arc::new(ContextFieldVar),
        Arc::new(JsonPathVar),
        Arc::new(EnvVar),
        Arc::new(NowVar),
        Arc::new(MathVar),
        Arc::new(LookupTableVar),
    ]
}

/// `constant`: returns `config.value` verbatim.
pub struct ConstantVar;

#[async_trait]
impl VariableResolver for ConstantVar {
    fn type_name(&self) -> &str {
        "constant"
    }

    async fn resolve(
        &self,
        config: &Value,
        _ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        Ok(config.get("value").cloned().unwrap_or(Value::Null))
    }
}

/// `contextField`: dot-walks `config.path` into the event, `null` on any
/// missing segment.
pub struct ContextFieldVar;

#[async_trait]
impl VariableResolver for ContextFieldVar {
    fn type_name(&self) -> &str {
        "contextField"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let path = config.get("path").and_then(Value::as_str).unwrap_or("");
        Ok(dot_get(ctx.event, path).cloned().unwrap_or(Value::Null))
    }
}

/// `jsonpath`: evaluates `config.expr` against the event. Single-valued
/// expressions return the first match; expressions with a wildcard return the
/// full match array.
pub struct JsonPathVar;

#[async_trait]
impl VariableResolver for JsonPathVar {
    fn type_name(&self) -> &str {
        "jsonpath"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let expr = config.get("expr").and_then(Value::as_str).unwrap_or("$");
        let path = PathExpr::parse(expr).map_err(|e| ResolveError::InvalidConfig {
            resolver: self.type_name().to_string(),
            reason: e.to_string(),
        })?;
        let matches = path.query(ctx.event);
        if path.is_multi() {
            Ok(Value::Array(matches.into_iter().cloned().collect()))
        } else {
            Ok(matches.into_iter().next().cloned().unwrap_or(Value::Null))
        }
    }
}

/// `envVar`: `runtime.env[name]`, else `config.fallback`, else `null`.
pub struct EnvVar;

#[async_trait]
impl VariableResolver for EnvVar {
    fn type_name(&self) -> &str {
        "envVar"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let name = config.get("name").and_then(Value::as_str).unwrap_or("");
        if let Some(value) = ctx.runtime.env.get(name) {
            return Ok(Value::String(value.clone()));
        }
        Ok(config.get("fallback").cloned().unwrap_or(Value::Null))
    }
}

/// `now`: the runtime clock's instant, ISO-8601 by default, unix seconds for
/// `format: "epoch"`.
pub struct NowVar;

#[async_trait]
impl VariableResolver for NowVar {
    fn type_name(&self) -> &str {
        "now"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let now = ctx.runtime.now;
        match config.get("format").and_then(Value::as_str) {
            Some("epoch") => Ok(json!(now.timestamp())),
            _ => Ok(json!(now.to_rfc3339_opts(SecondsFormat::Millis, true))),
        }
    }
}

/// `math`: arithmetic over two operands, each a numeric literal or a
/// `$.`-prefixed path query into the event. Division by zero and unknown
/// ops resolve to `null` rather than erroring.
pub struct MathVar;

impl MathVar {
    fn operand(value: Option<&Value>, event: &Value) -> f64 {
        match value {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) if s.starts_with("$.") => PathExpr::parse(s)
                .ok()
                .and_then(|p| p.query(event).into_iter().next().and_then(Value::as_f64))
                .unwrap_or(0.0),
            Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Integral results become JSON integers so `10 * 3` renders as `30`.
    fn number(result: f64) -> Value {
        if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
            json!(result as i64)
        } else {
            serde_json::Number::from_f64(result).map_or(Value::Null, Value::Number)
        }
    }
}

#[async_trait]
impl VariableResolver for MathVar {
    fn type_name(&self) -> &str {
        "math"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let a = Self::operand(config.get("a"), ctx.event);
        let b = Self::operand(config.get("b"), ctx.event);
        match config.get("op").and_then(Value::as_str) {
            Some("add") => Ok(Self::number(a + b)),
            Some("sub") => Ok(Self::number(a - b)),
            Some("mul") => Ok(Self::number(a * b)),
            Some("div") => {
                if b == 0.0 {
                    Ok(Value::Null)
                } else {
                    Ok(Self::number(a / b))
                }
            }
            // Unrecognized ops resolve to null so the tag still dispatches.
            _ => Ok(Value::Null),
        }
    }
}

/// `lookupTable`: resolves a key via `config.keyPath`, maps it through
/// `config.table`, falls back to `config.default` on a miss.
pub struct LookupTableVar;

#[async_trait]
impl VariableResolver for LookupTableVar {
    fn type_name(&self) -> &str {
        "lookupTable"
    }

    async fn resolve(
        &self,
        config: &Value,
        ctx: &VariableContext<'_>,
    ) -> Result<Value, ResolveError> {
        let key_path = config.get("keyPath").and_then(Value::as_str).unwrap_or("$");
        let path = PathExpr::parse(key_path).map_err(|e| ResolveError::InvalidConfig {
            resolver: self.type_name().to_string(),
            reason: e.to_string(),
        })?;

        let fallback = || config.get("default").cloned().unwrap_or(Value::Null);

        let key = match path.query(ctx.event).into_iter().next() {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => return Ok(fallback()),
        };

        match config.get("table").and_then(|t| t.get(&key)) {
            Some(hit) => Ok(hit.clone()),
            None => Ok(fallback()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::RuntimeContext;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn event() -> Value {
        json!({
            "event": "action_performed",
            "user": { "id": 42 },
            "biz": { "price": 10, "qty": 3, "plan": "pro" },
            "items": [ { "sku": "a" }, { "sku": "b" } ]
        })
    }

    fn runtime() -> RuntimeContext {
        RuntimeContext::new()
            .with_now(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
            .with_env(HashMap::from([(
                "REGION".to_string(),
                "eu-west-1".to_string(),
            )]))
    }

    async fn resolve(resolver: &dyn VariableResolver, config: Value) -> Value {
        let event = event();
        let runtime = runtime();
        let ctx = VariableContext {
            event: &event,
            runtime: &runtime,
        };
        resolver.resolve(&config, &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_constant() {
        assert_eq!(resolve(&ConstantVar, json!({ "value": "abc" })).await, json!("abc"));
        assert_eq!(resolve(&ConstantVar, json!({ "value": { "k": 1 } })).await, json!({ "k": 1 }));
        assert_eq!(resolve(&ConstantVar, json!({})).await, Value::Null);
    }

    #[tokio::test]
    async fn test_context_field() {
        assert_eq!(resolve(&ContextFieldVar, json!({ "path": "user.id" })).await, json!(42));
        assert_eq!(resolve(&ContextFieldVar, json!({ "path": "user.nope" })).await, Value::Null);
        assert_eq!(resolve(&ContextFieldVar, json!({})).await, Value::Null);
    }

    #[tokio::test]
    async fn test_jsonpath_first_match() {
        assert_eq!(resolve(&JsonPathVar, json!({ "expr": "$.user.id" })).await, json!(42));
        assert_eq!(resolve(&JsonPathVar, json!({ "expr": "$.missing" })).await, Value::Null);
    }

    #[tokio::test]
    async fn test_jsonpath_multi_valued_returns_array() {
        assert_eq!(
            resolve(&JsonPathVar, json!({ "expr": "$.items[*].sku" })).await,
            json!(["a", "b"])
        );
    }

    #[tokio::test]
    async fn test_env_var_with_fallback() {
        assert_eq!(resolve(&EnvVar, json!({ "name": "REGION" })).await, json!("eu-west-1"));
        assert_eq!(
            resolve(&EnvVar, json!({ "name": "MISSING", "fallback": "default" })).await,
            json!("default")
        );
        assert_eq!(resolve(&EnvVar, json!({ "name": "MISSING" })).await, Value::Null);
    }

    #[tokio::test]
    async fn test_now_formats() {
        assert_eq!(
            resolve(&NowVar, json!({})).await,
            json!("2025-06-01T12:00:00.000Z")
        );
        assert_eq!(
            resolve(&NowVar, json!({ "format": "epoch" })).await,
            json!(1748779200_i64)
        );
    }

    #[tokio::test]
    async fn test_math_literals() {
        assert_eq!(resolve(&MathVar, json!({ "op": "add", "a": 2, "b": 3 })).await, json!(5));
        assert_eq!(resolve(&MathVar, json!({ "op": "sub", "a": 2, "b": 3 })).await, json!(-1));
        assert_eq!(resolve(&MathVar, json!({ "op": "div", "a": 9, "b": 2 })).await, json!(4.5));
    }

    #[tokio::test]
    async fn test_math_div_by_zero_is_null() {
        assert_eq!(
            resolve(&MathVar, json!({ "op": "div", "a": 10, "b": 0 })).await,
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_math_path_operands() {
        // Scenario: mul over $.biz.price and $.biz.qty resolves to 30.
        assert_eq!(
            resolve(&MathVar, json!({ "op": "mul", "a": "$.biz.price", "b": "$.biz.qty" })).await,
            json!(30)
        );
        // Missing path operand computes as zero
        assert_eq!(
            resolve(&MathVar, json!({ "op": "add", "a": "$.biz.price", "b": "$.biz.nope" })).await,
            json!(10)
        );
    }

    #[tokio::test]
    async fn test_math_unknown_op_is_null() {
        assert_eq!(
            resolve(&MathVar, json!({ "op": "pow", "a": 2, "b": 3 })).await,
            Value::Null
        );
        assert_eq!(resolve(&MathVar, json!({ "a": 2, "b": 3 })).await, Value::Null);
    }

    #[tokio::test]
    async fn test_lookup_table_hit_and_miss() {
        let table = json!({
            "keyPath": "$.biz.plan",
            "table": { "pro": "tier-2", "free": "tier-0" },
            "default": "tier-unknown"
        });
        assert_eq!(resolve(&LookupTableVar, table).await, json!("tier-2"));

        let miss = json!({
            "keyPath": "$.biz.plan",
            "table": { "enterprise": "tier-3" },
            "default": "tier-unknown"
        });
        assert_eq!(resolve(&LookupTableVar, miss).await, json!("tier-unknown"));
    }

    #[tokio::test]
    async fn test_lookup_table_numeric_key_stringified() {
        let config = json!({
            "keyPath": "$.user.id",
            "table": { "42": "the-answer" }
        });
        assert_eq!(resolve(&LookupTableVar, config).await, json!("the-answer"));
    }

    #[tokio::test]
    async fn test_lookup_table_unresolved_key_uses_default() {
        let config = json!({
            "keyPath": "$.missing",
            "table": { "a": 1 },
            "default": "fallback"
        });
        assert_eq!(resolve(&LookupTableVar, config).await, json!("fallback"));
    }

    #[tokio::test]
    async fn test_lookup_table_no_default_is_null() {
        let config = json!({ "keyPath": "$.missing", "table": {} });
        assert_eq!(resolve(&LookupTableVar, config).await, Value::Null);
    }
}
