//! Trigger condition evaluation.
//!
//! A trigger fires when **every** one of its conditions holds against the
//! event (conjunction only; no disjunction, no nesting). An empty condition
//! list fires vacuously.
//!
//! Evaluation never errors: a malformed field path, a missing field, or a
//! type mismatch under a numeric operator all degrade to `false` for that
//! condition, whatever the operator. A trigger only fires on fields the
//! event actually carries.

use crate::path::PathExpr;
use crate::ruleset::{Condition, Op, Trigger};
use serde_json::Value;
use tracing::trace;

/// Evaluate a full trigger against an event payload.
pub fn evaluate_trigger(trigger: &Trigger, event: &Value) -> bool {
    let fired = trigger
        .conditions
        .iter()
        .all(|condition| evaluate_condition(condition, event));
    trace!(
        trigger_id = %trigger.trigger_id,
        conditions = trigger.conditions.len(),
        fired,
        "Evaluated trigger"
    );
    fired
}

/// Evaluate a single condition against an event payload.
pub fn evaluate_condition(condition: &Condition, event: &Value) -> bool {
    let resolved = resolve_field(&condition.field, event);

    match condition.op {
        Op::Eq => resolved.is_some_and(|v| json_eq(v, &condition.value)),
        Op::Neq => resolved.is_some_and(|v| !json_eq(v, &condition.value)),
        Op::Contains => resolved.is_some_and(|v| contains(v, &condition.value)),
        Op::Gte => numeric_cmp(resolved, &condition.value).is_some_and(|(a, b)| a >= b),
        Op::Lte => numeric_cmp(resolved, &condition.value).is_some_and(|(a, b)| a <= b),
        Op::In => match (&condition.value, resolved) {
            (Value::Array(options), Some(v)) => options.iter().any(|o| json_eq(v, o)),
            _ => false,
        },
    }
}

/// Resolve a condition field against the event.
///
/// Accepts `$.`-prefixed path expressions; a bare name like `event` is
/// treated as `$.event`. A multi-match expression resolves to its first hit.
fn resolve_field<'a>(field: &str, event: &'a Value) -> Option<&'a Value> {
    let expr = PathExpr::parse(field).ok()?;
    expr.query(event).into_iter().next()
}

/// Type-aware deep equality.
///
/// Numbers compare numerically (`1` equals `1.0`); everything else uses
/// strict structural equality with no string/number coercion.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Substring test for strings, membership test for arrays.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| json_eq(item, needle)),
        _ => false,
    }
}

/// Both sides as numbers, or nothing (non-numeric operands never fire).
fn numeric_cmp(resolved: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    Some((resolved?.as_f64()?, expected.as_f64()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger(conditions: Vec<Condition>) -> Trigger {
        Trigger {
            trigger_id: "T1".to_string(),
            name: "test".to_string(),
            conditions,
        }
    }

    fn cond(field: &str, op: Op, value: Value) -> Condition {
        Condition {
            field: field.to_string(),
            op,
            value,
        }
    }

    fn event() -> Value {
        json!({
            "event": "page_view",
            "account_id": "acc1",
            "module_key": "billing",
            "biz": { "value": 250, "tags": ["beta", "trial"] },
            "context": { "screen": "Invoices" }
        })
    }

    #[test]
    fn test_empty_conditions_fire_vacuously() {
        assert!(evaluate_trigger(&trigger(vec![]), &event()));
    }

    #[test]
    fn test_eq_on_event_kind() {
        // Scenario: {field: "$.event", op: eq, value: "page_view"} fires.
        let t = trigger(vec![cond("$.event", Op::Eq, json!("page_view"))]);
        assert!(evaluate_trigger(&t, &event()));

        let t = trigger(vec![cond("$.event", Op::Eq, json!("purchase"))]);
        assert!(!evaluate_trigger(&t, &event()));
    }

    #[test]
    fn test_eq_no_string_number_coercion() {
        let e = json!({ "n": 5, "s": "5" });
        assert!(!evaluate_condition(&cond("$.s", Op::Eq, json!(5)), &e));
        assert!(evaluate_condition(&cond("$.n", Op::Eq, json!(5.0)), &e));
    }

    #[test]
    fn test_neq() {
        let e = event();
        assert!(evaluate_condition(&cond("$.event", Op::Neq, json!("purchase")), &e));
        assert!(!evaluate_condition(&cond("$.event", Op::Neq, json!("page_view")), &e));
    }

    #[test]
    fn test_neq_missing_field_is_false() {
        // An unresolved field path is condition-false for every operator;
        // neq must not fire triggers on events lacking the field entirely.
        let e = json!({ "event": "page_view" });
        assert!(!evaluate_condition(&cond("$.nope", Op::Neq, json!("x")), &e));
        assert!(!evaluate_condition(&cond("$.biz.value", Op::Neq, json!(0)), &e));
    }

    #[test]
    fn test_contains_string_and_array() {
        let e = event();
        assert!(evaluate_condition(&cond("$.context.screen", Op::Contains, json!("voice")), &e));
        assert!(evaluate_condition(&cond("$.biz.tags", Op::Contains, json!("beta")), &e));
        assert!(!evaluate_condition(&cond("$.biz.tags", Op::Contains, json!("vip")), &e));
        // Non-container haystack never contains anything
        assert!(!evaluate_condition(&cond("$.biz.value", Op::Contains, json!(2)), &e));
    }

    #[test]
    fn test_gte_lte_numeric_only() {
        let e = event();
        assert!(evaluate_condition(&cond("$.biz.value", Op::Gte, json!(250)), &e));
        assert!(evaluate_condition(&cond("$.biz.value", Op::Lte, json!(300)), &e));
        assert!(!evaluate_condition(&cond("$.biz.value", Op::Gte, json!(251)), &e));
        // Non-numeric operands are false, never an error
        assert!(!evaluate_condition(&cond("$.event", Op::Gte, json!(1)), &e));
        assert!(!evaluate_condition(&cond("$.biz.value", Op::Lte, json!("300")), &e));
        assert!(!evaluate_condition(&cond("$.missing", Op::Gte, json!(0)), &e));
    }

    #[test]
    fn test_in_membership() {
        let e = event();
        assert!(evaluate_condition(
            &cond("$.module_key", Op::In, json!(["billing", "crm"])),
            &e
        ));
        assert!(!evaluate_condition(
            &cond("$.module_key", Op::In, json!(["crm", "support"])),
            &e
        ));
        // Non-array expected value never matches
        assert!(!evaluate_condition(&cond("$.module_key", Op::In, json!("billing")), &e));
    }

    #[test]
    fn test_conjunction_requires_all() {
        let t = trigger(vec![
            cond("$.event", Op::Eq, json!("page_view")),
            cond("$.biz.value", Op::Gte, json!(100)),
        ]);
        assert!(evaluate_trigger(&t, &event()));

        let t = trigger(vec![
            cond("$.event", Op::Eq, json!("page_view")),
            cond("$.biz.value", Op::Gte, json!(1000)),
        ]);
        assert!(!evaluate_trigger(&t, &event()));
    }

    #[test]
    fn test_bare_field_name_is_rooted() {
        assert!(evaluate_condition(&cond("event", Op::Eq, json!("page_view")), &event()));
    }

    #[test]
    fn test_malformed_path_is_false() {
        assert!(!evaluate_condition(&cond("$.items[x]", Op::Eq, json!(1)), &event()));
    }
}
