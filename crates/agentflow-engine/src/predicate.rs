use std::sync::Arc;

use agentflow_core::Scope;
use serde_json::Value;

type PredicateFn = Arc<dyn Fn(&Scope) -> bool + Send + Sync>;

/// A boolean test over the current scope.
///
/// Used as a loop exit condition or a branch activation condition. Predicates
/// are expected to be pure: they only read the scope.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    func: PredicateFn,
}

impl Predicate {
    /// Create a predicate from a closure.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Scope) -> bool + Send + Sync + 'static,
    {
        Self {
            label: "<fn>".to_string(),
            func: Arc::new(func),
        }
    }

    /// Create a predicate from a simple expression (see [`evaluate_expr`]).
    pub fn expr(expr: impl Into<String>) -> Self {
        let expr = expr.into();
        let label = expr.clone();
        Self {
            label,
            func: Arc::new(move |scope| evaluate_expr(&expr, scope)),
        }
    }

    /// Set the label shown in logs.
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// A predicate that always holds.
    pub fn always() -> Self {
        Self::new(|_| true).labelled("always")
    }

    /// A predicate that never holds.
    pub fn never() -> Self {
        Self::new(|_| false).labelled("never")
    }

    pub fn test(&self, scope: &Scope) -> bool {
        (self.func)(scope)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Predicate").field(&self.label).finish()
    }
}

/// Evaluate a simple expression against scope values.
///
/// Supported expressions:
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal
/// - `key contains "substr"`: substring match
/// - `key >= 0.8`, `key <= 0.8`, `key > 0.8`, `key < 0.8`: numeric comparison
///
/// Non-string values compare by their JSON text, so `done == "true"` matches
/// a boolean. Returns `false` for unparseable expressions and missing keys.
pub fn evaluate_expr(expr: &str, scope: &Scope) -> bool {
    let expr = expr.trim();

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return text_of(scope, key).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return text_of(scope, key).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return text_of(scope, key).is_some_and(|s| s == value);
    }

    // Two-character operators first so `>=` is not read as `>`.
    for op in [">=", "<=", ">", "<"] {
        if let Some((key, value)) = parse_operator(expr, op) {
            let (Some(lhs), Ok(rhs)) = (number_of(scope, key), value.parse::<f64>()) else {
                return false;
            };
            return match op {
                ">=" => lhs >= rhs,
                "<=" => lhs <= rhs,
                ">" => lhs > rhs,
                _ => lhs < rhs,
            };
        }
    }

    false
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, val.trim().trim_matches('"')))
}

fn text_of(scope: &Scope, key: &str) -> Option<String> {
    scope.get(key).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn number_of(scope: &Scope, key: &str) -> Option<f64> {
    match scope.get(key)? {
        Value::String(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(values: &[(&str, Value)]) -> Scope {
        Scope::from_map(values.iter().map(|(k, v)| (k.to_string(), v.clone())))
    }

    #[test]
    fn test_closure_predicate() {
        let high = Predicate::new(|s| s.read_as_or("score", 0.0_f64) >= 0.8);
        assert!(high.test(&scope_with(&[("score", serde_json::json!(0.9))])));
        assert!(!high.test(&scope_with(&[("score", serde_json::json!(0.2))])));
        assert!(!high.test(&Scope::new()));
        assert_eq!(high.label(), "<fn>");
    }

    #[test]
    fn test_expr_equals() {
        let scope = scope_with(&[("category", serde_json::json!("MEDICAL"))]);
        assert!(evaluate_expr(r#"category == "MEDICAL""#, &scope));
        assert!(!evaluate_expr(r#"category == "LEGAL""#, &scope));
    }

    #[test]
    fn test_expr_not_equals() {
        let scope = scope_with(&[("status", serde_json::json!("success"))]);
        assert!(evaluate_expr(r#"status != "failure""#, &scope));
        assert!(!evaluate_expr(r#"status != "success""#, &scope));
    }

    #[test]
    fn test_expr_contains() {
        let scope = scope_with(&[(
            "story",
            serde_json::json!("A dragon met a wizard."),
        )]);
        assert!(evaluate_expr(r#"story contains "wizard""#, &scope));
        assert!(!evaluate_expr(r#"story contains "knight""#, &scope));
    }

    #[test]
    fn test_expr_numeric() {
        let scope = scope_with(&[
            ("score", serde_json::json!(0.8)),
            ("rating", serde_json::json!("7")),
        ]);
        assert!(evaluate_expr("score >= 0.8", &scope));
        assert!(!evaluate_expr("score > 0.8", &scope));
        assert!(evaluate_expr("score <= 0.8", &scope));
        assert!(evaluate_expr("score < 0.9", &scope));
        assert!(evaluate_expr("rating > 5", &scope));
        assert!(!evaluate_expr("score >= high", &scope));
    }

    #[test]
    fn test_expr_non_string_equality() {
        let scope = scope_with(&[("done", serde_json::json!(true))]);
        assert!(evaluate_expr(r#"done == "true""#, &scope));
    }

    #[test]
    fn test_expr_missing_key() {
        assert!(!evaluate_expr(r#"missing == "value""#, &Scope::new()));
        assert!(!evaluate_expr("missing >= 1", &Scope::new()));
    }

    #[test]
    fn test_expr_invalid() {
        assert!(!evaluate_expr("this is not valid", &Scope::new()));
    }

    #[test]
    fn test_expr_predicate_label() {
        let p = Predicate::expr("score >= 0.8");
        assert_eq!(p.label(), "score >= 0.8");
        assert!(format!("{:?}", p).contains("score >= 0.8"));
        assert!(Predicate::always().test(&Scope::new()));
        assert!(!Predicate::never().test(&Scope::new()));
    }
}
