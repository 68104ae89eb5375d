use rhai::{
    Dynamic, Engine, EvalAltResult, Map,
    default_limits::MAX_STRINGS_INTERNED,
    packages::{Package, StandardPackage},
};

use crate::config::ScriptConfig;

/// Constant holding the invocation id inside a running program.
pub(crate) const ID_VAR: &str = "bridge_invocation_id";

pub(crate) fn build_engine(config: &ScriptConfig) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());

    engine.set_max_strings_interned(MAX_STRINGS_INTERNED);
    engine.set_strict_variables(true);
    engine.set_fail_on_invalid_map_property(true);

    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.set_max_variables(config.max_variables);
    engine.set_max_functions(config.max_functions);
    engine.set_max_modules(config.max_modules);

    engine
}

/// Message for an error the script raised, or `None` when the failure is one a
/// script `try`/`catch` could not intercept either (limits, termination).
pub(crate) fn raised_message(err: &EvalAltResult) -> Option<String> {
    if !err.is_catchable() {
        return None;
    }
    match err {
        EvalAltResult::ErrorRuntime(value, _) => Some(error_message(value)),
        other => Some(other.to_string()),
    }
}

/// Thrown maps report their `message` field; other thrown values themselves.
fn error_message(error: &Dynamic) -> String {
    match error.clone().try_cast::<Map>() {
        Some(map) => map
            .get("message")
            .map(Dynamic::to_string)
            .unwrap_or_else(|| error.to_string()),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rhai::Position;

    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        let mut map = Map::new();
        map.insert("message".into(), "Division by zero".into());
        map.insert("line".into(), Dynamic::from(3_i64));
        assert_eq!(error_message(&Dynamic::from_map(map)), "Division by zero");

        assert_eq!(error_message(&"boom".into()), "boom");
        assert_eq!(error_message(&Dynamic::from(7_i64)), "7");
    }

    #[test]
    fn configured_limits_are_applied() {
        let config = ScriptConfig {
            max_variables: 7,
            max_functions: 3,
            ..ScriptConfig::default()
        };
        let engine = build_engine(&config);
        assert_eq!(engine.max_variables(), 7);
        assert_eq!(engine.max_functions(), 3);
        assert_eq!(engine.max_operations(), config.max_operations);

        assert!(engine.compile("fn a() { 1 } fn b() { 2 } fn c() { 3 } fn d() { 4 }").is_err());
    }

    #[test]
    fn only_catchable_errors_are_raised() {
        let thrown = EvalAltResult::ErrorRuntime("boom".into(), Position::new(1, 1));
        assert_eq!(raised_message(&thrown), Some("boom".to_string()));

        let terminated = EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE);
        assert_eq!(raised_message(&terminated), None);
    }
}
