use std::time::Duration;

/// Limits applied to every evaluation on a [`RhaiEngine`](crate::RhaiEngine).
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Maximum wall-clock duration of one evaluation, enforced inside the engine.
    pub timeout: Duration,
    /// Maximum source length in bytes accepted for evaluation.
    pub max_source_len: usize,
    /// Maximum number of operations per evaluation; zero means unlimited.
    pub max_operations: u64,
    /// Maximum call stack depth.
    pub max_call_levels: usize,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
    /// Maximum depth for function expressions.
    pub max_function_expr_depth: usize,
    /// Maximum size of any string value.
    pub max_string_size: usize,
    /// Maximum size of any array.
    pub max_array_size: usize,
    /// Maximum size of any map.
    pub max_map_size: usize,
    /// Maximum number of variables in scope.
    pub max_variables: usize,
    /// Maximum number of functions a program may define.
    pub max_functions: usize,
    /// Maximum number of modules that can be loaded.
    pub max_modules: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_source_len: 1_000_000,
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1_000_000,
            max_array_size: 100_000,
            max_map_size: 100_000,
            max_variables: 10_000,
            max_functions: 1_000,
            max_modules: 10,
        }
    }
}

impl ScriptConfig {
    /// Set the per-evaluation wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the operation limit; zero disables it.
    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }
}
