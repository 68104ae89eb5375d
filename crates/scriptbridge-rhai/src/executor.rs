use std::{cell::Cell, rc::Rc, sync::Arc, time::Instant};

use rhai::{Dynamic, Engine, Scope};
use scriptbridge::{
    Bridge, BridgeConfig, Error, InvocationId, Result, ScriptEngine, Signal, SignalSink,
};
use serde_json::Value;

use crate::{
    config::ScriptConfig,
    engine::{ID_VAR, build_engine, raised_message},
    error::ScriptError,
};

/// API surface that a host exposes to Rhai scripts.
pub trait ScriptApi: Send + Sync + 'static {
    /// Register functions, types, and modules on the engine.
    fn register(&self, engine: &mut Engine);

    /// Callback invoked when the script prints.
    fn on_print(&self, _text: &str) {}
    /// Callback invoked when the script emits debug output.
    fn on_debug(&self, _text: &str, _source: Option<&str>, _pos: rhai::Position) {}
}

/// API that registers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoApi;

impl ScriptApi for NoApi {
    fn register(&self, _engine: &mut Engine) {}
}

/// A Rhai engine driven by a [`Bridge`].
///
/// Each invocation runs as its own top-level program in a fresh scope, so
/// variables and script-defined functions do not carry over between
/// invocations. Functions registered through [`ScriptApi`] do.
///
/// The engine reports every outcome itself: scripts have no way to signal,
/// so an invocation can only ever be resolved by its own evaluation.
pub struct RhaiEngine {
    engine: Engine,
    sink: SignalSink,
    config: ScriptConfig,
    started: Rc<Cell<Instant>>,
}

impl RhaiEngine {
    /// Build an engine for `api` that reports through `sink`.
    pub fn new<A: ScriptApi>(api: Arc<A>, config: ScriptConfig, sink: SignalSink) -> Self {
        let mut engine = build_engine(&config);

        // Register API
        api.register(&mut engine);

        // Output capture
        let api_print = api.clone();
        engine.on_print(move |text| {
            tracing::debug!(target: "scriptbridge_rhai::print", "{}", text);
            api_print.on_print(text);
        });
        let api_debug = api;
        engine.on_debug(move |text, src, pos| api_debug.on_debug(text, src, pos));

        // Wall-clock limit, measured from the start of each evaluation
        let started = Rc::new(Cell::new(Instant::now()));
        let progress_started = started.clone();
        let timeout = config.timeout;
        let timeout_ms = timeout.as_millis() as u64;
        engine.on_progress(move |_| {
            if progress_started.get().elapsed() > timeout {
                Some(Dynamic::from(ScriptError::Timeout { ms: timeout_ms }))
            } else {
                None
            }
        });

        Self {
            engine,
            sink,
            config,
            started,
        }
    }

    /// Factory for [`Bridge::spawn`]; reports readiness once the engine is built.
    pub fn factory<A: ScriptApi>(
        api: Arc<A>,
        config: ScriptConfig,
    ) -> impl FnOnce(SignalSink) -> Result<Self> + Send + 'static {
        move |sink: SignalSink| {
            let engine = Self::new(api, config, sink.clone());
            sink.ready();
            Ok(engine)
        }
    }
}

impl ScriptEngine for RhaiEngine {
    /// Rhai programs run at global level, so the source is the program; the
    /// invocation id is bound as the constant `bridge_invocation_id` when it
    /// is evaluated.
    fn wrap(&self, _id: &InvocationId, source: &str) -> Result<String> {
        if source.len() > self.config.max_source_len {
            return Err(Error::Encoding(format!(
                "source is {} bytes, limit is {}",
                source.len(),
                self.config.max_source_len
            )));
        }
        Ok(source.to_string())
    }

    fn evaluate(&mut self, id: &InvocationId, program: String) -> Result<()> {
        let mut scope = Scope::new();
        scope.push_constant(ID_VAR, id.to_string());

        // Parse & Eval
        let ast = self
            .engine
            .compile_with_scope(&scope, &program)
            .map_err(ScriptError::Parse)?;
        self.started.set(Instant::now());
        let signal = match self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(value) => Signal::value(id.clone(), to_json(&value)?),
            Err(err) => match raised_message(&err) {
                Some(message) => Signal::error(id.clone(), message),
                None => return Err(ScriptError::from_eval(err).into()),
            },
        };
        self.sink.signal(signal);
        Ok(())
    }
}

fn to_json(value: &Dynamic) -> Result<Value> {
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| {
        Error::Encoding(format!("result of type {} is not JSON: {e}", value.type_name()))
    })
}

/// Spawn a [`Bridge`] backed by a [`RhaiEngine`].
pub fn spawn_rhai_bridge<A: ScriptApi>(
    api: Arc<A>,
    script_config: ScriptConfig,
    bridge_config: BridgeConfig,
) -> Result<Bridge> {
    Bridge::spawn(bridge_config, RhaiEngine::factory(api, script_config))
}

#[cfg(test)]
mod tests {
    use scriptbridge::testutils::ready_scripted_bridge;

    use super::*;

    fn engine(config: ScriptConfig) -> RhaiEngine {
        let (bridge, _probe) = ready_scripted_bridge().expect("bridge");
        RhaiEngine::new(Arc::new(NoApi), config, bridge.signals())
    }

    #[test]
    fn wrap_passes_source_through() {
        let engine = engine(ScriptConfig::default());
        let program = engine.wrap(&InvocationId::from("inv-9"), "fn f() { 1 }\nf()");
        assert_eq!(program, Ok("fn f() { 1 }\nf()".to_string()));
    }

    #[test]
    fn wrap_rejects_oversized_source() {
        let engine = engine(ScriptConfig {
            max_source_len: 4,
            ..ScriptConfig::default()
        });
        let err = engine.wrap(&InvocationId::from("inv-1"), "1 + 2 + 3").unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[test]
    fn uncatchable_failures_return_synchronously() {
        let mut engine = engine(ScriptConfig::default().with_max_operations(10));
        let err = engine
            .evaluate(&InvocationId::from("inv-2"), "loop { }".to_string())
            .unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[test]
    fn parse_errors_return_synchronously() {
        let mut engine = engine(ScriptConfig::default());
        let err = engine
            .evaluate(&InvocationId::from("inv-3"), "let = ;".to_string())
            .unwrap_err();
        assert!(matches!(&err, Error::Engine(msg) if msg.starts_with("Parse error")), "{err:?}");
    }
}
