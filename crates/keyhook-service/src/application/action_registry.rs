//! ActionRegistry and ActionExecutor: from action descriptors to detached work.
//!
//! # Creating actions
//!
//! Bindings carry an [`ActionDescriptor`](keyhook_core::ActionDescriptor):
//! a type id plus loosely typed parameters read from configuration.  The
//! registry maps each type id to a factory.  A factory built by
//! [`ActionRegistry::register`] starts from the action's defaults and then
//! applies every parameter through the action's explicit field table
//! ([`ActionType::fields`]).  A parameter that cannot be coerced into its
//! field's type is logged and skipped; the rest of the binding still works.
//!
//! # Running actions
//!
//! [`ActionExecutor::execute`] never runs an action on the caller's thread.
//! It spawns one tokio task per invocation and a second task that watches
//! it.  Errors and panics surface only as log records, tagged with a
//! per-invocation id.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use keyhook_core::KeyEvent;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::infrastructure::audio::{platform_output, AudioError, AudioOutput, PlaybackRegistry};
use crate::infrastructure::keystroke::{platform_sink, KeystrokeSink, SynthesisError};

/// Error type for action validation and execution.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Configuration problem; the message is meant for the user.
    #[error("{0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("keystroke injection failed: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("audio playback failed: {0}")]
    Audio(#[from] AudioError),
    /// Too many detached playbacks are already running.
    #[error("{active} detached playbacks already running (limit {limit})")]
    Saturated { active: usize, limit: usize },
    #[error("background task failed: {0}")]
    Task(String),
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::Validation(message.into())
    }
}

/// What an action reports when it finishes without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The side effect finished before `execute` returned.
    Completed,
    /// The side effect was started and left running (a process that is not
    /// awaited, a playback that is not waited for).
    Detached,
    /// Nothing was done; the reason is logged.
    Skipped(String),
}

/// A pluggable side effect triggered by a binding.
#[async_trait]
pub trait Action: Send + Sync {
    /// Registered type id, e.g. `"run_app"`.
    fn type_id(&self) -> &'static str;

    /// Human-readable action name for UIs and logs.
    fn display_name(&self) -> &'static str;

    /// Configuration-time check.  Performs no side effects beyond file
    /// existence checks.
    fn validate(&self) -> Result<(), ActionError>;

    /// Performs the action for `event`.
    async fn execute(&self, event: &KeyEvent) -> Result<ActionOutcome, ActionError>;
}

// ── Field registry ────────────────────────────────────────────────────────────

/// Typed setter for one action field.
pub enum FieldSetter<T> {
    Text(fn(&mut T, String)),
    Integer(fn(&mut T, i64)),
    Float(fn(&mut T, f64)),
    Bool(fn(&mut T, bool)),
}

/// One named, typed field of an action type.
pub struct FieldSpec<T> {
    pub name: &'static str,
    pub setter: FieldSetter<T>,
}

impl<T> FieldSpec<T> {
    pub const fn text(name: &'static str, set: fn(&mut T, String)) -> Self {
        Self { name, setter: FieldSetter::Text(set) }
    }

    pub const fn integer(name: &'static str, set: fn(&mut T, i64)) -> Self {
        Self { name, setter: FieldSetter::Integer(set) }
    }

    pub const fn float(name: &'static str, set: fn(&mut T, f64)) -> Self {
        Self { name, setter: FieldSetter::Float(set) }
    }

    pub const fn boolean(name: &'static str, set: fn(&mut T, bool)) -> Self {
        Self { name, setter: FieldSetter::Bool(set) }
    }

    /// `true` when `parameter` names this field.  Case and underscores are
    /// ignored, so `file_path`, `FilePath` and `filepath` all match.
    pub fn matches(&self, parameter: &str) -> bool {
        normalise_field_name(self.name) == normalise_field_name(parameter)
    }

    /// Coerces `value` into this field's type and stores it on `target`.
    pub fn apply(&self, target: &mut T, value: &Value) -> Result<(), String> {
        match &self.setter {
            FieldSetter::Text(set) => coerce_text(value).map(|v| set(target, v)),
            FieldSetter::Integer(set) => coerce_integer(value).map(|v| set(target, v)),
            FieldSetter::Float(set) => coerce_float(value).map(|v| set(target, v)),
            FieldSetter::Bool(set) => coerce_bool(value).map(|v| set(target, v)),
        }
    }

    fn kind(&self) -> &'static str {
        match self.setter {
            FieldSetter::Text(_) => "text",
            FieldSetter::Integer(_) => "integer",
            FieldSetter::Float(_) => "number",
            FieldSetter::Bool(_) => "boolean",
        }
    }
}

fn normalise_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn coerce_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(format!("expected text, got {other}")),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("{n} is not an integer")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{s}' is not an integer")),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("expected integer, got {other}")),
    }
}

fn coerce_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a number")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("expected number, got {other}")),
    }
}

fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(format!("{n} is not a boolean")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("expected boolean, got {other}")),
    }
}

/// An action type that can be built from a descriptor.
pub trait ActionType: Action + Sized + 'static {
    const TYPE_ID: &'static str;
    const DISPLAY_NAME: &'static str;

    /// Explicit field table used to apply descriptor parameters.
    fn fields() -> &'static [FieldSpec<Self>];

    /// The action with every field at its default.
    fn from_context(ctx: &ActionContext) -> Self;

    /// Builds the action and applies `parameters` field by field.
    ///
    /// Unknown parameters are ignored; a parameter that fails coercion is
    /// logged and its field keeps the default.
    fn build(ctx: &ActionContext, parameters: &BTreeMap<String, Value>) -> Self {
        let mut action = Self::from_context(ctx);
        for (name, value) in parameters {
            let Some(field) = Self::fields().iter().find(|f| f.matches(name)) else {
                debug!(action = Self::TYPE_ID, parameter = %name, "ignoring unknown parameter");
                continue;
            };
            if let Err(reason) = field.apply(&mut action, value) {
                warn!(
                    action = Self::TYPE_ID,
                    parameter = %name,
                    expected = field.kind(),
                    "parameter ignored: {reason}"
                );
            }
        }
        action
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Shared services injected into every action.
#[derive(Clone)]
pub struct ActionContext {
    pub keystrokes: Arc<dyn KeystrokeSink>,
    pub audio: Arc<dyn AudioOutput>,
    pub http: reqwest::Client,
    pub playbacks: PlaybackRegistry,
}

impl ActionContext {
    pub fn new(
        keystrokes: Arc<dyn KeystrokeSink>,
        audio: Arc<dyn AudioOutput>,
        http: reqwest::Client,
        playbacks: PlaybackRegistry,
    ) -> Self {
        Self {
            keystrokes,
            audio,
            http,
            playbacks,
        }
    }

    /// Context backed by the platform keystroke sink and audio output.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Http`] if the HTTP client cannot be built.
    pub fn platform(http_timeout: Duration, max_detached_playbacks: usize) -> Result<Self, ActionError> {
        let http = reqwest::Client::builder().timeout(http_timeout).build()?;
        Ok(Self::new(
            platform_sink(),
            platform_output(),
            http,
            PlaybackRegistry::new(max_detached_playbacks),
        ))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

type ActionFactory = Arc<dyn Fn(&BTreeMap<String, Value>) -> Box<dyn Action> + Send + Sync>;

/// Maps action type ids to factories.
pub struct ActionRegistry {
    ctx: ActionContext,
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// An empty registry whose typed factories share `ctx`.
    pub fn new(ctx: ActionContext) -> Self {
        Self {
            ctx,
            factories: HashMap::new(),
        }
    }

    /// Registers `T` under [`ActionType::TYPE_ID`].  A later registration for
    /// the same id replaces this one.
    pub fn register<T: ActionType>(&mut self) {
        let ctx = self.ctx.clone();
        self.register_factory(T::TYPE_ID, move |params| {
            Box::new(T::build(&ctx, params)) as Box<dyn Action>
        });
    }

    /// Registers an arbitrary factory for `type_id`.  Type ids compare
    /// case-insensitively; the last registration wins.
    pub fn register_factory<F>(&mut self, type_id: &str, factory: F)
    where
        F: Fn(&BTreeMap<String, Value>) -> Box<dyn Action> + Send + Sync + 'static,
    {
        let key = type_id.to_ascii_lowercase();
        if self.factories.insert(key, Arc::new(factory)).is_some() {
            info!(type_id, "action factory replaced");
        } else {
            debug!(type_id, "action factory registered");
        }
    }

    /// Creates an action, or `None` for an unregistered type id.
    pub fn create(&self, type_id: &str, parameters: &BTreeMap<String, Value>) -> Option<Box<dyn Action>> {
        match self.factories.get(&type_id.to_ascii_lowercase()) {
            Some(factory) => Some(factory(parameters)),
            None => {
                warn!(type_id, "unknown action type");
                None
            }
        }
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.factories.contains_key(&type_id.to_ascii_lowercase())
    }

    /// Registered type ids, sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn context(&self) -> &ActionContext {
        &self.ctx
    }
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// Runs actions on the tokio runtime, detached from the caller.
#[derive(Clone)]
pub struct ActionExecutor {
    handle: Handle,
    in_flight: Arc<AtomicUsize>,
}

impl ActionExecutor {
    /// Executor spawning onto `handle`.  Safe to call `execute` from any
    /// thread, including the capture thread.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of invocations that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Starts `action` for `event` and returns immediately with the
    /// invocation id used in its log records.
    pub fn execute(&self, action: Box<dyn Action>, event: KeyEvent) -> Uuid {
        let invocation = Uuid::new_v4();
        let type_id = action.type_id();
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        let task = self.handle.spawn(async move {
            let started = Instant::now();
            let result = action.execute(&event).await;
            (result, started.elapsed())
        });

        let in_flight = Arc::clone(&self.in_flight);
        self.handle.spawn(async move {
            match task.await {
                Ok((Ok(outcome), elapsed)) => debug!(
                    %invocation,
                    action = type_id,
                    ?outcome,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "action finished"
                ),
                Ok((Err(e), _)) => warn!(%invocation, action = type_id, "action failed: {e}"),
                Err(e) if e.is_panic() => error!(%invocation, action = type_id, "action panicked"),
                Err(_) => debug!(%invocation, action = type_id, "action cancelled"),
            }
            in_flight.fetch_sub(1, Ordering::AcqRel);
        });

        invocation
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::audio::MockAudioOutput;
    use crate::infrastructure::keystroke::mock::RecordingKeystrokeSink;
    use keyhook_core::{DeviceId, DeviceRecord, KeyStroke};
    use std::sync::Mutex;

    pub(crate) fn test_context() -> ActionContext {
        ActionContext::new(
            Arc::new(RecordingKeystrokeSink::new()),
            Arc::new(MockAudioOutput::new()),
            reqwest::Client::new(),
            PlaybackRegistry::new(2),
        )
    }

    pub(crate) fn test_event() -> KeyEvent {
        let device = Arc::new(DeviceRecord::new(
            DeviceId(1),
            Some("HID\\TEST".to_string()),
            "Test".to_string(),
            false,
        ));
        KeyEvent::new(device, KeyStroke::new(0x3B, 0))
    }

    /// Minimal action used to exercise the field table and the executor.
    #[derive(Debug, Default)]
    struct Fixture {
        label: String,
        count: i64,
        ratio: f64,
        enabled: bool,
        behaviour: Behaviour,
    }

    #[derive(Debug, Default, Clone, Copy)]
    enum Behaviour {
        #[default]
        Succeed,
        Fail,
        Panic,
    }

    static FIXTURE_FIELDS: [FieldSpec<Fixture>; 4] = [
        FieldSpec::text("label", |p, v| p.label = v),
        FieldSpec::integer("retry_count", |p, v| p.count = v),
        FieldSpec::float("ratio", |p, v| p.ratio = v),
        FieldSpec::boolean("enabled", |p, v| p.enabled = v),
    ];

    #[async_trait]
    impl Action for Fixture {
        fn type_id(&self) -> &'static str {
            Self::TYPE_ID
        }

        fn display_name(&self) -> &'static str {
            Self::DISPLAY_NAME
        }

        fn validate(&self) -> Result<(), ActionError> {
            Ok(())
        }

        async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
            match self.behaviour {
                Behaviour::Succeed => Ok(ActionOutcome::Completed),
                Behaviour::Fail => Err(ActionError::validation("fixture failed")),
                Behaviour::Panic => panic!("fixture panicked"),
            }
        }
    }

    impl ActionType for Fixture {
        const TYPE_ID: &'static str = "fixture";
        const DISPLAY_NAME: &'static str = "Fixture";

        fn fields() -> &'static [FieldSpec<Self>] {
            &FIXTURE_FIELDS
        }

        fn from_context(_ctx: &ActionContext) -> Self {
            Fixture {
                ratio: 0.5,
                ..Fixture::default()
            }
        }
    }

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    // ── Field coercion ────────────────────────────────────────────────────────

    #[test]
    fn test_build_applies_fields_by_normalised_name() {
        // Arrange
        let parameters = params(&[
            ("Label", Value::from("hello")),
            ("RetryCount", Value::from("3")),
            ("ratio", Value::from(0.25)),
            ("ENABLED", Value::from("true")),
        ]);

        // Act
        let fixture = Fixture::build(&test_context(), &parameters);

        // Assert
        assert_eq!(fixture.label, "hello");
        assert_eq!(fixture.count, 3);
        assert!((fixture.ratio - 0.25).abs() < f64::EPSILON);
        assert!(fixture.enabled);
    }

    #[test]
    fn test_coercion_failure_keeps_default_and_applies_other_fields() {
        let parameters = params(&[
            ("retry_count", Value::from("many")),
            ("ratio", Value::from(false)),
            ("label", Value::from("still set")),
        ]);

        let fixture = Fixture::build(&test_context(), &parameters);

        assert_eq!(fixture.count, 0);
        assert!((fixture.ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(fixture.label, "still set");
    }

    #[test]
    fn test_unknown_parameters_are_ignored() {
        let fixture = Fixture::build(&test_context(), &params(&[("colour", Value::from("red"))]));
        assert_eq!(fixture.label, "");
    }

    #[test]
    fn test_coerce_integer_accepts_integral_floats_only() {
        assert_eq!(coerce_integer(&Value::from(250.0)), Ok(250));
        assert!(coerce_integer(&Value::from(2.5)).is_err());
    }

    #[test]
    fn test_coerce_bool_accepts_common_spellings() {
        assert_eq!(coerce_bool(&Value::from("Yes")), Ok(true));
        assert_eq!(coerce_bool(&Value::from(0)), Ok(false));
        assert!(coerce_bool(&Value::from("maybe")).is_err());
    }

    #[test]
    fn test_coerce_text_renders_scalars() {
        assert_eq!(coerce_text(&Value::from(42)), Ok("42".to_string()));
        assert!(coerce_text(&serde_json::json!([1, 2])).is_err());
    }

    // ── Registry ──────────────────────────────────────────────────────────────

    struct Named(&'static str);

    #[async_trait]
    impl Action for Named {
        fn type_id(&self) -> &'static str {
            "fixture"
        }

        fn display_name(&self) -> &'static str {
            self.0
        }

        fn validate(&self) -> Result<(), ActionError> {
            Ok(())
        }

        async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
            Ok(ActionOutcome::Completed)
        }
    }

    #[test]
    fn test_unknown_type_id_yields_none() {
        let registry = ActionRegistry::new(test_context());
        assert!(registry.create("nope", &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_reregistration_replaces_factory() {
        // Arrange
        let mut registry = ActionRegistry::new(test_context());
        registry.register_factory("fixture", |_| Box::new(Named("first")));

        // Act
        registry.register_factory("FIXTURE", |_| Box::new(Named("second")));
        let action = registry.create("fixture", &BTreeMap::new()).expect("registered");

        // Assert
        assert_eq!(action.display_name(), "second");
        assert_eq!(registry.registered_types(), vec!["fixture".to_string()]);
    }

    #[test]
    fn test_typed_registration_uses_type_id() {
        let mut registry = ActionRegistry::new(test_context());
        registry.register::<Fixture>();

        let action = registry.create("Fixture", &BTreeMap::new()).expect("registered");

        assert_eq!(action.type_id(), "fixture");
        assert_eq!(action.display_name(), "Fixture");
    }

    // ── Executor ──────────────────────────────────────────────────────────────

    async fn wait_idle(executor: &ActionExecutor) {
        for _ in 0..200 {
            if executor.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("executor never went idle");
    }

    #[tokio::test]
    async fn test_executor_contains_failures_and_panics() {
        // Arrange
        let executor = ActionExecutor::new(Handle::current());
        let actions = [Behaviour::Succeed, Behaviour::Fail, Behaviour::Panic];

        // Act
        for behaviour in actions {
            let fixture = Fixture {
                behaviour,
                ..Fixture::default()
            };
            executor.execute(Box::new(fixture), test_event());
        }
        wait_idle(&executor).await;

        // Assert
        assert_eq!(executor.in_flight(), 0);
    }

    #[test]
    fn test_executor_accepts_work_from_non_runtime_thread() {
        // Arrange
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let executor = ActionExecutor::new(runtime.handle().clone());
        let ran = Arc::new(Mutex::new(false));

        struct Flag(Arc<Mutex<bool>>);

        #[async_trait]
        impl Action for Flag {
            fn type_id(&self) -> &'static str {
                "flag"
            }
            fn display_name(&self) -> &'static str {
                "Flag"
            }
            fn validate(&self) -> Result<(), ActionError> {
                Ok(())
            }
            async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
                *self.0.lock().unwrap() = true;
                Ok(ActionOutcome::Completed)
            }
        }

        // Act
        let worker = {
            let executor = executor.clone();
            let ran = Arc::clone(&ran);
            std::thread::spawn(move || {
                executor.execute(Box::new(Flag(ran)), test_event());
            })
        };
        worker.join().expect("thread");
        runtime.block_on(wait_idle(&executor));

        // Assert
        assert!(*ran.lock().unwrap());
    }
}
