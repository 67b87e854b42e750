//! `send_keys`: type a key combination, a single key, or literal text.
//!
//! Parsing and the press/release timeline live in
//! [`keyhook_core::sequence`]; this action only walks the plan against the
//! [`KeystrokeSink`].  If the sink rejects a step, every key still held down
//! is released in reverse order before the error is reported, so no
//! modifier is left stuck.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keyhook_core::{parse_sequence, KeyEvent, KeyStep, VirtualKey};
use tracing::{debug, warn};

use crate::application::action_registry::{
    Action, ActionContext, ActionError, ActionOutcome, ActionType, FieldSpec,
};
use crate::infrastructure::keystroke::{KeystrokeSink, SynthesisError};

/// Emits a key sequence such as `"Ctrl+Shift+F1"`, `"Delete"` or `"Hello"`.
pub struct SendKeystrokesAction {
    pub key_sequence: String,
    /// Pause before the first step.
    pub delay_ms: u64,
    sink: Arc<dyn KeystrokeSink>,
}

static FIELDS: [FieldSpec<SendKeystrokesAction>; 2] = [
    FieldSpec::text("key_sequence", |a, v| a.key_sequence = v),
    FieldSpec::integer("delay_ms", |a, v| a.delay_ms = v.max(0) as u64),
];

impl SendKeystrokesAction {
    pub fn new(sink: Arc<dyn KeystrokeSink>, key_sequence: impl Into<String>) -> Self {
        Self {
            key_sequence: key_sequence.into(),
            delay_ms: 0,
            sink,
        }
    }

    async fn run_plan(&self, steps: Vec<KeyStep>) -> Result<(), SynthesisError> {
        let mut held: Vec<VirtualKey> = Vec::new();
        for step in steps {
            let result = match &step {
                KeyStep::Press(key) => self.sink.press(*key).map(|()| held.push(*key)),
                KeyStep::Release(key) => self.sink.release(*key).map(|()| held.retain(|k| k != key)),
                KeyStep::Pause(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(())
                }
                KeyStep::Text(text) => self.sink.type_text(text),
            };

            if let Err(e) = result {
                warn!(step = %step, held = held.len(), "keystroke rejected; releasing held keys");
                for key in held.iter().rev() {
                    if let Err(release_err) = self.sink.release(*key) {
                        warn!(key = %key, "failed to release held key: {release_err}");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SendKeystrokesAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendKeystrokesAction")
            .field("key_sequence", &self.key_sequence)
            .field("delay_ms", &self.delay_ms)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for SendKeystrokesAction {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn validate(&self) -> Result<(), ActionError> {
        parse_sequence(&self.key_sequence)
            .validate()
            .map_err(|e| ActionError::validation(e.to_string()))
    }

    async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
        let sequence = parse_sequence(&self.key_sequence);
        if let Err(e) = sequence.validate() {
            warn!(sequence = %self.key_sequence, "nothing to send: {e}");
            return Ok(ActionOutcome::Skipped(e.to_string()));
        }

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let steps = sequence.plan();
        debug!(sequence = %self.key_sequence, steps = steps.len(), "sending keystrokes");
        self.run_plan(steps).await?;
        Ok(ActionOutcome::Completed)
    }
}

impl ActionType for SendKeystrokesAction {
    const TYPE_ID: &'static str = "send_keys";
    const DISPLAY_NAME: &'static str = "Send Keystrokes";

    fn fields() -> &'static [FieldSpec<Self>] {
        &FIELDS
    }

    fn from_context(ctx: &ActionContext) -> Self {
        Self::new(Arc::clone(&ctx.keystrokes), String::new())
    }
}
