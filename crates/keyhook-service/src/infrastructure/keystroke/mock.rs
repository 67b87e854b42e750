//! Recording keystroke sink for tests.

use std::sync::Mutex;

use keyhook_core::VirtualKey;

use super::{KeystrokeSink, SynthesisError};

/// One call made against the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Press(VirtualKey),
    Release(VirtualKey),
    Text(String),
}

/// Records every call in order; optionally fails all of them.
#[derive(Debug, Default)]
pub struct RecordingKeystrokeSink {
    calls: Mutex<Vec<SinkCall>>,
    fail: bool,
}

impl RecordingKeystrokeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call is rejected by the "OS".
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("sink lock poisoned").clone()
    }

    fn record(&self, call: SinkCall) -> Result<(), SynthesisError> {
        if self.fail {
            return Err(SynthesisError::Rejected {
                accepted: 0,
                submitted: 1,
            });
        }
        self.calls.lock().expect("sink lock poisoned").push(call);
        Ok(())
    }
}

impl KeystrokeSink for RecordingKeystrokeSink {
    fn press(&self, key: VirtualKey) -> Result<(), SynthesisError> {
        self.record(SinkCall::Press(key))
    }

    fn release(&self, key: VirtualKey) -> Result<(), SynthesisError> {
        self.record(SinkCall::Release(key))
    }

    fn type_text(&self, text: &str) -> Result<(), SynthesisError> {
        self.record(SinkCall::Text(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_call_order() {
        // Arrange
        let sink = RecordingKeystrokeSink::new();
        let a = VirtualKey::new(0x41);

        // Act
        sink.press(a).unwrap();
        sink.release(a).unwrap();
        sink.type_text("hi").unwrap();

        // Assert
        assert_eq!(
            sink.calls(),
            vec![
                SinkCall::Press(a),
                SinkCall::Release(a),
                SinkCall::Text("hi".to_string())
            ]
        );
    }

    #[test]
    fn test_failing_sink_records_nothing() {
        let sink = RecordingKeystrokeSink::failing();
        assert!(sink.press(VirtualKey::new(0x41)).is_err());
        assert!(sink.calls().is_empty());
    }
}
