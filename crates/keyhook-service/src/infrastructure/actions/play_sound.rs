//! `play_sound`: play an audio file (WAV, MP3, FLAC, Ogg and friends) on an
//! output device.
//!
//! Decoding and playback both block, so they run on tokio's blocking pool.
//! Without `wait_for_completion` the playback is detached: it holds a slot
//! in the [`PlaybackRegistry`] until it finishes, and a request made while
//! every slot is taken is rejected.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use keyhook_core::KeyEvent;
use tracing::{debug, warn};

use super::validate_existing_file;
use crate::application::action_registry::{
    Action, ActionContext, ActionError, ActionOutcome, ActionType, FieldSpec,
};
use crate::infrastructure::audio::{clamp_volume, AudioClip, AudioOutput, PlaybackRegistry};

/// Default output device.
pub const DEFAULT_DEVICE: i32 = -1;

/// Plays an audio file, optionally waiting for it to finish.
pub struct PlaySoundAction {
    pub file_path: String,
    /// `0.0..=1.0`.
    pub volume: f32,
    pub wait_for_completion: bool,
    /// Output device index, or [`DEFAULT_DEVICE`].
    pub device_number: i32,
    output: Arc<dyn AudioOutput>,
    playbacks: PlaybackRegistry,
}

static FIELDS: [FieldSpec<PlaySoundAction>; 4] = [
    FieldSpec::text("file_path", |a, v| a.file_path = v),
    FieldSpec::float("volume", |a, v| a.volume = clamp_volume(v as f32)),
    FieldSpec::boolean("wait_for_completion", |a, v| a.wait_for_completion = v),
    FieldSpec::integer("device_number", |a, v| {
        a.device_number = i32::try_from(v).unwrap_or(DEFAULT_DEVICE)
    }),
];

impl std::fmt::Debug for PlaySoundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaySoundAction")
            .field("file_path", &self.file_path)
            .field("volume", &self.volume)
            .field("wait_for_completion", &self.wait_for_completion)
            .field("device_number", &self.device_number)
            .finish_non_exhaustive()
    }
}

async fn load_clip(path: PathBuf) -> Result<AudioClip, ActionError> {
    tokio::task::spawn_blocking(move || AudioClip::load(&path))
        .await
        .map_err(|e| ActionError::Task(e.to_string()))?
        .map_err(ActionError::from)
}

#[async_trait]
impl Action for PlaySoundAction {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn validate(&self) -> Result<(), ActionError> {
        validate_existing_file(&self.file_path)
    }

    async fn execute(&self, _event: &KeyEvent) -> Result<ActionOutcome, ActionError> {
        self.validate()?;

        // Reserve before decoding so a saturated registry costs nothing.
        let slot = if self.wait_for_completion {
            None
        } else {
            let slot = self.playbacks.try_reserve().ok_or_else(|| ActionError::Saturated {
                active: self.playbacks.active(),
                limit: self.playbacks.capacity(),
            })?;
            Some(slot)
        };

        let clip = load_clip(PathBuf::from(&self.file_path)).await?;
        debug!(
            file = %self.file_path,
            duration_ms = clip.duration().as_millis() as u64,
            volume = self.volume,
            "playing sound"
        );

        let output = Arc::clone(&self.output);
        let volume = self.volume;
        let device = self.device_number;

        match slot {
            None => {
                tokio::task::spawn_blocking(move || output.play_blocking(&clip, volume, device))
                    .await
                    .map_err(|e| ActionError::Task(e.to_string()))??;
                Ok(ActionOutcome::Completed)
            }
            Some(slot) => {
                let file = self.file_path.clone();
                tokio::task::spawn_blocking(move || {
                    let _slot = slot;
                    if let Err(e) = output.play_blocking(&clip, volume, device) {
                        warn!(file = %file, "detached playback failed: {e}");
                    }
                });
                Ok(ActionOutcome::Detached)
            }
        }
    }
}

impl ActionType for PlaySoundAction {
    const TYPE_ID: &'static str = "play_sound";
    const DISPLAY_NAME: &'static str = "Play Sound";

    fn fields() -> &'static [FieldSpec<Self>] {
        &FIELDS
    }

    fn from_context(ctx: &ActionContext) -> Self {
        Self {
            file_path: String::new(),
            volume: 1.0,
            wait_for_completion: false,
            device_number: DEFAULT_DEVICE,
            output: Arc::clone(&ctx.audio),
            playbacks: ctx.playbacks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::action_registry::tests::test_event;
    use crate::infrastructure::audio::MockAudioOutput;
    use crate::infrastructure::keystroke::mock::RecordingKeystrokeSink;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::mpsc;
    use std::time::Duration;

    fn temp_wav() -> PathBuf {
        let path = std::env::temp_dir().join(format!("keyhook_sound_{}.wav", uuid::Uuid::new_v4()));
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for s in [0i16, 1000, -1000, 0] {
            writer.write_sample(s).expect("sample");
        }
        writer.finalize().expect("finalize");
        path
    }

    fn context(output: MockAudioOutput, capacity: usize) -> ActionContext {
        ActionContext::new(
            Arc::new(RecordingKeystrokeSink::new()),
            Arc::new(output),
            reqwest::Client::new(),
            PlaybackRegistry::new(capacity),
        )
    }

    fn action(ctx: &ActionContext, path: &Path, wait: bool) -> PlaySoundAction {
        let mut params = BTreeMap::new();
        params.insert("file_path".to_string(), Value::from(path.to_string_lossy().into_owned()));
        params.insert("wait_for_completion".to_string(), Value::from(wait));
        params.insert("volume".to_string(), Value::from(0.5));
        PlaySoundAction::build(ctx, &params)
    }

    #[test]
    fn test_defaults_and_volume_clamping() {
        let ctx = context(MockAudioOutput::new(), 1);
        let mut params = BTreeMap::new();
        params.insert("Volume".to_string(), Value::from(3.5));

        let action = PlaySoundAction::build(&ctx, &params);

        assert_eq!(action.volume, 1.0);
        assert_eq!(action.device_number, DEFAULT_DEVICE);
        assert!(!action.wait_for_completion);
    }

    #[test]
    fn test_validate_cites_missing_path() {
        let ctx = context(MockAudioOutput::new(), 1);
        let missing = std::env::temp_dir().join(format!("keyhook_nope_{}.wav", uuid::Uuid::new_v4()));

        let err = action(&ctx, &missing, true).validate().unwrap_err();

        assert!(err.to_string().contains(&*missing.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_waited_playback_passes_clip_volume_and_device() {
        // Arrange
        let path = temp_wav();
        let mut output = MockAudioOutput::new();
        output
            .expect_play_blocking()
            .withf(|clip, volume, device| clip.frames() == 4 && *volume == 0.5 && *device == -1)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = context(output, 1);

        // Act
        let outcome = action(&ctx, &path, true).execute(&test_event()).await;

        // Assert
        assert_eq!(outcome.expect("played"), ActionOutcome::Completed);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_configured_device_number_reaches_output() {
        // Arrange
        let path = temp_wav();
        let mut output = MockAudioOutput::new();
        output
            .expect_play_blocking()
            .withf(|_, _, device| *device == 3)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = context(output, 1);
        let mut params = BTreeMap::new();
        params.insert("FilePath".to_string(), Value::from(path.to_string_lossy().into_owned()));
        params.insert("WaitForCompletion".to_string(), Value::from(true));
        params.insert("DeviceNumber".to_string(), Value::from(3));
        let action = PlaySoundAction::build(&ctx, &params);

        // Act
        let outcome = action.execute(&test_event()).await;

        // Assert
        assert_eq!(outcome.expect("played"), ActionOutcome::Completed);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_undecodable_file_fails_without_touching_output() {
        let path = std::env::temp_dir().join(format!("keyhook_sound_{}.mp3", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not really an mp3").unwrap();
        let mut output = MockAudioOutput::new();
        output.expect_play_blocking().times(0);
        let ctx = context(output, 1);

        let result = action(&ctx, &path, true).execute(&test_event()).await;

        assert!(matches!(result, Err(ActionError::Audio(_))));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_detached_playback_over_capacity_is_rejected() {
        // Arrange
        let path = temp_wav();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let mut output = MockAudioOutput::new();
        output.expect_play_blocking().times(1).returning(move |_, _, _| {
            let _ = release_rx.lock().unwrap().recv_timeout(Duration::from_secs(2));
            Ok(())
        });
        let ctx = context(output, 1);
        let first = action(&ctx, &path, false);
        let second = action(&ctx, &path, false);

        // Act
        let first_outcome = first.execute(&test_event()).await;
        let second_outcome = second.execute(&test_event()).await;
        release_tx.send(()).expect("release");

        // Assert
        assert_eq!(first_outcome.expect("detached"), ActionOutcome::Detached);
        assert!(matches!(
            second_outcome,
            Err(ActionError::Saturated { active: 1, limit: 1 })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_playback_error_surfaces_when_waiting() {
        let path = temp_wav();
        let mut output = MockAudioOutput::new();
        output
            .expect_play_blocking()
            .returning(|_, _, _| Err(crate::infrastructure::audio::AudioError::NoOutputDevice));
        let ctx = context(output, 1);

        let result = action(&ctx, &path, true).execute(&test_event()).await;

        assert!(matches!(result, Err(ActionError::Audio(_))));
        let _ = std::fs::remove_file(&path);
    }
}
