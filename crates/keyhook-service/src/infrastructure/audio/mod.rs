//! Audio output for the `play_sound` action.
//!
//! Clips are decoded with `symphonia` (WAV, MP3, FLAC, Ogg Vorbis, AIFF and
//! the rest of its formats) into interleaved `f32` samples, then rendered to
//! whatever channel count and sample rate the output device wants.
//! Playback is blocking; callers run it on a blocking worker.
//!
//! # Detached playback
//!
//! When an action does not wait for completion, its playback outlives the
//! action.  [`PlaybackRegistry`] caps how many such detached playbacks may
//! run at once; a request over the cap is rejected instead of queued.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[cfg(target_os = "windows")]
pub mod windows;

/// Error type for audio decoding and playback.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read audio file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] SymphoniaError),
    #[error("audio file has no playable track")]
    NoTrack,
    #[error("audio file is truncated: {decoded} of {expected} frames decoded")]
    Truncated { expected: u64, decoded: u64 },
    #[error("audio file contains no samples")]
    Empty,
    #[error("no default audio output device")]
    NoOutputDevice,
    #[error("audio output device {0} not found")]
    DeviceNotFound(i32),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("audio output is not supported on {0}")]
    Unsupported(&'static str),
}

/// Decoded audio, interleaved `f32` samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioClip {
    /// Decodes an audio file of any format `symphonia` recognises.  The
    /// extension is only a hint; the container is detected from its content.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Decode`] for unreadable or unsupported files,
    /// [`AudioError::Truncated`] when fewer frames decode than the header
    /// declares, and [`AudioError::Empty`] for files without samples.
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path)?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoTrack)?;
        let track_id = track.id;
        let expected_frames = track.codec_params.n_frames;
        let mut channels = track.codec_params.channels.map_or(0, |c| c.count() as u16);
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
        debug!(
            path = %path.display(),
            sample_rate,
            channels,
            frames = ?expected_frames,
            "decoding audio clip"
        );

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            if packet.buf().is_empty() {
                break;
            }
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder.decode(&packet)?;
            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            sample_rate = spec.rate;
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        if samples.is_empty() || channels == 0 {
            return Err(AudioError::Empty);
        }

        let decoded = (samples.len() / channels as usize) as u64;
        if let Some(expected) = expected_frames {
            if decoded < expected {
                warn!(path = %path.display(), expected, decoded, "audio file ends early");
                return Err(AudioError::Truncated { expected, decoded });
            }
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Renders the clip for an output with `out_channels` channels at
    /// `out_rate` Hz, scaled by `volume` (clamped to `0..=1`).
    ///
    /// Channels are mapped by index modulo the source count, so mono fans
    /// out to every output channel.  Resampling is linear.
    pub fn render(&self, out_channels: u16, out_rate: u32, volume: f32) -> Vec<f32> {
        let volume = clamp_volume(volume);
        let in_channels = self.channels.max(1) as usize;
        let out_channels = out_channels.max(1) as usize;
        let in_frames = self.frames();
        if in_frames == 0 || out_rate == 0 || self.sample_rate == 0 {
            return Vec::new();
        }

        let ratio = self.sample_rate as f64 / out_rate as f64;
        let out_frames = ((in_frames as f64) / ratio).ceil() as usize;
        let mut out = Vec::with_capacity(out_frames * out_channels);

        for frame in 0..out_frames {
            let position = frame as f64 * ratio;
            let base = (position.floor() as usize).min(in_frames - 1);
            let next = (base + 1).min(in_frames - 1);
            let fraction = (position - base as f64) as f32;
            for channel in 0..out_channels {
                let source = channel % in_channels;
                let a = self.samples[base * in_channels + source];
                let b = self.samples[next * in_channels + source];
                out.push((a + (b - a) * fraction) * volume);
            }
        }
        out
    }
}

/// Clamps a configured volume into `0..=1`; NaN becomes silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Blocking audio output.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    /// Plays `clip` to completion on the given device (`-1` = default).
    fn play_blocking(&self, clip: &AudioClip, volume: f32, device_number: i32) -> Result<(), AudioError>;
}

/// Returns the audio output for the current platform.
pub fn platform_output() -> Arc<dyn AudioOutput> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(self::windows::CpalAudioOutput::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(UnsupportedAudioOutput)
    }
}

#[cfg(not(target_os = "windows"))]
struct UnsupportedAudioOutput;

#[cfg(not(target_os = "windows"))]
impl AudioOutput for UnsupportedAudioOutput {
    fn play_blocking(&self, _clip: &AudioClip, _volume: f32, _device_number: i32) -> Result<(), AudioError> {
        Err(AudioError::Unsupported(std::env::consts::OS))
    }
}

/// Bounded set of detached playbacks.
///
/// A reservation holds one slot until it is dropped, which happens when the
/// detached playback task finishes.
#[derive(Debug, Clone)]
pub struct PlaybackRegistry {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied slot of a [`PlaybackRegistry`].
#[derive(Debug)]
pub struct PlaybackSlot {
    _permit: OwnedSemaphorePermit,
}

impl PlaybackRegistry {
    /// Capacity is clamped to what a semaphore can hold.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Claims a slot, or `None` when `capacity` playbacks are already running.
    pub fn try_reserve(&self) -> Option<PlaybackSlot> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| PlaybackSlot { _permit: permit })
    }

    /// Number of detached playbacks currently running.
    pub fn active(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(samples: Vec<f32>, channels: u16, sample_rate: u32) -> AudioClip {
        AudioClip {
            samples,
            channels,
            sample_rate,
        }
    }

    fn write_wav(path: &Path, samples: &[i16], channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    #[test]
    fn test_load_decodes_int_wav_to_unit_range() {
        // Arrange
        let path = std::env::temp_dir().join(format!("keyhook_clip_{}.wav", uuid::Uuid::new_v4()));
        write_wav(&path, &[0, i16::MAX, i16::MIN, 0], 2);

        // Act
        let loaded = AudioClip::load(&path).expect("load");

        // Assert
        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.sample_rate, 8000);
        assert_eq!(loaded.frames(), 2);
        assert!(loaded.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert_eq!(loaded.samples[2], -1.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_unrecognised_file() {
        let path = std::env::temp_dir().join(format!("keyhook_clip_{}.wav", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"definitely not an audio file").unwrap();

        let result = AudioClip::load(&path);

        assert!(matches!(result, Err(AudioError::Decode(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_detects_format_from_content() {
        // Arrange: a WAV stream saved under a non-WAV name
        let path = std::env::temp_dir().join(format!("keyhook_clip_{}.snd", uuid::Uuid::new_v4()));
        write_wav(&path, &[100, -100, 200, -200], 1);

        // Act
        let loaded = AudioClip::load(&path).expect("load");

        // Assert
        assert_eq!(loaded.channels, 1);
        assert_eq!(loaded.frames(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_reports_truncated_file() {
        // Arrange: header declares 4000 frames, the data chunk is cut short
        let path = std::env::temp_dir().join(format!("keyhook_clip_{}.wav", uuid::Uuid::new_v4()));
        write_wav(&path, &vec![1000i16; 4000], 1);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3000]).unwrap();

        // Act
        let result = AudioClip::load(&path);

        // Assert
        assert!(
            matches!(result, Err(AudioError::Truncated { expected: 4000, .. }) | Err(AudioError::Decode(_))),
            "got {result:?}"
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("keyhook_absent_{}.wav", uuid::Uuid::new_v4()));

        assert!(matches!(AudioClip::load(&path), Err(AudioError::Io(_))));
    }

    #[test]
    fn test_duration_from_frames_and_rate() {
        let c = clip(vec![0.0; 16000], 2, 8000);
        assert_eq!(c.duration(), Duration::from_secs(1));
    }

    // ── Rendering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_render_mono_fans_out_to_stereo() {
        let c = clip(vec![0.5, -0.5], 1, 100);

        let out = c.render(2, 100, 1.0);

        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_render_applies_clamped_volume() {
        let c = clip(vec![1.0], 1, 100);
        assert_eq!(c.render(1, 100, 0.25), vec![0.25]);
        assert_eq!(c.render(1, 100, 3.0), vec![1.0]);
        assert_eq!(c.render(1, 100, -1.0), vec![0.0]);
    }

    #[test]
    fn test_render_upsampling_doubles_frames_and_interpolates() {
        // Arrange
        let c = clip(vec![0.0, 1.0], 1, 100);

        // Act
        let out = c.render(1, 200, 1.0);

        // Assert
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn test_clamp_volume_handles_nan() {
        assert_eq!(clamp_volume(f32::NAN), 0.0);
        assert_eq!(clamp_volume(0.7), 0.7);
    }

    // ── Playback registry ─────────────────────────────────────────────────────

    #[test]
    fn test_registry_rejects_reservations_over_capacity() {
        // Arrange
        let registry = PlaybackRegistry::new(2);

        // Act
        let first = registry.try_reserve();
        let second = registry.try_reserve();
        let third = registry.try_reserve();

        // Assert
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(third.is_none());
        assert_eq!(registry.active(), 2);
    }

    #[test]
    fn test_registry_frees_slot_when_reservation_dropped() {
        let registry = PlaybackRegistry::new(1);
        let slot = registry.try_reserve().expect("slot");
        assert!(registry.try_reserve().is_none());

        drop(slot);

        assert_eq!(registry.active(), 0);
        assert!(registry.try_reserve().is_some());
    }

    #[test]
    fn test_registry_capacity_is_clamped_to_semaphore_limit() {
        let registry = PlaybackRegistry::new(usize::MAX);

        assert_eq!(registry.capacity(), Semaphore::MAX_PERMITS);
        assert_eq!(registry.active(), 0);
    }
}
