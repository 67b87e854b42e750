//! `cpal` audio output for Windows.

#![cfg(target_os = "windows")]

use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{debug, error, warn};

use super::{AudioClip, AudioError, AudioOutput};

/// Extra time allowed past the clip length before giving up on the stream.
const COMPLETION_GRACE: Duration = Duration::from_secs(2);

/// [`AudioOutput`] that opens a fresh output stream per clip.
#[derive(Debug, Default)]
pub struct CpalAudioOutput;

impl CpalAudioOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalAudioOutput {
    fn play_blocking(&self, clip: &AudioClip, volume: f32, device_number: i32) -> Result<(), AudioError> {
        let host = cpal::default_host();
        let device = select_device(&host, device_number)?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        let config: cpal::StreamConfig = supported.config();

        let rendered = clip.render(config.channels, config.sample_rate.0, volume);
        debug!(
            device = device_number,
            channels = config.channels,
            sample_rate = config.sample_rate.0,
            samples = rendered.len(),
            "starting playback"
        );

        let (done_tx, done_rx) = mpsc::channel();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_output_stream::<f32>(&device, &config, rendered, done_tx),
            cpal::SampleFormat::I16 => build_output_stream::<i16>(&device, &config, rendered, done_tx),
            cpal::SampleFormat::U16 => build_output_stream::<u16>(&device, &config, rendered, done_tx),
            other => Err(AudioError::Stream(format!("unsupported sample format {other:?}"))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        if done_rx.recv_timeout(clip.duration() + COMPLETION_GRACE).is_err() {
            warn!(device = device_number, "playback did not signal completion in time");
        }
        Ok(())
    }
}

fn select_device(host: &cpal::Host, device_number: i32) -> Result<cpal::Device, AudioError> {
    if device_number < 0 {
        return host.default_output_device().ok_or(AudioError::NoOutputDevice);
    }
    host.output_devices()
        .map_err(|e| AudioError::Stream(e.to_string()))?
        .nth(device_number as usize)
        .ok_or(AudioError::DeviceNotFound(device_number))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rendered: Vec<f32>,
    done_tx: mpsc::Sender<()>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let err_fn = |err| {
        error!("audio stream error: {}", err);
    };

    let mut position = 0usize;
    let mut signalled = false;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    let value = rendered.get(position).copied().unwrap_or(0.0);
                    *sample = T::from_sample(value);
                    position += 1;
                }
                if position >= rendered.len() && !signalled {
                    signalled = true;
                    let _ = done_tx.send(());
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
