//! Audio device output for the stand-alone host

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Name, sample rate and channel count of the default output device
pub fn default_output_info() -> Result<(String, u32, u16), AudioOutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioOutputError::NoDevices)?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

    let name = device.name().unwrap_or_default();
    Ok((name, config.sample_rate().0, config.channels()))
}

/// Real-time output stream driven by a render callback.
///
/// The callback owns the engine; it runs on the device thread and receives
/// interleaved f32 frames plus the device sample rate and channel count.
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Open the default device. `block_size` requests a fixed buffer size
    /// when the device allows it.
    pub fn start<F>(block_size: Option<u32>, mut render: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();

        let mut config: StreamConfig = supported_config.into();
        if let Some(frames) = block_size {
            config.buffer_size = BufferSize::Fixed(frames);
        }

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if stop_clone.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    render(data, sample_rate, channels);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            ?block_size,
            "Started realtime output stream"
        );

        Ok(Self { stop_flag, sample_rate, channels, _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Silence the callback; the device keeps running until drop
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}
