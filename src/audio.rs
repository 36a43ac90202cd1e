//! Audio decode and playback module
//!
//! Synthesized speech arrives as base64 encoded 16-bit little-endian PCM,
//! mono, 24 kHz. This module turns that payload into normalized `f32`
//! samples and plays them through PulseAudio's simple API.

use async_trait::async_trait;
use base64::engine::general_purpose;
use base64::Engine;
use libpulse_binding::error::PAErr;
use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DEFAULT_SAMPLE_RATE;

/// Divisor mapping i16 onto [-1.0, 1.0)
const PCM_SCALE: f32 = 32768.0;

/// Custom error for audio operations
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// Payload was not valid base64
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// 16-bit PCM needs an even number of bytes
    #[error("malformed PCM payload: {0} bytes is not a whole number of samples")]
    OddLength(usize),

    /// Sample count does not divide into whole frames
    #[error("malformed PCM payload: {samples} samples do not fill {channels}-channel frames")]
    PartialFrame { samples: usize, channels: u8 },

    #[error("unsupported sample spec: {rate} Hz, {channels} channels")]
    InvalidSpec { rate: u32, channels: u8 },

    #[error("PulseAudio error: {0}")]
    Pulse(#[from] PAErr),

    #[error("playback error: {0}")]
    Playback(String),
}

/// Decoded, normalized audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Interleaved samples in [-1.0, 1.0)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u8,
}

impl SampleBuffer {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Converts back to 16-bit PCM, saturating at the i16 range.
    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| (s * PCM_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect()
    }
}

/// Decodes base64 16-bit PCM payloads at a fixed sample rate and channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDecoder {
    pub sample_rate: u32,
    pub channels: u8,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }
}

impl AudioDecoder {
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn decode(&self, payload: &str) -> Result<SampleBuffer, AudioError> {
        decode(payload, self.sample_rate, self.channels)
    }
}

/// Decode a base64 payload of 16-bit little-endian PCM into normalized samples.
pub fn decode(payload: &str, sample_rate: u32, channels: u8) -> Result<SampleBuffer, AudioError> {
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    decode_pcm16(&bytes, sample_rate, channels)
}

/// Reinterpret raw 16-bit little-endian PCM bytes as normalized samples.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u8) -> Result<SampleBuffer, AudioError> {
    if sample_rate == 0 || channels == 0 {
        return Err(AudioError::InvalidSpec {
            rate: sample_rate,
            channels,
        });
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::OddLength(bytes.len()));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM_SCALE)
        .collect();

    if samples.len() % channels as usize != 0 {
        return Err(AudioError::PartialFrame {
            samples: samples.len(),
            channels,
        });
    }

    debug!(
        "Decoded {} bytes into {} samples at {} Hz",
        bytes.len(),
        samples.len(),
        sample_rate
    );

    Ok(SampleBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Host audio output. `play` resolves once the buffer has finished playing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, buffer: SampleBuffer) -> Result<(), AudioError>;
}

/// Plays audio through PulseAudio's simple API. The blocking write and drain
/// run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct PulsePlayback {
    app_name: String,
    /// Sink name, `None` for the default output
    device_name: Option<String>,
}

impl PulsePlayback {
    /// Create a playback handle on the default output device.
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            device_name: None,
        }
    }

    /// Create a playback handle on a specific sink.
    pub fn with_device(app_name: &str, device_name: &str) -> Self {
        info!("Using audio output device: {}", device_name);
        Self {
            app_name: app_name.to_string(),
            device_name: Some(device_name.to_string()),
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    fn play_blocking(
        app_name: &str,
        device_name: Option<&str>,
        buffer: &SampleBuffer,
    ) -> Result<(), AudioError> {
        let spec = Spec {
            format: Format::F32le,
            channels: buffer.channels,
            rate: buffer.sample_rate,
        };
        if !spec.is_valid() {
            return Err(AudioError::InvalidSpec {
                rate: buffer.sample_rate,
                channels: buffer.channels,
            });
        }

        let simple = Simple::new(
            None,     // default server
            app_name, // application name
            Direction::Playback,
            device_name,
            "speech", // stream description
            &spec,
            None, // default channel map
            None, // default buffering
        )?;

        let bytes: Vec<u8> = buffer
            .samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        simple.write(&bytes)?;
        // Blocks until the server has played everything
        simple.drain()?;
        Ok(())
    }
}

#[async_trait]
impl AudioSink for PulsePlayback {
    async fn play(&self, buffer: SampleBuffer) -> Result<(), AudioError> {
        if buffer.is_empty() {
            return Ok(());
        }

        let app_name = self.app_name.clone();
        let device_name = self.device_name.clone();
        let duration = buffer.duration();
        debug!("Playing {:?} of audio", duration);

        tokio::task::spawn_blocking(move || {
            Self::play_blocking(&app_name, device_name.as_deref(), &buffer)
        })
        .await
        .map_err(|e| AudioError::Playback(e.to_string()))?
    }
}
