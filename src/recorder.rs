//! Clip recorder for debugging - saves synthesized speech to the filesystem

use crate::audio::SampleBuffer;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub struct ClipRecorder {
    enabled: bool,
    base: PathBuf, // ./recordings/20250603_153055/
    next_clip: usize,
}

impl ClipRecorder {
    pub fn new(enabled: bool) -> Self {
        let ts = Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self::with_base(enabled, PathBuf::from("recordings").join(ts))
    }

    pub fn with_base(enabled: bool, base: PathBuf) -> Self {
        if enabled {
            if let Err(e) = fs::create_dir_all(&base) {
                error!("Failed to create recordings directory: {}", e);
            } else {
                info!("Recording enabled, saving to: {:?}", base);
            }
        }

        Self {
            enabled,
            base,
            next_clip: 0,
        }
    }

    /// Writes the clip as a 16-bit WAV plus the spoken text next to it.
    /// Returns the WAV path when something was written.
    pub fn on_clip(&mut self, text: &str, buffer: &SampleBuffer) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }

        let stem = format!("clip_{:03}_{}", self.next_clip, Local::now().format("%H%M%S%.3f"));
        self.next_clip += 1;

        let wav_path = self.base.join(format!("{}.wav", stem));
        if let Err(e) = write_wav(&wav_path, buffer) {
            error!("Failed to write {:?}: {}", wav_path, e);
            return None;
        }
        if let Err(e) = fs::write(self.base.join(format!("{}.txt", stem)), text) {
            error!("Failed to write clip text: {}", e);
        }

        debug!("Recorded clip {:?} ({:?})", wav_path, buffer.duration());
        Some(wav_path)
    }
}

/// Writes a buffer as 16-bit integer WAV.
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: buffer.channels as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in buffer.to_pcm16() {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}
