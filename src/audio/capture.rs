use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::protocol::AudioFormat;

/// Writes the raw PCM streamed by a satellite to a WAV file
pub struct AudioCapture {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    file_path: PathBuf,
    width: u16,
    bytes_written: usize,
}

impl AudioCapture {
    /// Create `stt-<session_id>.wav` under `output_dir`
    pub fn create(output_dir: &Path, session_id: &str, format: AudioFormat) -> Result<Self> {
        let bits_per_sample = match format.width {
            2 => 16,
            4 => 32,
            other => bail!("Unsupported sample width for capture: {} bytes", other),
        };

        fs::create_dir_all(output_dir).context("Failed to create capture directory")?;

        let file_path = output_dir.join(format!("stt-{}.wav", session_id));
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.rate,
            bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        info!("Capturing session audio to {:?}", file_path);

        Ok(Self {
            writer: Some(writer),
            file_path,
            width: format.width,
            bytes_written: 0,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Append little-endian PCM bytes; a trailing partial sample is dropped
    pub fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let Some(writer) = &mut self.writer else {
            return Ok(());
        };

        match self.width {
            2 => {
                for sample in pcm.chunks_exact(2) {
                    writer
                        .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                        .context("Failed to write sample to WAV")?;
                }
            }
            _ => {
                for sample in pcm.chunks_exact(4) {
                    writer
                        .write_sample(i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]))
                        .context("Failed to write sample to WAV")?;
                }
            }
        }

        self.bytes_written += pcm.len();
        Ok(())
    }

    /// Finalize the WAV header and return the file path
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        info!("Captured {} bytes of audio to {:?}", self.bytes_written, self.file_path);
        Ok(self.file_path.clone())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
