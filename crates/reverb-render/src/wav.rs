//! WAV file I/O

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Deinterleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Read a WAV file as f32 channels (integer formats scaled to ±1.0)
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open WAV file: {:?}", path))?;
    let spec = reader.spec();
    let channel_count = spec.channels as usize;
    if channel_count == 0 {
        bail!("{:?} has no channels", path);
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .with_context(|| format!("Failed to read samples from {:?}", path))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to read samples from {:?}", path))?
        }
    };

    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }

    log::debug!(
        "Read {:?}: {} channels, {} frames @ {}Hz",
        path,
        channel_count,
        channels[0].len(),
        spec.sample_rate
    );
    Ok(AudioBuffer {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Write a stereo 32-bit float WAV file
pub fn write_stereo_wav(path: &Path, sample_rate: u32, left: &[f32], right: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for (l, r) in left.iter().zip(right) {
        writer.write_sample(*l).context("Failed to write WAV sample")?;
        writer.write_sample(*r).context("Failed to write WAV sample")?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}
