//! Block-by-block offline rendering

use anyhow::{bail, Result};
use reverb_core::spatial::ConvolutionEnvironment;
use reverb_core::{BFormatChannel, ConvolutionCore, ReverbProcessor, NUM_BFORMAT_CHANNELS};

use crate::args::RenderMode;
use crate::wav::AudioBuffer;

/// Frames handed to the processor per call
pub const RENDER_BLOCK: usize = 512;

/// Longest installed impulse response, in samples
fn tail_len(environment: &ConvolutionEnvironment) -> usize {
    BFormatChannel::ALL
        .iter()
        .filter_map(|channel| environment.response_len(*channel))
        .max()
        .unwrap_or(0)
}

/// Zero-pad `samples` to `len`
fn padded(samples: &[f32], len: usize) -> Vec<f32> {
    let mut out = samples.to_vec();
    out.resize(len, 0.0);
    out
}

/// Render `input` through `processor`, including the reverb tail
///
/// Blocks longer than the processor's capacity are shortened to fit.
pub fn render(
    processor: &mut ReverbProcessor<ConvolutionCore>,
    input: &AudioBuffer,
    mode: RenderMode,
    block_size: usize,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let frames = input.frames();
    let total = frames + tail_len(processor.environment()).saturating_sub(1);
    let block_size = block_size.min(processor.max_block_size()).max(1);

    let mut left = vec![0.0; total];
    let mut right = vec![0.0; total];

    match mode {
        RenderMode::Stereo => {
            let gain = 1.0 / input.channels.len() as f32;
            let mut mono = vec![0.0; total];
            for channel in &input.channels {
                for (dst, src) in mono.iter_mut().zip(channel) {
                    *dst += src * gain;
                }
            }

            for start in (0..total).step_by(block_size) {
                let end = (start + block_size).min(total);
                processor.feed_encoded(BFormatChannel::W, &mono[start..end]);
                processor.process(&mut [&mut left[start..end], &mut right[start..end]]);
            }
        }
        RenderMode::Ambisonic => {
            if input.channels.len() != NUM_BFORMAT_CHANNELS {
                bail!(
                    "Ambisonic mode needs a {}-channel (W, X, Y, Z) input, got {} channels",
                    NUM_BFORMAT_CHANNELS,
                    input.channels.len()
                );
            }
            let bformat: Vec<Vec<f32>> = input
                .channels
                .iter()
                .map(|channel| padded(channel, total))
                .collect();

            for start in (0..total).step_by(block_size) {
                let end = (start + block_size).min(total);
                let block: [&[f32]; NUM_BFORMAT_CHANNELS] =
                    std::array::from_fn(|i| &bformat[i][start..end]);
                processor.process_ambisonic(
                    &block,
                    &mut [&mut left[start..end], &mut right[start..end]],
                );
            }
        }
    }

    Ok((left, right))
}
