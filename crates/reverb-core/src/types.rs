//! Common types for the reverb stage
//!
//! Fundamental audio types shared by the loader, the audio path and the
//! spatialization collaborators: B-format channel identifiers, reverberation
//! orders and the decibel gain law.

use serde::{Deserialize, Serialize};

/// Default host sample rate (48kHz - standard professional audio rate)
/// The actual rate is reported by the spatialization core at runtime.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of B-format channels (W, X, Y, Z)
pub const NUM_BFORMAT_CHANNELS: usize = 4;

/// Default maximum block size the audio path pre-allocates scratch for
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Audio sample type
pub type Sample = f32;

/// First-order ambisonic channel identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BFormatChannel {
    W = 0,
    X = 1,
    Y = 2,
    Z = 3,
}

impl BFormatChannel {
    /// All channels in FuMa order
    pub const ALL: [BFormatChannel; NUM_BFORMAT_CHANNELS] = [
        BFormatChannel::W,
        BFormatChannel::X,
        BFormatChannel::Y,
        BFormatChannel::Z,
    ];

    /// Convert from index (0-3) to a channel
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Channel index (0-3)
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get the name of this channel
    pub fn name(&self) -> &'static str {
        match self {
            BFormatChannel::W => "W",
            BFormatChannel::X => "X",
            BFormatChannel::Y => "Y",
            BFormatChannel::Z => "Z",
        }
    }
}

/// Which B-format channels take part in the reverb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReverberationOrder {
    /// Omnidirectional only (W)
    Adimensional,
    /// Horizontal plane (W, X, Y)
    #[default]
    Bidimensional,
    /// Full sphere (W, X, Y, Z)
    Threedimensional,
}

impl ReverberationOrder {
    /// Whether the given channel contributes at this order
    pub fn includes(self, channel: BFormatChannel) -> bool {
        match self {
            ReverberationOrder::Adimensional => channel == BFormatChannel::W,
            ReverberationOrder::Bidimensional => channel != BFormatChannel::Z,
            ReverberationOrder::Threedimensional => true,
        }
    }

    /// Number of channels taking part at this order
    pub fn channel_count(self) -> usize {
        BFormatChannel::ALL.iter().filter(|&&ch| self.includes(ch)).count()
    }
}

/// Convert decibels to linear gain (`10^(db/20)`)
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Root-mean-square level of a block (0.0 for an empty block)
#[inline]
pub fn rms(samples: &[Sample]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
