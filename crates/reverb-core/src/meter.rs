//! Last-block power metering
//!
//! The audio thread stores the RMS level of each rendered block; the UI reads
//! it whenever it repaints. No averaging or smoothing happens here.

use std::sync::atomic::{AtomicU32, Ordering};

/// Lock-free bridge for the last block's RMS power
///
/// Audio thread writes, UI thread reads. The value is an f32 stored as bits.
#[derive(Debug, Default)]
pub struct PowerMeter {
    power: AtomicU32,
}

impl PowerMeter {
    pub fn new() -> Self {
        Self {
            power: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// RMS power of the last processed block
    #[inline]
    pub fn power(&self) -> f32 {
        f32::from_bits(self.power.load(Ordering::Relaxed))
    }

    /// Store the RMS power of the block just rendered
    #[inline]
    pub(crate) fn store(&self, power: f32) {
        self.power.store(power.to_bits(), Ordering::Relaxed);
    }
}
