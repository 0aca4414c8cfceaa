//! Spatialization core seam
//!
//! The reverb stage does not own the spatialization math. It talks to a
//! spatialization core through two traits:
//!
//! - [`SpatialCore`]: process-wide engine shared by the loader (environment
//!   creation, host sample rate) and the audio thread (distance attenuation)
//! - [`ReverbEnvironment`]: one installed BRIR plus its convolution state,
//!   owned by exactly one thread at a time
//!
//! [`ConvolutionCore`] is the reference implementation used by the render tool
//! and the tests.

mod convolution;
mod partitioned;

pub use convolution::{ConvolutionCore, ConvolutionEnvironment};
pub use partitioned::PARTITION_LEN;

use crate::error::LoadResult;
use crate::types::{BFormatChannel, ReverberationOrder, Sample};

/// Reverb state built from a BRIR
///
/// Environments are created empty by [`SpatialCore::create_environment`],
/// populated by a format decoder on the loader thread, then handed to the
/// audio thread. All `process_*` methods are called from the audio thread and
/// must not allocate or block.
pub trait ReverbEnvironment: Send + 'static {
    /// Select which B-format channels take part in the reverb
    fn set_reverberation_order(&mut self, order: ReverberationOrder);

    fn reverberation_order(&self) -> ReverberationOrder;

    /// Install the left/right impulse responses for one B-format channel
    fn install_channel_response(
        &mut self,
        channel: BFormatChannel,
        left: Vec<Sample>,
        right: Vec<Sample>,
    ) -> LoadResult<()>;

    /// Finish installation; the environment renders only after this succeeds
    fn end_setup(&mut self) -> LoadResult<()>;

    /// Whether a complete BRIR is installed
    fn has_brir(&self) -> bool;

    /// Add a source's B-format contribution to the internally encoded state
    ///
    /// Returns how many samples were accepted; anything past the core's
    /// [`max_block_size`](SpatialCore::max_block_size) is dropped.
    fn feed_encoded(&mut self, channel: BFormatChannel, input: &[Sample]) -> usize;

    /// Decode the internally encoded state to stereo, consuming it
    ///
    /// Returns the number of samples written, 0 when no BRIR is installed.
    fn process_virtual_ambisonic_reverb(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> usize;

    /// Decode a single encoded channel to stereo, overwriting `left`/`right`
    ///
    /// Returns the number of samples written, 0 when no BRIR is installed.
    fn process_encoded_channel_reverb(
        &mut self,
        channel: BFormatChannel,
        input: &[Sample],
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> usize;
}

/// Process-wide spatialization engine
pub trait SpatialCore: Send + Sync + 'static {
    type Environment: ReverbEnvironment;

    /// Create an empty environment (no BRIR installed)
    fn create_environment(&self) -> Self::Environment;

    /// Sample rate the host is running at
    fn sample_rate(&self) -> u32;

    /// Largest block its environments buffer between two decodes
    fn max_block_size(&self) -> usize;

    /// Reverb distance attenuation register, in dB per doubling of distance
    fn reverb_distance_attenuation_db(&self) -> f32;

    /// Write the reverb distance attenuation register (called per block)
    fn set_reverb_distance_attenuation_db(&self, db: f32);
}
