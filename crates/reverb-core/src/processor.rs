//! Real-time reverb processing
//!
//! [`ReverbProcessor`] lives on the audio thread. Both entry points are
//! allocation-free and never block:
//!
//! - [`process`](ReverbProcessor::process) decodes the environment's encoded
//!   state straight to stereo
//! - [`process_ambisonic`](ReverbProcessor::process_ambisonic) decodes a
//!   4-channel B-format input and adds the result onto channels 0/1
//!
//! While a BRIR load is in progress, or when the reverb is disabled, every
//! output channel is cleared and the meter reads 0.

use std::sync::Arc;

use basedrop::Owned;

use crate::loader::EnvironmentHandoff;
use crate::meter::PowerMeter;
use crate::params::ReverbParameters;
use crate::spatial::{ReverbEnvironment, SpatialCore};
use crate::types::{rms, BFormatChannel, Sample, NUM_BFORMAT_CHANNELS};

/// Audio-thread half of the reverb stage
pub struct ReverbProcessor<C: SpatialCore> {
    core: Arc<C>,
    params: Arc<ReverbParameters>,
    handoff: Arc<EnvironmentHandoff<C::Environment>>,
    meter: Arc<PowerMeter>,
    /// Environment currently rendering; replaced wholesale at block boundaries
    environment: Owned<C::Environment>,
    scratch_left: Vec<Sample>,
    scratch_right: Vec<Sample>,
}

impl<C: SpatialCore> ReverbProcessor<C> {
    pub(crate) fn new(
        core: Arc<C>,
        params: Arc<ReverbParameters>,
        handoff: Arc<EnvironmentHandoff<C::Environment>>,
        meter: Arc<PowerMeter>,
        environment: Owned<C::Environment>,
        max_block_size: usize,
    ) -> Self {
        let capacity = max_block_size.min(core.max_block_size()).max(1);
        Self {
            core,
            params,
            handoff,
            meter,
            environment,
            scratch_left: vec![0.0; capacity],
            scratch_right: vec![0.0; capacity],
        }
    }

    /// Adopt a newly published environment
    ///
    /// The displaced environment goes to the deferred collector.
    #[inline]
    fn adopt_published(&mut self) {
        if let Some(environment) = self.handoff.try_take() {
            self.environment = environment;
        }
    }

    /// Whether this block renders; adopts a pending environment if it does
    #[inline]
    fn begin_block(&mut self) -> bool {
        if self.handoff.is_loading() || !self.params.enabled() {
            return false;
        }
        self.adopt_published();
        self.core
            .set_reverb_distance_attenuation_db(self.params.distance_attenuation_db());
        true
    }

    #[inline]
    fn silence(&self, output: &mut [&mut [Sample]]) {
        for channel in output.iter_mut() {
            channel.fill(0.0);
        }
        self.meter.store(0.0);
    }

    /// Apply the level gain to `left`/`right` and publish the meter reading
    #[inline]
    fn finish_block(&self, left: &mut [Sample], right: &mut [Sample]) {
        let gain = self.params.level_gain();
        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample *= gain;
        }
        self.meter.store(rms(left));
    }

    /// Direct stereo decode of the encoded state into channels 0/1
    pub fn process(&mut self, output: &mut [&mut [Sample]]) {
        if !self.begin_block() {
            self.silence(output);
            return;
        }

        let [left, right, ..] = output else {
            self.silence(output);
            return;
        };
        let frames = left.len().min(right.len());
        let (left, right) = (&mut left[..frames], &mut right[..frames]);

        let written = self
            .environment
            .process_virtual_ambisonic_reverb(left, right);
        if written == 0 {
            self.silence(output);
            return;
        }
        left[written..].fill(0.0);
        right[written..].fill(0.0);

        self.finish_block(left, right);
    }

    /// Decode a W, X, Y, Z input and add the result onto channels 0/1
    ///
    /// Channels 0/1 may already carry a dry signal; it is scaled together
    /// with the reverb by the level gain.
    pub fn process_ambisonic(&mut self, input: &[&[Sample]], output: &mut [&mut [Sample]]) {
        debug_assert_eq!(input.len(), NUM_BFORMAT_CHANNELS);

        if !self.begin_block() {
            self.silence(output);
            return;
        }

        let [left, right, ..] = output else {
            self.silence(output);
            return;
        };
        let frames = input
            .iter()
            .take(NUM_BFORMAT_CHANNELS)
            .map(|channel| channel.len())
            .fold(left.len().min(right.len()), usize::min);
        let chunk_capacity = self.scratch_left.len();

        for (channel, samples) in BFormatChannel::ALL.iter().zip(input) {
            let mut offset = 0;
            while offset < frames {
                let end = (offset + chunk_capacity).min(frames);
                let len = end - offset;
                let written = self.environment.process_encoded_channel_reverb(
                    *channel,
                    &samples[offset..end],
                    &mut self.scratch_left[..len],
                    &mut self.scratch_right[..len],
                );
                if written == 0 {
                    self.silence(output);
                    return;
                }
                for (dst, src) in left[offset..offset + written]
                    .iter_mut()
                    .zip(&self.scratch_left[..written])
                {
                    *dst += *src;
                }
                for (dst, src) in right[offset..offset + written]
                    .iter_mut()
                    .zip(&self.scratch_right[..written])
                {
                    *dst += *src;
                }
                offset = end;
            }
        }

        self.finish_block(&mut left[..frames], &mut right[..frames]);
    }

    /// Add a source's B-format contribution for the next [`process`](Self::process) call
    ///
    /// Returns the number of samples accepted: 0 while a load is in progress,
    /// at most [`max_block_size`](Self::max_block_size) otherwise.
    pub fn feed_encoded(&mut self, channel: BFormatChannel, samples: &[Sample]) -> usize {
        if self.handoff.is_loading() {
            return 0;
        }
        self.adopt_published();
        self.environment.feed_encoded(channel, samples)
    }

    /// Largest block fed or decoded in one piece
    ///
    /// [`process_ambisonic`](Self::process_ambisonic) splits longer blocks;
    /// [`feed_encoded`](Self::feed_encoded) drops samples past this length.
    pub fn max_block_size(&self) -> usize {
        self.scratch_left.len()
    }

    /// Whether the output is currently forced silent by a load
    pub fn is_loading(&self) -> bool {
        self.handoff.is_loading()
    }

    /// Environment currently rendering
    pub fn environment(&self) -> &C::Environment {
        &self.environment
    }

    pub fn params(&self) -> &Arc<ReverbParameters> {
        &self.params
    }

    pub fn meter(&self) -> &Arc<PowerMeter> {
        &self.meter
    }
}
