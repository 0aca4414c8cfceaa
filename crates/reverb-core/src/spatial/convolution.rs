//! Reference spatialization core: partitioned B-format convolution
//!
//! Each B-format channel is convolved with its own left/right impulse
//! response and the results are summed to stereo. Channels outside the
//! configured reverberation order contribute silence.
//!
//! Convolution runs in the frequency domain on [`PARTITION_LEN`]-sample
//! partitions (see [`partitioned`](super::partitioned)), so a multi-second
//! concert hall costs a handful of FFTs per block rather than one
//! multiply-add per tap and sample.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::params::DISTANCE_ATTENUATION_RANGE;
use crate::types::{BFormatChannel, ReverberationOrder, Sample, MAX_BLOCK_SIZE, NUM_BFORMAT_CHANNELS};

use super::partitioned::{PartitionedConvolver, PARTITION_LEN};
use super::{ReverbEnvironment, SpatialCore};

/// Registers shared between the core and every environment it created
#[derive(Debug)]
struct CoreRegisters {
    sample_rate: u32,
    /// f32 bits, dB per doubling of distance
    distance_attenuation_db: AtomicU32,
}

/// Reference [`SpatialCore`] producing [`ConvolutionEnvironment`]s
#[derive(Debug, Clone)]
pub struct ConvolutionCore {
    registers: Arc<CoreRegisters>,
    /// Capacity of each environment's encoded input bus
    max_block_size: usize,
}

impl ConvolutionCore {
    /// Create a core running at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self::with_block_size(sample_rate, MAX_BLOCK_SIZE)
    }

    /// Create a core whose environments buffer up to `max_block_size` encoded samples
    pub fn with_block_size(sample_rate: u32, max_block_size: usize) -> Self {
        Self {
            registers: Arc::new(CoreRegisters {
                sample_rate,
                distance_attenuation_db: AtomicU32::new(
                    DISTANCE_ATTENUATION_RANGE.default.to_bits(),
                ),
            }),
            max_block_size: max_block_size.max(1),
        }
    }
}

impl SpatialCore for ConvolutionCore {
    type Environment = ConvolutionEnvironment;

    fn create_environment(&self) -> ConvolutionEnvironment {
        ConvolutionEnvironment::new(self.max_block_size)
    }

    fn sample_rate(&self) -> u32 {
        self.registers.sample_rate
    }

    fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn reverb_distance_attenuation_db(&self) -> f32 {
        f32::from_bits(self.registers.distance_attenuation_db.load(Ordering::Relaxed))
    }

    fn set_reverb_distance_attenuation_db(&self, db: f32) {
        self.registers
            .distance_attenuation_db
            .store(db.to_bits(), Ordering::Relaxed);
    }
}

/// Encoded input waiting for the next virtual ambisonic decode
struct EncodedBus {
    samples: Vec<Sample>,
    len: usize,
}

/// Reference [`ReverbEnvironment`] using partitioned FFT convolution
pub struct ConvolutionEnvironment {
    order: ReverberationOrder,
    convolvers: [Option<PartitionedConvolver>; NUM_BFORMAT_CHANNELS],
    encoded: [EncodedBus; NUM_BFORMAT_CHANNELS],
    ready: bool,
}

impl ConvolutionEnvironment {
    fn new(max_block_size: usize) -> Self {
        Self {
            order: ReverberationOrder::default(),
            convolvers: std::array::from_fn(|_| None),
            encoded: std::array::from_fn(|_| EncodedBus {
                samples: vec![0.0; max_block_size],
                len: 0,
            }),
            ready: false,
        }
    }

    /// Impulse response length of a channel, if installed
    pub fn response_len(&self, channel: BFormatChannel) -> Option<usize> {
        self.convolvers[channel.index()]
            .as_ref()
            .map(PartitionedConvolver::response_len)
    }

    /// Encoded samples accepted per channel between two virtual decodes
    pub fn encoded_capacity(&self) -> usize {
        self.encoded[0].samples.len()
    }
}

impl ReverbEnvironment for ConvolutionEnvironment {
    fn set_reverberation_order(&mut self, order: ReverberationOrder) {
        self.order = order;
    }

    fn reverberation_order(&self) -> ReverberationOrder {
        self.order
    }

    fn install_channel_response(
        &mut self,
        channel: BFormatChannel,
        left: Vec<Sample>,
        right: Vec<Sample>,
    ) -> LoadResult<()> {
        let len = left.len().max(right.len());
        if len == 0 {
            return Err(LoadError::DecodeFailure(format!(
                "empty impulse response for channel {}",
                channel.name()
            )));
        }

        let convolver = PartitionedConvolver::new(&left, &right);
        log::trace!(
            "Installed {} response: {} samples in {} partitions",
            channel.name(),
            len,
            len.div_ceil(PARTITION_LEN)
        );
        self.convolvers[channel.index()] = Some(convolver);
        self.ready = false;
        Ok(())
    }

    fn end_setup(&mut self) -> LoadResult<()> {
        if self.convolvers[BFormatChannel::W.index()].is_none() {
            return Err(LoadError::DecodeFailure(
                "BRIR has no omnidirectional (W) response".to_string(),
            ));
        }
        self.ready = true;
        Ok(())
    }

    fn has_brir(&self) -> bool {
        self.ready
    }

    fn feed_encoded(&mut self, channel: BFormatChannel, input: &[Sample]) -> usize {
        let bus = &mut self.encoded[channel.index()];
        let n = input.len().min(bus.samples.len());
        for (dst, &src) in bus.samples[..n].iter_mut().zip(input) {
            *dst += src;
        }
        bus.len = bus.len.max(n);
        n
    }

    fn process_virtual_ambisonic_reverb(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> usize {
        if !self.ready {
            return 0;
        }
        let n = left.len().min(right.len());
        let (left, right) = (&mut left[..n], &mut right[..n]);
        left.fill(0.0);
        right.fill(0.0);

        let order = self.order;
        let Self {
            convolvers,
            encoded,
            ..
        } = self;

        for channel in BFormatChannel::ALL {
            let idx = channel.index();
            let bus = &mut encoded[idx];

            if order.includes(channel) {
                if let Some(convolver) = &mut convolvers[idx] {
                    // Unfed samples of the block count as silence
                    convolver.process(&bus.samples[..bus.len.min(n)], left, right, true);
                }
            }

            bus.samples[..bus.len].fill(0.0);
            bus.len = 0;
        }

        n
    }

    fn process_encoded_channel_reverb(
        &mut self,
        channel: BFormatChannel,
        input: &[Sample],
        left: &mut [Sample],
        right: &mut [Sample],
    ) -> usize {
        if !self.ready {
            return 0;
        }
        let n = input.len().min(left.len()).min(right.len());
        let (left, right) = (&mut left[..n], &mut right[..n]);

        match (&mut self.convolvers[channel.index()], self.order.includes(channel)) {
            (Some(convolver), true) => convolver.process(&input[..n], left, right, false),
            _ => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }

        n
    }
}
