//! Reverb stage assembly
//!
//! Builds the control-side [`BrirLoader`], the audio-side [`ReverbProcessor`]
//! and the UI event queue around one shared parameter set, meter and
//! environment handoff.

use std::sync::Arc;

use crate::config::ReverbConfig;
use crate::format::FormatDecoders;
use crate::gc::owned;
use crate::loader::{event_channel, BrirLoader, EnvironmentHandoff, LoadEvents};
use crate::meter::PowerMeter;
use crate::params::ReverbParameters;
use crate::processor::ReverbProcessor;
use crate::spatial::{ReverbEnvironment, SpatialCore};

/// A complete reverb stage, ready to be split across threads
///
/// ```ignore
/// let ReverbStage { loader, mut processor, mut events, .. } =
///     ReverbStage::new(core, FormatDecoders::default(), &config);
/// loader.setup(48000);
/// // move `processor` into the audio callback, keep `loader` on the UI side
/// ```
pub struct ReverbStage<C: SpatialCore> {
    /// Control side: submits loads, answers state queries
    pub loader: BrirLoader<C>,
    /// Audio side: renders blocks
    pub processor: ReverbProcessor<C>,
    /// UI side: loader transitions
    pub events: LoadEvents,
    /// Parameters shared by all three
    pub params: Arc<ReverbParameters>,
    /// Last-block RMS power
    pub meter: Arc<PowerMeter>,
}

impl<C: SpatialCore> ReverbStage<C> {
    /// Assemble a stage around `core`
    ///
    /// The processor starts with an empty environment and renders silence
    /// until the first load succeeds.
    pub fn new(core: Arc<C>, decoders: FormatDecoders<C::Environment>, config: &ReverbConfig) -> Self {
        let params = Arc::new(config.parameters());
        let meter = Arc::new(PowerMeter::new());
        let handoff = Arc::new(EnvironmentHandoff::new());
        let (producer, events) = event_channel(config.event_queue_capacity);

        let mut initial = core.create_environment();
        initial.set_reverberation_order(config.reverberation_order);

        let block_size = config.max_block_size.min(core.max_block_size());
        if block_size < config.max_block_size {
            log::warn!(
                "Configured block size {} exceeds the core's {} frame buffers, using {}",
                config.max_block_size,
                core.max_block_size(),
                block_size
            );
        }

        let processor = ReverbProcessor::new(
            Arc::clone(&core),
            Arc::clone(&params),
            Arc::clone(&handoff),
            Arc::clone(&meter),
            owned(initial),
            block_size,
        );
        let loader = BrirLoader::new(
            core,
            decoders,
            config.reverberation_order,
            handoff,
            producer,
            Arc::clone(&params),
            config.brir_directory.clone(),
        );

        log::info!(
            "Reverb stage ready: {:?} order, {} frame blocks, BRIRs in {:?}",
            config.reverberation_order,
            block_size,
            config.brir_directory
        );

        Self {
            loader,
            processor,
            events,
            params,
            meter,
        }
    }
}
