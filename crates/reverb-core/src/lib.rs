//! Reverb Core - Real-time binaural reverb stage
//!
//! Renders room reverberation from a BRIR (Binaural Room Impulse Response)
//! set, either as a direct stereo decode or by decoding a 4-channel B-format
//! signal to stereo. The BRIR can be replaced at any time: a background loader
//! builds the new environment off to the side and hands it to the audio
//! thread in one step, while the audio path outputs silence.

pub mod config;
pub mod error;
pub mod format;
pub mod gc;
pub mod loader;
pub mod meter;
pub mod params;
pub mod processor;
pub mod spatial;
pub mod stage;
pub mod types;

pub use config::ReverbConfig;
pub use error::{LoadError, LoadResult};
pub use format::{BrirDecoder, BrirFormat, FormatDecoders};
pub use loader::{BrirLoadRequest, BrirLoader, LoadEvent, LoadEvents, LoadState};
pub use meter::PowerMeter;
pub use params::{BrirPreset, ReverbParameters};
pub use processor::ReverbProcessor;
pub use spatial::{ConvolutionCore, ReverbEnvironment, SpatialCore};
pub use stage::ReverbStage;
pub use types::*;
