//! Reverb stage startup settings

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::loader::EVENT_QUEUE_CAPACITY;
use crate::params::{BrirPreset, ReverbParameters, DISTANCE_ATTENUATION_RANGE, LEVEL_RANGE};
use crate::types::{ReverberationOrder, MAX_BLOCK_SIZE};

use super::paths::default_brir_directory;

/// Reverb stage configuration
///
/// Every field has a default, so a partial YAML file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    /// Directory the bundled presets are resolved against
    pub brir_directory: PathBuf,

    /// B-format channels taking part in the reverb
    /// Default: bidimensional (W, X, Y)
    pub reverberation_order: ReverberationOrder,

    /// Largest block the audio path processes without chunking
    pub max_block_size: usize,

    /// Undelivered loader events kept for the UI
    pub event_queue_capacity: usize,

    /// Initial reverb on/off state
    pub enabled: bool,

    /// Initial level in dB (-30 to +6)
    pub level_db: f32,

    /// Initial distance attenuation in dB (-6 to 0)
    pub distance_attenuation_db: f32,

    /// Initial BRIR menu selection (0-6)
    pub brir_preset: u8,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            brir_directory: default_brir_directory(),
            reverberation_order: ReverberationOrder::default(),
            max_block_size: MAX_BLOCK_SIZE,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
            enabled: true,
            level_db: LEVEL_RANGE.default,
            distance_attenuation_db: DISTANCE_ATTENUATION_RANGE.default,
            brir_preset: BrirPreset::Small as u8,
        }
    }
}

impl ReverbConfig {
    /// Build the initial parameter state (values clamped into range)
    pub fn parameters(&self) -> ReverbParameters {
        let preset = BrirPreset::from_index(self.brir_preset.min(BrirPreset::MAX_INDEX))
            .unwrap_or(BrirPreset::Small);
        ReverbParameters::with_values(
            self.enabled,
            self.level_db,
            self.distance_attenuation_db,
            preset,
        )
    }
}
