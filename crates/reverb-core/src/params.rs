//! Reverb parameter state
//!
//! Scalar settings written by a control surface at arbitrary times and read
//! by the audio thread once per block. Every field is an independent atomic:
//! no cross-field consistency is needed, so all accesses are `Relaxed`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Declared range and default of a scalar parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRange {
    /// Parameter name for display
    pub name: &'static str,
    /// Default value
    pub default: f32,
    /// Minimum value
    pub min: f32,
    /// Maximum value
    pub max: f32,
    /// Unit label (e.g. "dB")
    pub unit: &'static str,
}

impl ParamRange {
    /// Clamp a value into this range
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Reverb level in dB
pub const LEVEL_RANGE: ParamRange = ParamRange {
    name: "Reverb Level",
    default: -3.0,
    min: -30.0,
    max: 6.0,
    unit: "dB",
};

/// Distance attenuation in dB per doubling of distance
pub const DISTANCE_ATTENUATION_RANGE: ParamRange = ParamRange {
    name: "Reverb Distance Attenuation",
    default: -3.0,
    min: -6.0,
    max: 0.0,
    unit: "dB",
};

/// BRIR menu entries: five bundled rooms followed by two "load custom" markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BrirPreset {
    Small = 0,
    Medium = 1,
    Large = 2,
    Library = 3,
    Trapezoid = 4,
    /// Marker: the user picks a compact binary container
    LoadBinary = 5,
    /// Marker: the user picks an interchange (SOFA) file
    LoadInterchange = 6,
}

impl BrirPreset {
    /// All menu entries in display order
    pub const ALL: [BrirPreset; 7] = [
        BrirPreset::Small,
        BrirPreset::Medium,
        BrirPreset::Large,
        BrirPreset::Library,
        BrirPreset::Trapezoid,
        BrirPreset::LoadBinary,
        BrirPreset::LoadInterchange,
    ];

    /// Highest valid selection index
    pub const MAX_INDEX: u8 = 6;

    /// Convert from a menu index (0-6)
    pub fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(idx as usize).copied()
    }

    /// Menu label
    pub fn label(&self) -> &'static str {
        match self {
            BrirPreset::Small => "Small",
            BrirPreset::Medium => "Medium",
            BrirPreset::Large => "Large",
            BrirPreset::Library => "Library",
            BrirPreset::Trapezoid => "Trapezoid",
            BrirPreset::LoadBinary => "Load 3DTI",
            BrirPreset::LoadInterchange => "Load SOFA",
        }
    }

    /// Whether this entry refers to a BRIR shipped with the application
    pub fn is_bundled(&self) -> bool {
        (*self as u8) < BrirPreset::LoadBinary as u8
    }

    /// File name of the bundled BRIR authored at `sample_rate`
    ///
    /// Returns `None` for the "load custom" markers.
    pub fn bundled_file_name(&self, sample_rate: u32) -> Option<String> {
        self.is_bundled()
            .then(|| format!("3DTI_BRIR_{}_{}Hz.3dti-brir", self.label(), sample_rate))
    }

    /// Labels for building a selection menu
    pub fn options() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.label()).collect()
    }
}

/// Lock-free reverb parameters shared between control surface and audio thread
pub struct ReverbParameters {
    enabled: AtomicBool,
    /// f32 bits of the level in dB
    level_db: AtomicU32,
    /// f32 bits of the distance attenuation in dB
    distance_attenuation_db: AtomicU32,
    /// Menu index into `BrirPreset::ALL`
    brir_selection: AtomicU8,
}

impl ReverbParameters {
    /// Create parameters at their declared defaults
    pub fn new() -> Self {
        Self::with_values(
            true,
            LEVEL_RANGE.default,
            DISTANCE_ATTENUATION_RANGE.default,
            BrirPreset::Small,
        )
    }

    /// Create parameters with explicit initial values (clamped into range)
    pub fn with_values(
        enabled: bool,
        level_db: f32,
        distance_attenuation_db: f32,
        preset: BrirPreset,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            level_db: AtomicU32::new(LEVEL_RANGE.clamp(level_db).to_bits()),
            distance_attenuation_db: AtomicU32::new(
                DISTANCE_ATTENUATION_RANGE.clamp(distance_attenuation_db).to_bits(),
            ),
            brir_selection: AtomicU8::new(preset as u8),
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Reverb level in dB (-30 to +6)
    #[inline]
    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_db.load(Ordering::Relaxed))
    }

    pub fn set_level_db(&self, db: f32) {
        self.level_db
            .store(LEVEL_RANGE.clamp(db).to_bits(), Ordering::Relaxed);
    }

    /// Linear gain for the current level
    #[inline]
    pub fn level_gain(&self) -> f32 {
        crate::types::db_to_gain(self.level_db())
    }

    /// Distance attenuation in dB (-6 to 0)
    #[inline]
    pub fn distance_attenuation_db(&self) -> f32 {
        f32::from_bits(self.distance_attenuation_db.load(Ordering::Relaxed))
    }

    pub fn set_distance_attenuation_db(&self, db: f32) {
        self.distance_attenuation_db.store(
            DISTANCE_ATTENUATION_RANGE.clamp(db).to_bits(),
            Ordering::Relaxed,
        );
    }

    /// Current BRIR menu selection
    pub fn brir_selection(&self) -> BrirPreset {
        BrirPreset::from_index(self.brir_selection.load(Ordering::Relaxed))
            .unwrap_or(BrirPreset::Small)
    }

    /// Set the BRIR menu selection by index; out-of-range indices are clamped
    pub fn set_brir_selection(&self, index: u8) {
        self.brir_selection
            .store(index.min(BrirPreset::MAX_INDEX), Ordering::Relaxed);
    }
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self::new()
    }
}
