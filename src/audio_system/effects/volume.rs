/// Volume buses
///
/// Master, BGM and SE levels. Levels are set and read as linear values in
/// [0, 1] and stored as attenuation in decibels, clamped to [-80 dB, 0 dB].

use crate::audio_system::source::{Bus, Category};

/// Floor of the attenuation range; a linear level of 0 maps here
pub const MIN_DB: f32 = -80.0;

/// Ceiling of the attenuation range (unity gain)
pub const MAX_DB: f32 = 0.0;

/// Linear level to attenuation in dB, clamped to [`MIN_DB`, `MAX_DB`]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear.is_nan() || linear <= 0.0 {
        return MIN_DB;
    }
    (20.0 * linear.log10()).clamp(MIN_DB, MAX_DB)
}

/// Attenuation in dB back to a linear level
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Per-bus levels, kept for the lifetime of the manager
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeBus {
    master_db: f32,
    bgm_db: f32,
    se_db: f32,
}

impl VolumeBus {
    /// Create buses at the given linear levels
    pub fn new(master: f32, bgm: f32, se: f32) -> Self {
        let mut bus = Self::default();
        bus.set_level(Bus::Master, master);
        bus.set_level(Bus::Bgm, bgm);
        bus.set_level(Bus::Se, se);
        bus
    }

    fn slot(&mut self, bus: Bus) -> &mut f32 {
        match bus {
            Bus::Master => &mut self.master_db,
            Bus::Bgm => &mut self.bgm_db,
            Bus::Se => &mut self.se_db,
        }
    }

    /// Set a bus from a linear level. Input is clamped to [0, 1]; NaN counts
    /// as silence. Returns the level as it reads back.
    pub fn set_level(&mut self, bus: Bus, linear: f32) -> f32 {
        let linear = if linear.is_nan() { 0.0 } else { linear.clamp(0.0, 1.0) };
        *self.slot(bus) = linear_to_db(linear);
        self.level(bus)
    }

    /// Linear level of a bus
    pub fn level(&self, bus: Bus) -> f32 {
        db_to_linear(self.attenuation_db(bus))
    }

    /// Stored attenuation of a bus in dB
    pub fn attenuation_db(&self, bus: Bus) -> f32 {
        match bus {
            Bus::Master => self.master_db,
            Bus::Bgm => self.bgm_db,
            Bus::Se => self.se_db,
        }
    }

    /// Pre-mix gain for a category's channels
    pub fn category_gain(&self, category: Category) -> f32 {
        self.level(category.bus())
    }

    /// Output-stage gain
    pub fn master_gain(&self) -> f32 {
        self.level(Bus::Master)
    }
}

impl Default for VolumeBus {
    fn default() -> Self {
        Self {
            master_db: MAX_DB,
            bgm_db: MAX_DB,
            se_db: MAX_DB,
        }
    }
}
