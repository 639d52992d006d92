//! Voice-pool sound manager
//!
//! Named BGM and SE clips are played on fixed pools of channels, with
//! per-tick fades and Master/BGM/SE volume buses. Audio output goes through
//! the [`AudioBackend`] trait; [`HeadlessBackend`] simulates it and
//! `RodioBackend` (feature `playback`) drives a real device.

pub mod audio_system;
pub mod config;
pub mod error;
pub mod messaging;
pub mod state;
pub mod utils;

pub use audio_system::{
    AudioBackend, Bus, Category, ChannelId, ClipHandle, ClipLibrary, HeadlessBackend, PlayOptions,
    SoundManager,
};
pub use config::SoundConfig;
pub use error::{AppResult, BackendError, ConfigError, SoundError};
pub use messaging::{SoundCommand, SoundEvent};
