pub mod backend;
pub mod channel;
pub mod effects;
pub mod library;
pub mod manager;
#[cfg(feature = "playback")]
pub mod player;
pub mod pool;
/// Audio system module
///
/// Voice-pool mixing for two categories of sound:
/// - BGM: looping tracks, at most one per channel, optionally faded
/// - SE: one-shots on the first free channel, with overflow policies
///
/// ## Architecture
///
/// ```text
/// SoundManager
///   ├── ClipLibrary        name -> ClipHandle, per category
///   ├── PoolSet
///   │   ├── ChannelPool (BGM)  ─┐
///   │   └── ChannelPool (SE)   ─┤ Channel -> AudioBackend
///   ├── FadeController     per-tick volume ramps
///   └── VolumeBus          Master / BGM / SE levels in dB
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use sound_pool::audio_system::{HeadlessBackend, SoundManager};
///
/// let mut manager = SoundManager::new(config, library, HeadlessBackend::new());
/// manager.initialize()?;
///
/// manager.play_bgm_with_fade_in("theme", 2.0);
/// manager.play_se("click");
///
/// // Once per frame
/// manager.tick(1.0 / 60.0);
/// ```
pub mod source;

// Re-export commonly used types
pub use backend::{AudioBackend, BackendCall, HeadlessBackend, PlayParams};
pub use channel::{Channel, ChannelState};
pub use effects::{Fade, FadeController, FadeKind, VolumeBus};
pub use library::{Clip, ClipHandle, ClipLibrary};
pub use manager::{PlayOptions, SoundManager};
#[cfg(feature = "playback")]
pub use player::RodioBackend;
pub use pool::{Allocation, ChannelPool, OverflowPolicy, PoolSet, StopGuard};
pub use source::{Bus, Category, ChannelId};
