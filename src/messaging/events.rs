/// Event types for the sound manager
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use crate::audio_system::effects::FadeKind;
use crate::audio_system::source::{Bus, Category, ChannelId};
use crate::state::Lifecycle;

/// Sound manager events
#[derive(Debug, Clone, PartialEq)]
pub enum SoundEvent {
    /// A play request named a clip that is not registered
    ClipNotFound { category: Category, name: String },

    /// A request found no channel it was allowed to use
    NoFreeChannel { category: Category, name: String },

    /// A busy channel was taken over by a new request
    ChannelStolen { channel: ChannelId },

    /// A sound effect started
    SePlayed { channel: ChannelId, name: String },

    /// Background music started (possibly silent, fading in)
    BgmStarted {
        channel: ChannelId,
        name: String,
        fade_seconds: f32,
    },

    /// Background music stopped and released its channel
    BgmStopped { channel: ChannelId, name: String },

    BgmPaused { channel: ChannelId, name: String },

    BgmResumed { channel: ChannelId, name: String },

    /// A fade ran to completion
    FadeCompleted { channel: ChannelId, kind: FadeKind },

    /// A bus level changed
    VolumeChanged { bus: Bus, level: f32 },

    /// The audio backend refused to start a clip
    BackendFailed {
        category: Category,
        name: String,
        message: String,
    },

    /// Manager lifecycle moved between states
    LifecycleChanged { old_state: Lifecycle, new_state: Lifecycle },

    /// The manager shut down
    Shutdown,
}

impl SoundEvent {
    /// Whether this event reports a failed request
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            SoundEvent::ClipNotFound { .. }
                | SoundEvent::NoFreeChannel { .. }
                | SoundEvent::BackendFailed { .. }
        )
    }
}
