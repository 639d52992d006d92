//! Audio output backend seam
//!
//! The manager never touches audio hardware directly. It issues
//! "play clip on channel at volume/pitch" commands to an [`AudioBackend`]
//! and polls it for playing/idle state once per tick.
//!
//! [`HeadlessBackend`] simulates voices from clip durations. It drives the
//! tests and lets the demo run without an audio device.

use std::collections::HashMap;

use crate::error::BackendError;

use super::library::Clip;
use super::source::ChannelId;

/// Parameters for starting a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    /// Pre-mix gain (channel volume times category bus gain)
    pub volume: f32,
    pub looping: bool,
    pub pitch: f32,
}

/// Platform audio output
pub trait AudioBackend {
    /// Start `clip` on `channel`, replacing whatever the channel was playing
    fn play(&mut self, channel: ChannelId, clip: &Clip, params: PlayParams)
        -> Result<(), BackendError>;

    fn stop(&mut self, channel: ChannelId);

    fn pause(&mut self, channel: ChannelId);

    fn resume(&mut self, channel: ChannelId);

    /// Whether the channel is currently producing sound
    fn is_playing(&self, channel: ChannelId) -> bool;

    /// Update a channel's pre-mix gain
    fn set_volume(&mut self, channel: ChannelId, volume: f32);

    /// Output-stage attenuation applied after mixing
    fn set_master_gain(&mut self, gain: f32);

    /// Advance backend time; called once per tick before state is polled
    fn update(&mut self, _dt: f32) {}
}

/// A backend command, as recorded by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Play {
        channel: ChannelId,
        clip: String,
        params: PlayParams,
    },
    Stop(ChannelId),
    Pause(ChannelId),
    Resume(ChannelId),
    SetVolume { channel: ChannelId, volume: f32 },
    SetMasterGain(f32),
}

#[derive(Debug, Clone)]
struct Voice {
    clip: String,
    volume: f32,
    pitch: f32,
    looping: bool,
    paused: bool,
    /// Seconds left for a one-shot; `None` never ends on its own
    remaining: Option<f32>,
}

impl Voice {
    fn is_sounding(&self) -> bool {
        !self.paused && self.remaining.map_or(true, |r| r > 0.0)
    }
}

/// Simulated backend: voices end after their clip duration elapses
#[derive(Debug)]
pub struct HeadlessBackend {
    voices: HashMap<ChannelId, Voice>,
    master_gain: f32,
    calls: Vec<BackendCall>,
    failing: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            voices: HashMap::new(),
            master_gain: 1.0,
            calls: Vec::new(),
            failing: false,
        }
    }

    /// Every command received so far, in order
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Make subsequent `play` calls fail
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Name of the clip loaded on a channel
    pub fn clip_on(&self, channel: ChannelId) -> Option<&str> {
        self.voices.get(&channel).map(|v| v.clip.as_str())
    }

    /// Current pre-mix gain of a channel
    pub fn volume_of(&self, channel: ChannelId) -> Option<f32> {
        self.voices.get(&channel).map(|v| v.volume)
    }

    pub fn is_looping(&self, channel: ChannelId) -> Option<bool> {
        self.voices.get(&channel).map(|v| v.looping)
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Number of channels currently producing sound
    pub fn sounding_count(&self) -> usize {
        self.voices.values().filter(|v| v.is_sounding()).count()
    }

    /// Simulate the device ending a voice on its own (stream error, device
    /// unplugged). The manager only notices on its next sync.
    pub fn drop_voice(&mut self, channel: ChannelId) -> bool {
        self.voices.remove(&channel).is_some()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for HeadlessBackend {
    fn play(
        &mut self,
        channel: ChannelId,
        clip: &Clip,
        params: PlayParams,
    ) -> Result<(), BackendError> {
        if self.failing {
            return Err(BackendError::PlaybackFailed(
                format!("headless backend refused {}", clip.name()).into(),
            ));
        }

        self.calls.push(BackendCall::Play {
            channel,
            clip: clip.name().to_string(),
            params,
        });

        let remaining = if params.looping {
            None
        } else {
            // Unknown length one-shots end on the next update
            Some(clip.handle().duration().map_or(0.0, |d| d.as_secs_f32()))
        };

        self.voices.insert(
            channel,
            Voice {
                clip: clip.name().to_string(),
                volume: params.volume,
                pitch: params.pitch,
                looping: params.looping,
                paused: false,
                remaining,
            },
        );
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) {
        self.calls.push(BackendCall::Stop(channel));
        self.voices.remove(&channel);
    }

    fn pause(&mut self, channel: ChannelId) {
        self.calls.push(BackendCall::Pause(channel));
        if let Some(voice) = self.voices.get_mut(&channel) {
            voice.paused = true;
        }
    }

    fn resume(&mut self, channel: ChannelId) {
        self.calls.push(BackendCall::Resume(channel));
        if let Some(voice) = self.voices.get_mut(&channel) {
            voice.paused = false;
        }
    }

    fn is_playing(&self, channel: ChannelId) -> bool {
        self.voices.get(&channel).map_or(false, |v| v.is_sounding())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) {
        self.calls.push(BackendCall::SetVolume { channel, volume });
        if let Some(voice) = self.voices.get_mut(&channel) {
            voice.volume = volume;
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.calls.push(BackendCall::SetMasterGain(gain));
        self.master_gain = gain;
    }

    fn update(&mut self, dt: f32) {
        for voice in self.voices.values_mut() {
            if voice.paused {
                continue;
            }
            if let Some(remaining) = voice.remaining.as_mut() {
                *remaining -= dt * voice.pitch;
            }
        }
        self.voices.retain(|_, v| v.remaining.map_or(true, |r| r > 0.0));
    }
}
