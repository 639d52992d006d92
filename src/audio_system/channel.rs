/// Playback channel
///
/// Wraps one backend voice: the assigned clip, volume, loop flag, pitch and
/// the playing/idle state last reported by the backend.

use crate::error::BackendError;

use super::backend::{AudioBackend, PlayParams};
use super::library::Clip;
use super::source::{Category, ChannelId};

/// Observable channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No clip assigned, not playing
    Idle,

    /// Clip assigned and sounding
    Playing,

    /// Clip still assigned but silent (paused, or stopped without clearing)
    Stopped,
}

/// One playback slot
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    clip: Option<Clip>,
    volume: f32,
    bus_gain: f32,
    pitch: f32,
    looping: bool,
    one_shot: bool,
    playing: bool,
    paused: bool,
}

impl Channel {
    pub fn new(id: ChannelId, bus_gain: f32) -> Self {
        Self {
            id,
            clip: None,
            volume: 1.0,
            bus_gain,
            pitch: 1.0,
            looping: id.category.loops(),
            one_shot: false,
            playing: false,
            paused: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn category(&self) -> Category {
        self.id.category
    }

    pub fn clip(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    pub fn clip_name(&self) -> Option<&str> {
        self.clip.as_ref().map(|c| c.name())
    }

    /// Per-channel volume, before the category bus gain
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn bus_gain(&self) -> f32 {
        self.bus_gain
    }

    /// Gain handed to the backend: channel volume times bus gain
    pub fn output_gain(&self) -> f32 {
        self.volume * self.bus_gain
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> ChannelState {
        match (self.clip.is_some(), self.playing) {
            (_, true) => ChannelState::Playing,
            (true, false) => ChannelState::Stopped,
            (false, false) => ChannelState::Idle,
        }
    }

    /// Assign `clip` and start it. On backend failure the channel is left
    /// as it was.
    pub fn assign_and_play(
        &mut self,
        backend: &mut dyn AudioBackend,
        clip: Clip,
        volume: f32,
        looping: bool,
        pitch: f32,
    ) -> Result<(), BackendError> {
        let volume = volume.clamp(0.0, 1.0);
        let params = PlayParams {
            volume: volume * self.bus_gain,
            looping,
            pitch,
        };
        backend.play(self.id, &clip, params)?;

        tracing::debug!(
            "{}: playing '{}' (volume={:.3}, loop={}, pitch={})",
            self.id,
            clip.name(),
            volume,
            looping,
            pitch
        );

        self.clip = Some(clip);
        self.volume = volume;
        self.looping = looping;
        self.pitch = pitch;
        self.one_shot = false;
        self.playing = true;
        self.paused = false;
        Ok(())
    }

    /// Fire-and-forget playback. The clip is released once the backend
    /// reports the voice finished.
    pub fn play_one_shot(
        &mut self,
        backend: &mut dyn AudioBackend,
        clip: Clip,
        volume: f32,
        pitch: f32,
    ) -> Result<(), BackendError> {
        self.assign_and_play(backend, clip, volume, false, pitch)?;
        self.one_shot = true;
        Ok(())
    }

    /// Stop playback, optionally dropping the assigned clip
    pub fn stop(&mut self, backend: &mut dyn AudioBackend, clear_clip: bool) {
        if self.clip.is_some() || self.playing {
            backend.stop(self.id);
        }
        self.playing = false;
        self.paused = false;
        self.one_shot = false;
        if clear_clip {
            self.clip = None;
        }
        tracing::debug!("{}: stopped (clear_clip={})", self.id, clear_clip);
    }

    /// Pause a playing channel; the clip stays assigned
    pub fn pause(&mut self, backend: &mut dyn AudioBackend) -> bool {
        if !self.playing {
            return false;
        }
        backend.pause(self.id);
        self.playing = false;
        self.paused = true;
        true
    }

    pub fn resume(&mut self, backend: &mut dyn AudioBackend) -> bool {
        if !self.paused || self.clip.is_none() {
            return false;
        }
        backend.resume(self.id);
        self.playing = true;
        self.paused = false;
        true
    }

    /// Set the per-channel volume, pushing it to the backend when a clip is
    /// loaded
    pub fn set_volume(&mut self, backend: &mut dyn AudioBackend, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if self.clip.is_some() {
            backend.set_volume(self.id, self.output_gain());
        }
    }

    /// Apply a new category bus gain
    pub fn set_bus_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) {
        self.bus_gain = gain;
        if self.clip.is_some() {
            backend.set_volume(self.id, self.output_gain());
        }
    }

    /// Poll the backend. Returns true when a one-shot finished and the
    /// channel went back to idle.
    pub fn sync(&mut self, backend: &dyn AudioBackend) -> bool {
        if !self.playing || backend.is_playing(self.id) {
            return false;
        }

        self.playing = false;
        if self.one_shot {
            self.one_shot = false;
            self.clip = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::backend::{BackendCall, HeadlessBackend};
    use crate::audio_system::library::{ClipHandle, ClipLibrary};
    use std::time::Duration;

    fn clip(category: Category, name: &str, secs: f32) -> Clip {
        let mut library = ClipLibrary::new();
        library
            .register(category, name, ClipHandle::silent(Duration::from_secs_f32(secs)))
            .unwrap();
        library.resolve(category, name).unwrap().clone()
    }

    #[test]
    fn test_new_channel_is_idle() {
        let channel = Channel::new(ChannelId::new(Category::Bgm, 0), 1.0);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.is_looping());
        assert_eq!(channel.volume(), 1.0);
    }

    #[test]
    fn test_play_then_stop_with_clear() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Bgm, 0), 1.0);

        channel
            .assign_and_play(&mut backend, clip(Category::Bgm, "theme", 10.0), 0.8, true, 1.0)
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Playing);
        assert_eq!(channel.clip_name(), Some("theme"));

        channel.stop(&mut backend, true);
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(!backend.is_playing(channel.id()));
    }

    #[test]
    fn test_stop_without_clear_keeps_clip() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Bgm, 0), 1.0);

        channel
            .assign_and_play(&mut backend, clip(Category::Bgm, "theme", 10.0), 1.0, true, 1.0)
            .unwrap();
        channel.stop(&mut backend, false);

        assert_eq!(channel.state(), ChannelState::Stopped);
        assert_eq!(channel.clip_name(), Some("theme"));
    }

    #[test]
    fn test_one_shot_returns_to_idle() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Se, 0), 1.0);

        channel
            .play_one_shot(&mut backend, clip(Category::Se, "click", 0.1), 1.0, 1.0)
            .unwrap();
        assert!(!channel.sync(&backend));

        backend.update(0.2);
        assert!(channel.sync(&backend));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_output_gain_includes_bus() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Se, 0), 0.5);

        channel
            .assign_and_play(&mut backend, clip(Category::Se, "click", 1.0), 0.8, false, 1.0)
            .unwrap();
        assert!((backend.volume_of(channel.id()).unwrap() - 0.4).abs() < 1e-6);

        channel.set_bus_gain(&mut backend, 1.0);
        assert!((backend.volume_of(channel.id()).unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_set_volume_on_idle_channel_is_not_pushed() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Bgm, 0), 1.0);

        channel.set_volume(&mut backend, 0.3);
        assert_eq!(channel.volume(), 0.3);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_pause_and_resume() {
        let mut backend = HeadlessBackend::new();
        let mut channel = Channel::new(ChannelId::new(Category::Bgm, 1), 1.0);

        assert!(!channel.pause(&mut backend));
        channel
            .assign_and_play(&mut backend, clip(Category::Bgm, "theme", 10.0), 1.0, true, 1.0)
            .unwrap();

        assert!(channel.pause(&mut backend));
        assert_eq!(channel.state(), ChannelState::Stopped);
        assert!(!channel.sync(&backend));

        assert!(channel.resume(&mut backend));
        assert_eq!(channel.state(), ChannelState::Playing);
        assert_eq!(
            backend.calls().last(),
            Some(&BackendCall::Resume(channel.id()))
        );
    }

    #[test]
    fn test_failed_play_leaves_channel_untouched() {
        let mut backend = HeadlessBackend::new();
        backend.set_failing(true);
        let mut channel = Channel::new(ChannelId::new(Category::Bgm, 0), 1.0);

        let result =
            channel.assign_and_play(&mut backend, clip(Category::Bgm, "theme", 1.0), 1.0, true, 1.0);
        assert!(result.is_err());
        assert_eq!(channel.state(), ChannelState::Idle);
    }
}
