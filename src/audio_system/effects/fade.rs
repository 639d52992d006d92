/// Fade in/out effect
///
/// Tick-driven linear volume ramps, at most one per channel. Fades advance
/// by the scheduler's delta time; nothing sleeps or blocks.

use std::collections::BTreeMap;

use crate::audio_system::backend::AudioBackend;
use crate::audio_system::channel::Channel;
use crate::audio_system::library::Clip;
use crate::audio_system::pool::PoolSet;
use crate::audio_system::source::ChannelId;
use crate::error::BackendError;

/// Direction of a fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    In,
    Out,
}

/// What happens to the channel when the ramp completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCompletion {
    None,
    StopAndClear,
}

/// One linear volume ramp
#[derive(Debug, Clone, PartialEq)]
pub struct Fade {
    channel: ChannelId,
    start_volume: f32,
    target_volume: f32,
    /// Channel volume written back when the fade ends or is cancelled
    restore_volume: f32,
    elapsed: f32,
    duration: f32,
    kind: FadeKind,
    completion: FadeCompletion,
}

impl Fade {
    /// Ramp 0 → `target` over `duration` seconds
    pub fn fade_in(channel: ChannelId, target: f32, duration: f32) -> Self {
        Self {
            channel,
            start_volume: 0.0,
            target_volume: target,
            restore_volume: target,
            elapsed: 0.0,
            duration,
            kind: FadeKind::In,
            completion: FadeCompletion::None,
        }
    }

    /// Ramp `start` → 0, then stop the channel and put `restore` back
    pub fn fade_out(channel: ChannelId, start: f32, restore: f32, duration: f32) -> Self {
        Self {
            channel,
            start_volume: start,
            target_volume: 0.0,
            restore_volume: restore,
            elapsed: 0.0,
            duration,
            kind: FadeKind::Out,
            completion: FadeCompletion::StopAndClear,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn kind(&self) -> FadeKind {
        self.kind
    }

    pub fn completion(&self) -> FadeCompletion {
        self.completion
    }

    pub fn start_volume(&self) -> f32 {
        self.start_volume
    }

    pub fn target_volume(&self) -> f32 {
        self.target_volume
    }

    pub fn restore_volume(&self) -> f32 {
        self.restore_volume
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Fraction of the ramp covered, in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    /// Volume at the current position; never leaves the start..target span
    pub fn volume(&self) -> f32 {
        let low = self.start_volume.min(self.target_volume);
        let high = self.start_volume.max(self.target_volume);
        let v = self.start_volume + (self.target_volume - self.start_volume) * self.progress();
        v.clamp(low, high)
    }

    /// Accumulate `dt` seconds and return the new volume
    pub fn advance(&mut self, dt: f32) -> f32 {
        self.elapsed += dt.max(0.0);
        self.volume()
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// A fade that ran to completion during a tick
#[derive(Debug, Clone, PartialEq)]
pub struct FadeOutcome {
    pub channel: ChannelId,
    pub kind: FadeKind,
    /// Clip the channel held when the fade ended
    pub clip: Option<String>,
}

/// Owns every in-flight fade, keyed by channel
#[derive(Debug, Default)]
pub struct FadeController {
    fades: BTreeMap<ChannelId, Fade>,
}

impl FadeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fades.is_empty()
    }

    pub fn is_fading(&self, channel: ChannelId) -> bool {
        self.fades.contains_key(&channel)
    }

    pub fn fade(&self, channel: ChannelId) -> Option<&Fade> {
        self.fades.get(&channel)
    }

    pub fn fades(&self) -> impl Iterator<Item = &Fade> {
        self.fades.values()
    }

    /// Drop the channel's fade, if any. A cancelled fade-out puts the
    /// pre-fade volume back.
    pub fn cancel(&mut self, channel: &mut Channel, backend: &mut dyn AudioBackend) -> Option<Fade> {
        let fade = self.fades.remove(&channel.id())?;
        if fade.kind == FadeKind::Out {
            channel.set_volume(backend, fade.restore_volume);
        }
        tracing::debug!("{}: cancelled {:?} fade", channel.id(), fade.kind);
        Some(fade)
    }

    /// Assign `clip`, start it silent and ramp up to `target`.
    ///
    /// A non-positive duration plays at `target` straight away. Any fade the
    /// channel had is replaced, unless the backend refuses the clip.
    pub fn start_fade_in(
        &mut self,
        channel: &mut Channel,
        backend: &mut dyn AudioBackend,
        clip: Clip,
        duration: f32,
        target: f32,
    ) -> Result<(), BackendError> {
        let previous = self.fades.remove(&channel.id());

        let target = target.clamp(0.0, 1.0);
        let looping = channel.category().loops();
        let initial = if duration > 0.0 { 0.0 } else { target };
        if let Err(e) = channel.assign_and_play(backend, clip, initial, looping, 1.0) {
            if let Some(fade) = previous {
                self.fades.insert(channel.id(), fade);
            }
            return Err(e);
        }

        if let Some(previous) = previous {
            tracing::debug!("{}: replaced {:?} fade", channel.id(), previous.kind);
        }
        if duration > 0.0 {
            self.fades
                .insert(channel.id(), Fade::fade_in(channel.id(), target, duration));
            tracing::debug!("{}: fade in to {:.3} over {}s", channel.id(), target, duration);
        }
        Ok(())
    }

    /// Ramp the channel down to silence, then stop it, clear its clip and
    /// restore the pre-fade volume.
    ///
    /// A non-positive duration does all of that immediately and returns the
    /// outcome.
    pub fn start_fade_out(
        &mut self,
        channel: &mut Channel,
        backend: &mut dyn AudioBackend,
        duration: f32,
    ) -> Option<FadeOutcome> {
        let restore = match self.fades.remove(&channel.id()) {
            Some(previous) => previous.restore_volume,
            None => channel.volume(),
        };

        let fade = Fade::fade_out(channel.id(), channel.volume(), restore, duration);
        if duration <= 0.0 {
            return Some(Self::complete(&fade, channel, backend));
        }

        tracing::debug!(
            "{}: fade out from {:.3} over {}s",
            channel.id(),
            fade.start_volume,
            duration
        );
        self.fades.insert(channel.id(), fade);
        None
    }

    /// Advance every fade by `dt` seconds and apply the resulting volumes.
    /// Fades on paused channels hold their position. Returns the fades that
    /// finished.
    pub fn tick(
        &mut self,
        dt: f32,
        pools: &mut PoolSet,
        backend: &mut dyn AudioBackend,
    ) -> Vec<FadeOutcome> {
        let mut finished = Vec::new();

        for (id, fade) in self.fades.iter_mut() {
            let Some(channel) = pools.channel_mut(*id) else {
                finished.push(*id);
                continue;
            };
            if channel.is_paused() {
                continue;
            }
            let volume = fade.advance(dt);
            channel.set_volume(backend, volume);
            if fade.is_finished() {
                finished.push(*id);
            }
        }

        let mut outcomes = Vec::with_capacity(finished.len());
        for id in finished {
            let Some(fade) = self.fades.remove(&id) else {
                continue;
            };
            if let Some(channel) = pools.channel_mut(id) {
                outcomes.push(Self::complete(&fade, channel, backend));
            }
        }
        outcomes
    }

    fn complete(fade: &Fade, channel: &mut Channel, backend: &mut dyn AudioBackend) -> FadeOutcome {
        let clip = channel.clip_name().map(str::to_string);
        if fade.completion == FadeCompletion::StopAndClear {
            channel.stop(backend, true);
            channel.set_volume(backend, fade.restore_volume);
        }
        tracing::debug!("{}: {:?} fade complete", channel.id(), fade.kind);
        FadeOutcome {
            channel: channel.id(),
            kind: fade.kind,
            clip,
        }
    }

    /// Forget every fade without touching channels
    pub fn clear(&mut self) {
        self.fades.clear();
    }
}
