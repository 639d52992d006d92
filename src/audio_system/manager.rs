/// Sound manager
///
/// Facade over the clip library, the BGM/SE channel pools, fades and volume
/// buses. Owned by one thread and driven by `tick`; other threads talk to
/// it through a [`CommandSender`] and follow it through the [`EventBus`].
///
/// Requests never return errors. A request that cannot be served logs a
/// warning, publishes one diagnostic event and leaves every channel as it
/// was.

use std::path::Path;

use crate::config::SoundConfig;
use crate::error::{ConfigError, SoundError};
use crate::messaging::{CommandQueue, CommandSender, EventBus, SoundCommand, SoundEvent};
use crate::state::{Lifecycle, LifecycleMachine, TransitionError};

use super::backend::AudioBackend;
use super::channel::Channel;
use super::effects::{Fade, FadeController, FadeKind, FadeOutcome, VolumeBus};
use super::library::ClipLibrary;
use super::pool::{ChannelPool, PoolSet};
use super::source::{Bus, Category, ChannelId};

/// How a BGM request starts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayOptions {
    /// Fade-in length; zero starts at full volume
    pub fade_seconds: f32,

    /// Stop the other BGM channels; `None` uses the configured default
    pub stop_others: Option<bool>,
}

impl PlayOptions {
    pub fn fade_in(seconds: f32) -> Self {
        Self {
            fade_seconds: seconds,
            stop_others: None,
        }
    }

    pub fn with_stop_others(mut self, stop_others: bool) -> Self {
        self.stop_others = Some(stop_others);
        self
    }
}

/// Voice-pool sound manager
pub struct SoundManager<B: AudioBackend> {
    config: SoundConfig,
    library: ClipLibrary,
    backend: B,
    pools: PoolSet,
    fades: FadeController,
    volume: VolumeBus,
    lifecycle: LifecycleMachine,
    events: EventBus,
    commands: CommandQueue,
}

impl<B: AudioBackend> SoundManager<B> {
    /// Build a manager over a loaded library.
    ///
    /// Pool sizes come from the config, falling back to the number of
    /// registered clips per category. Nothing plays until [`initialize`].
    ///
    /// [`initialize`]: SoundManager::initialize
    pub fn new(config: SoundConfig, library: ClipLibrary, backend: B) -> Self {
        let volume = VolumeBus::new(config.master_volume, config.bgm_volume, config.se_volume);
        let pool_for = |category: Category| {
            ChannelPool::new(
                category,
                config.channel_count(category, library.len(category)),
                config.overflow(category),
                volume.category_gain(category),
            )
        };
        let pools = PoolSet {
            bgm: pool_for(Category::Bgm),
            se: pool_for(Category::Se),
        };

        Self {
            config,
            library,
            backend,
            pools,
            fades: FadeController::new(),
            volume,
            lifecycle: LifecycleMachine::new(),
            events: EventBus::new(),
            commands: CommandQueue::new(),
        }
    }

    /// Load the clip manifest from disk and build a manager over it
    pub fn from_config(
        config: SoundConfig,
        base_dir: &Path,
        backend: B,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let library = ClipLibrary::from_config(&config, base_dir)?;
        Ok(Self::new(config, library, backend))
    }

    // ---- lifecycle ----

    /// Start accepting requests
    pub fn initialize(&mut self) -> Result<(), TransitionError> {
        let old_state = self.lifecycle.start()?;
        self.backend.set_master_gain(self.volume.master_gain());

        tracing::info!(
            "Sound manager running: {} BGM channels, {} SE channels",
            self.pools.bgm.len(),
            self.pools.se.len()
        );
        self.publish_transition(old_state);
        Ok(())
    }

    /// Stop every channel, drop every fade and refuse further requests
    pub fn shutdown(&mut self) -> Result<(), TransitionError> {
        let old_state = self.lifecycle.shut_down()?;

        self.fades.clear();
        let bgm = self.pools.bgm.release_all(&mut self.backend);
        let se = self.pools.se.release_all(&mut self.backend);

        tracing::info!(
            "Sound manager shut down ({} BGM, {} SE released, {} listeners)",
            bgm,
            se,
            self.events.subscriber_count()
        );
        self.publish_transition(old_state);
        self.events.publish(SoundEvent::Shutdown);
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.state()
    }

    fn publish_transition(&self, old_state: Lifecycle) {
        self.events.publish(SoundEvent::LifecycleChanged {
            old_state,
            new_state: self.lifecycle.state(),
        });
    }

    fn ensure_running(&self, operation: &str) -> bool {
        let state = self.lifecycle.state();
        if state.is_running() {
            return true;
        }
        let error = SoundError::NotRunning { state };
        tracing::warn!("Ignoring {}: {}", operation, error);
        false
    }

    // ---- frame update ----

    /// Advance the manager by `dt` seconds.
    ///
    /// Applies queued commands, lets the backend advance, picks up voices
    /// that ended on their own, then steps every fade.
    pub fn tick(&mut self, dt: f32) {
        for command in self.commands.drain() {
            self.apply(command);
        }
        if !self.lifecycle.state().is_running() {
            return;
        }

        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.backend.update(dt);

        for category in [Category::Bgm, Category::Se] {
            for id in self.pools.pool_mut(category).sync(&self.backend) {
                tracing::debug!("{}: one-shot finished", id);
            }
        }

        let outcomes = self.fades.tick(dt, &mut self.pools, &mut self.backend);
        for outcome in outcomes {
            self.finish_fade(outcome);
        }
    }

    fn finish_fade(&self, outcome: FadeOutcome) {
        self.events.publish(SoundEvent::FadeCompleted {
            channel: outcome.channel,
            kind: outcome.kind,
        });
        if outcome.kind == FadeKind::Out {
            if let Some(name) = outcome.clip {
                tracing::info!("{}: BGM '{}' faded out", outcome.channel, name);
                self.events.publish(SoundEvent::BgmStopped {
                    channel: outcome.channel,
                    name,
                });
            }
        }
    }

    /// Run one queued command
    pub fn apply(&mut self, command: SoundCommand) {
        tracing::debug!("Applying command: {}", command.description());
        match command {
            SoundCommand::PlaySe { name } => {
                self.play_se(&name);
            }
            SoundCommand::PlayBgm { name, options } => {
                self.play_bgm_with(&name, options);
            }
            SoundCommand::StopBgm { name, fade_seconds } => {
                let fade_seconds = fade_seconds.unwrap_or(self.config.default_fade_seconds);
                if fade_seconds > 0.0 {
                    self.stop_bgm_with_fade_out(&name, fade_seconds);
                } else {
                    self.stop_bgm(&name);
                }
            }
            SoundCommand::StopAllBgm { fade_seconds } => {
                let fade_seconds = fade_seconds.unwrap_or(self.config.default_fade_seconds);
                if fade_seconds > 0.0 {
                    self.stop_all_bgm_with_fade_out(fade_seconds);
                } else {
                    self.stop_all_bgm();
                }
            }
            SoundCommand::StopAllSe => self.stop_all_se(),
            SoundCommand::PauseBgm { name } => self.pause_bgm(&name),
            SoundCommand::ResumeBgm { name } => self.resume_bgm(&name),
            SoundCommand::SetVolume { bus, level } => self.set_volume(bus, level),
            SoundCommand::Shutdown => {
                if let Err(e) = self.shutdown() {
                    tracing::warn!("Shutdown command ignored: {}", e);
                }
            }
        }
    }

    // ---- diagnostics ----

    fn report(&self, category: Category, name: &str, error: SoundError) {
        tracing::warn!("{} request for '{}' failed: {}", category, name, error);
        let event = match error {
            SoundError::ClipNotFound { category, name } => SoundEvent::ClipNotFound { category, name },
            SoundError::NoFreeChannel { category } => SoundEvent::NoFreeChannel {
                category,
                name: name.to_string(),
            },
            SoundError::Backend(e) => SoundEvent::BackendFailed {
                category,
                name: name.to_string(),
                message: match std::error::Error::source(&e) {
                    Some(source) => format!("{}: {}", e, source),
                    None => e.to_string(),
                },
            },
            SoundError::DuplicateName { .. } | SoundError::NotRunning { .. } => return,
        };
        self.events.publish(event);
    }

    // ---- SE ----

    /// Play a sound effect once on the first channel that is not busy.
    ///
    /// When every channel is busy the SE overflow policy decides: by default
    /// channel 0 is taken over.
    pub fn play_se(&mut self, name: &str) -> Option<ChannelId> {
        self.play_se_with_volume(name, self.config.channel_volume)
    }

    /// Play a sound effect once at an explicit channel volume (0.0-1.0,
    /// before the SE bus)
    pub fn play_se_with_volume(&mut self, name: &str, volume: f32) -> Option<ChannelId> {
        if !self.ensure_running("play_se") {
            return None;
        }

        let clip = match self.library.resolve(Category::Se, name) {
            Ok(clip) => clip.clone(),
            Err(e) => {
                self.report(Category::Se, name, e);
                return None;
            }
        };

        let allocation = match self.pools.se.acquire_for_se(&mut self.backend, clip, volume) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.report(Category::Se, name, e);
                return None;
            }
        };

        if allocation.stolen {
            tracing::debug!("{}: stolen for SE '{}'", allocation.channel, name);
            self.events.publish(SoundEvent::ChannelStolen {
                channel: allocation.channel,
            });
        }
        self.events.publish(SoundEvent::SePlayed {
            channel: allocation.channel,
            name: name.to_string(),
        });
        Some(allocation.channel)
    }

    /// Stop every SE channel
    pub fn stop_all_se(&mut self) {
        if !self.ensure_running("stop_all_se") {
            return;
        }
        self.pools.se.release_all(&mut self.backend);
    }

    // ---- BGM ----

    /// Start looping BGM at full channel volume, stopping other BGM when
    /// configured to
    pub fn play_bgm(&mut self, name: &str) -> Option<ChannelId> {
        self.play_bgm_with(name, PlayOptions::default())
    }

    /// Start looping BGM silent and ramp it up over `seconds`
    pub fn play_bgm_with_fade_in(&mut self, name: &str, seconds: f32) -> Option<ChannelId> {
        self.play_bgm_with(name, PlayOptions::fade_in(seconds))
    }

    /// Start looping BGM.
    ///
    /// The new voice starts before any other channel is touched: a refused
    /// request leaves the current music playing. A full pool under the reject
    /// policy refuses even when stopping others would have freed a slot.
    ///
    /// With a fade length, the other BGM channels fade out over the same
    /// length while the new one fades in.
    pub fn play_bgm_with(&mut self, name: &str, options: PlayOptions) -> Option<ChannelId> {
        if !self.ensure_running("play_bgm") {
            return None;
        }

        let clip = match self.library.resolve(Category::Bgm, name) {
            Ok(clip) => clip.clone(),
            Err(e) => {
                self.report(Category::Bgm, name, e);
                return None;
            }
        };

        let target = self.config.channel_volume;
        let fade_seconds = options.fade_seconds;
        let fades = &mut self.fades;
        let started = self.pools.bgm.acquire_for_bgm(&mut self.backend, |channel, backend| {
            fades.start_fade_in(channel, backend, clip, fade_seconds, target)
        });
        let allocation = match started {
            Ok(allocation) => allocation,
            Err(e) => {
                self.report(Category::Bgm, name, e);
                return None;
            }
        };
        let id = allocation.channel;
        if allocation.stolen {
            tracing::debug!("{}: stolen for BGM '{}'", id, name);
            self.events.publish(SoundEvent::ChannelStolen { channel: id });
        }

        if options.stop_others.unwrap_or(self.config.stop_others_on_play) {
            for index in (0..self.pools.bgm.len()).filter(|&i| i != id.index) {
                let other = ChannelId::new(Category::Bgm, index);
                let sounding = self.pools.channel(other).map_or(false, Channel::is_playing);
                if fade_seconds > 0.0 && sounding {
                    self.fade_out_channel(other, fade_seconds);
                } else {
                    self.stop_bgm_channel(other);
                }
            }
        }

        tracing::info!("{}: BGM '{}' started (fade {}s)", id, name, fade_seconds.max(0.0));
        self.events.publish(SoundEvent::BgmStarted {
            channel: id,
            name: name.to_string(),
            fade_seconds: fade_seconds.max(0.0),
        });
        Some(id)
    }

    /// Cancel any fade, stop the channel and release its clip
    fn stop_bgm_channel(&mut self, id: ChannelId) {
        let Some(channel) = self.pools.bgm.get_mut(id.index) else {
            return;
        };
        let name = channel.clip_name().map(str::to_string);
        self.fades.cancel(channel, &mut self.backend);
        channel.stop(&mut self.backend, true);

        if let Some(name) = name {
            tracing::info!("{}: BGM '{}' stopped", id, name);
            self.events.publish(SoundEvent::BgmStopped { channel: id, name });
        }
    }

    /// Channel carrying a BGM clip, if any. Unregistered names are reported.
    fn locate_bgm(&self, name: &str, operation: &str) -> Option<ChannelId> {
        if let Err(e) = self.library.resolve(Category::Bgm, name) {
            self.report(Category::Bgm, name, e);
            return None;
        }
        let found = self.pools.find_by_clip_name(Category::Bgm, name);
        if found.is_none() {
            tracing::debug!("{}: BGM '{}' is not on any channel", operation, name);
        }
        found
    }

    /// Whether the configured stop guard lets a stop act on this channel.
    /// A paused channel counts as playing.
    fn stop_permitted(&self, id: ChannelId) -> bool {
        let active = self
            .pools
            .channel(id)
            .map_or(false, |c| c.is_playing() || c.is_paused());
        let permitted = self.config.stop_guard.permits(active);
        if !permitted {
            tracing::debug!(
                "{}: stop skipped by {:?} (active={})",
                id,
                self.config.stop_guard,
                active
            );
        }
        permitted
    }

    /// Stop the first BGM channel carrying `name` and release it
    pub fn stop_bgm(&mut self, name: &str) {
        if !self.ensure_running("stop_bgm") {
            return;
        }
        let Some(id) = self.locate_bgm(name, "stop_bgm") else {
            return;
        };
        if self.stop_permitted(id) {
            self.stop_bgm_channel(id);
        }
    }

    /// Fade the first BGM channel carrying `name` to silence, then stop it.
    ///
    /// The channel keeps its clip until the fade completes; its volume is
    /// restored afterwards.
    pub fn stop_bgm_with_fade_out(&mut self, name: &str, seconds: f32) {
        if !self.ensure_running("stop_bgm_with_fade_out") {
            return;
        }
        let Some(id) = self.locate_bgm(name, "stop_bgm_with_fade_out") else {
            return;
        };
        if self.stop_permitted(id) {
            self.fade_out_channel(id, seconds);
        }
    }

    fn fade_out_channel(&mut self, id: ChannelId, seconds: f32) {
        let Some(channel) = self.pools.bgm.get_mut(id.index) else {
            return;
        };
        if let Some(outcome) = self.fades.start_fade_out(channel, &mut self.backend, seconds) {
            self.finish_fade(outcome);
        }
    }

    /// Stop every BGM channel immediately
    pub fn stop_all_bgm(&mut self) {
        if !self.ensure_running("stop_all_bgm") {
            return;
        }
        for index in 0..self.pools.bgm.len() {
            self.stop_bgm_channel(ChannelId::new(Category::Bgm, index));
        }
    }

    /// Fade out every BGM channel that carries a clip
    pub fn stop_all_bgm_with_fade_out(&mut self, seconds: f32) {
        if !self.ensure_running("stop_all_bgm_with_fade_out") {
            return;
        }
        let busy: Vec<ChannelId> = self
            .pools
            .bgm
            .channels()
            .iter()
            .filter(|c| c.clip().is_some())
            .map(Channel::id)
            .collect();
        for id in busy {
            self.fade_out_channel(id, seconds);
        }
    }

    pub fn pause_bgm(&mut self, name: &str) {
        if !self.ensure_running("pause_bgm") {
            return;
        }
        let Some(id) = self.locate_bgm(name, "pause_bgm") else {
            return;
        };
        let paused = self
            .pools
            .bgm
            .get_mut(id.index)
            .map_or(false, |c| c.pause(&mut self.backend));
        if paused {
            tracing::info!("{}: BGM '{}' paused", id, name);
            self.events.publish(SoundEvent::BgmPaused {
                channel: id,
                name: name.to_string(),
            });
        }
    }

    pub fn resume_bgm(&mut self, name: &str) {
        if !self.ensure_running("resume_bgm") {
            return;
        }
        let Some(id) = self.locate_bgm(name, "resume_bgm") else {
            return;
        };
        let resumed = self
            .pools
            .bgm
            .get_mut(id.index)
            .map_or(false, |c| c.resume(&mut self.backend));
        if resumed {
            tracing::info!("{}: BGM '{}' resumed", id, name);
            self.events.publish(SoundEvent::BgmResumed {
                channel: id,
                name: name.to_string(),
            });
        }
    }

    /// Whether any BGM channel is currently playing `name`
    pub fn is_bgm_playing(&self, name: &str) -> bool {
        self.pools
            .bgm
            .channels()
            .iter()
            .any(|c| c.is_playing() && c.clip_name() == Some(name))
    }

    // ---- volume ----

    /// Set a bus level (linear, clamped to 0.0-1.0).
    ///
    /// Category buses are pushed to every channel of that category; the
    /// master bus goes to the backend's output stage.
    pub fn set_volume(&mut self, bus: Bus, level: f32) {
        if !self.ensure_running("set_volume") {
            return;
        }

        let level = self.volume.set_level(bus, level);
        match bus.category() {
            Some(category) => {
                let gain = self.volume.category_gain(category);
                self.pools
                    .pool_mut(category)
                    .set_bus_gain(&mut self.backend, gain);
            }
            None => self.backend.set_master_gain(self.volume.master_gain()),
        }

        tracing::debug!(
            "{} bus set to {:.3} ({:.1} dB)",
            bus,
            level,
            self.volume.attenuation_db(bus)
        );
        self.events.publish(SoundEvent::VolumeChanged { bus, level });
    }

    /// Current linear level of a bus
    pub fn volume(&self, bus: Bus) -> f32 {
        self.volume.level(bus)
    }

    // ---- accessors ----

    /// Handle for queuing commands from other threads
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn channels(&self, category: Category) -> &[Channel] {
        self.pools.pool(category).channels()
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.pools.channel(id)
    }

    /// Fades still in progress
    pub fn active_fades(&self) -> impl Iterator<Item = &Fade> {
        self.fades.fades()
    }

    pub fn is_fading(&self, id: ChannelId) -> bool {
        self.fades.is_fading(id)
    }

    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }

    pub fn config(&self) -> &SoundConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::backend::{BackendCall, HeadlessBackend};
    use crate::audio_system::channel::ChannelState;
    use crate::audio_system::library::ClipHandle;
    use crate::audio_system::pool::{OverflowPolicy, StopGuard};
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    const BGM0: ChannelId = ChannelId {
        category: Category::Bgm,
        index: 0,
    };
    const BGM1: ChannelId = ChannelId {
        category: Category::Bgm,
        index: 1,
    };
    const SE0: ChannelId = ChannelId {
        category: Category::Se,
        index: 0,
    };
    const SE1: ChannelId = ChannelId {
        category: Category::Se,
        index: 1,
    };

    fn library() -> ClipLibrary {
        let mut library = ClipLibrary::new();
        for name in ["theme", "battle", "ending"] {
            library
                .register(Category::Bgm, name, ClipHandle::silent(Duration::from_secs(120)))
                .unwrap();
        }
        for name in ["click", "boom"] {
            library
                .register(Category::Se, name, ClipHandle::silent(Duration::from_millis(500)))
                .unwrap();
        }
        library
    }

    fn manager_with(config: SoundConfig) -> SoundManager<HeadlessBackend> {
        let mut manager = SoundManager::new(config, library(), HeadlessBackend::new());
        manager.initialize().unwrap();
        manager
    }

    fn manager() -> SoundManager<HeadlessBackend> {
        manager_with(SoundConfig::default())
    }

    fn drain(rx: &Receiver<SoundEvent>) -> Vec<SoundEvent> {
        rx.try_iter().collect()
    }

    fn playing(manager: &SoundManager<HeadlessBackend>, category: Category) -> Vec<ChannelId> {
        manager
            .channels(category)
            .iter()
            .filter(|c| c.is_playing())
            .map(Channel::id)
            .collect()
    }

    #[test]
    fn test_pool_sizes_follow_clip_counts() {
        let manager = manager();
        assert_eq!(manager.channels(Category::Bgm).len(), 3);
        assert_eq!(manager.channels(Category::Se).len(), 2);
        assert_eq!(manager.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn test_unknown_se_touches_nothing() {
        let mut manager = manager();
        let (rx, _id) = manager.events().subscribe();
        manager.backend_mut().clear_calls();

        assert_eq!(manager.play_se("nope"), None);

        assert!(manager.backend().calls().is_empty());
        assert!(manager
            .channels(Category::Se)
            .iter()
            .all(|c| c.state() == ChannelState::Idle));
        assert_eq!(
            drain(&rx),
            vec![SoundEvent::ClipNotFound {
                category: Category::Se,
                name: "nope".to_string()
            }]
        );
    }

    #[test]
    fn test_se_fills_free_channels_then_steals_first() {
        let mut manager = manager();
        let (rx, _id) = manager.events().subscribe();

        assert_eq!(manager.play_se("click"), Some(SE0));
        assert_eq!(manager.play_se("boom"), Some(SE1));
        assert_eq!(manager.play_se("boom"), Some(SE0));

        assert_eq!(manager.channels(Category::Se).len(), 2);
        assert_eq!(manager.channel(SE0).unwrap().clip_name(), Some("boom"));
        assert_eq!(manager.channel(SE1).unwrap().clip_name(), Some("boom"));

        let stolen = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, SoundEvent::ChannelStolen { channel } if *channel == SE0))
            .count();
        assert_eq!(stolen, 1);
    }

    #[test]
    fn test_se_reject_policy_reports_no_free_channel() {
        let mut config = SoundConfig::default();
        config.se_channels = Some(1);
        config.se_overflow = OverflowPolicy::Reject;
        let mut manager = manager_with(config);
        let (rx, _id) = manager.events().subscribe();

        assert_eq!(manager.play_se("click"), Some(SE0));
        assert_eq!(manager.play_se("boom"), None);

        assert_eq!(manager.channel(SE0).unwrap().clip_name(), Some("click"));
        let events = drain(&rx);
        assert_eq!(events.iter().filter(|e| e.is_diagnostic()).count(), 1);
        assert!(matches!(
            events.last(),
            Some(SoundEvent::NoFreeChannel { category: Category::Se, .. })
        ));
    }

    #[test]
    fn test_se_channel_is_released_when_clip_ends() {
        let mut manager = manager();
        manager.play_se("click");

        manager.tick(0.25);
        assert_eq!(manager.channel(SE0).unwrap().state(), ChannelState::Playing);

        manager.tick(0.3);
        let channel = manager.channel(SE0).unwrap();
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.clip().is_none());
        assert_eq!(manager.play_se("boom"), Some(SE0));
    }

    #[test]
    fn test_se_plays_at_unit_pitch_without_looping() {
        let mut manager = manager();
        manager.play_se("click");

        let channel = manager.channel(SE0).unwrap();
        assert_eq!(channel.pitch(), 1.0);
        assert!(!channel.is_looping());
        assert_eq!(manager.backend().is_looping(SE0), Some(false));
    }

    #[test]
    fn test_se_volume_override_goes_through_bus() {
        let mut manager = manager();
        manager.set_volume(Bus::Se, 0.5);

        manager.play_se_with_volume("click", 0.5);

        assert_eq!(manager.channel(SE0).unwrap().volume(), 0.5);
        assert!((manager.backend().volume_of(SE0).unwrap() - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_play_bgm_loops_and_stops_others() {
        let mut manager = manager();
        let (rx, _id) = manager.events().subscribe();

        assert_eq!(manager.play_bgm("theme"), Some(BGM0));
        assert_eq!(manager.backend().is_looping(BGM0), Some(true));
        assert_eq!(manager.play_bgm("battle"), Some(BGM1));

        assert_eq!(playing(&manager, Category::Bgm), vec![BGM1]);
        assert_eq!(manager.channel(BGM1).unwrap().clip_name(), Some("battle"));
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
        assert!(manager.is_bgm_playing("battle"));
        assert!(!manager.is_bgm_playing("theme"));

        assert!(drain(&rx).contains(&SoundEvent::BgmStopped {
            channel: BGM0,
            name: "theme".to_string()
        }));
    }

    #[test]
    fn test_play_bgm_can_keep_others() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let keep = PlayOptions::default().with_stop_others(false);
        assert_eq!(manager.play_bgm_with("battle", keep), Some(BGM1));

        assert_eq!(playing(&manager, Category::Bgm), vec![BGM0, BGM1]);
        assert_eq!(manager.backend().sounding_count(), 2);
    }

    #[test]
    fn test_single_bgm_channel_rejects_second_track() {
        let mut config = SoundConfig::default();
        config.bgm_channels = Some(1);
        let mut manager = manager_with(config);
        let (rx, _id) = manager.events().subscribe();

        manager.play_bgm("theme");
        assert_eq!(manager.play_bgm("battle"), None);

        assert!(manager.is_bgm_playing("theme"));
        assert!(matches!(
            drain(&rx).last(),
            Some(SoundEvent::NoFreeChannel { category: Category::Bgm, .. })
        ));
    }

    #[test]
    fn test_fade_in_is_monotonic_and_reaches_target() {
        let mut config = SoundConfig::default();
        config.channel_volume = 0.8;
        let mut manager = manager_with(config);
        let (rx, _id) = manager.events().subscribe();

        manager.play_bgm_with_fade_in("theme", 1.0);
        assert_eq!(manager.channel(BGM0).unwrap().volume(), 0.0);
        assert!(manager.is_fading(BGM0));

        let mut last = 0.0;
        for _ in 0..12 {
            manager.tick(0.1);
            let volume = manager.channel(BGM0).unwrap().volume();
            assert!(volume >= last);
            last = volume;
        }

        assert!((last - 0.8).abs() < 1e-6);
        assert_eq!(manager.active_fades().count(), 0);
        assert!(drain(&rx).contains(&SoundEvent::FadeCompleted {
            channel: BGM0,
            kind: FadeKind::In
        }));
    }

    #[test]
    fn test_fade_out_releases_channel_and_restores_volume() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();

        manager.stop_bgm_with_fade_out("theme", 1.0);
        for _ in 0..3 {
            manager.tick(0.25);
        }
        let channel = manager.channel(BGM0).unwrap();
        assert_eq!(channel.clip_name(), Some("theme"));
        assert!(channel.volume() < 1.0);

        manager.tick(0.5);
        let channel = manager.channel(BGM0).unwrap();
        assert_eq!(channel.state(), ChannelState::Idle);
        assert_eq!(channel.volume(), 1.0);
        assert!(!manager.is_bgm_playing("theme"));

        let events = drain(&rx);
        assert!(events.contains(&SoundEvent::FadeCompleted {
            channel: BGM0,
            kind: FadeKind::Out
        }));
        assert!(events.contains(&SoundEvent::BgmStopped {
            channel: BGM0,
            name: "theme".to_string()
        }));
    }

    #[test]
    fn test_zero_length_fade_out_stops_immediately() {
        let mut manager = manager();
        manager.play_bgm("theme");

        manager.stop_bgm_with_fade_out("theme", 0.0);

        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
        assert_eq!(manager.active_fades().count(), 0);
    }

    #[test]
    fn test_new_play_cancels_fade_out() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.stop_bgm_with_fade_out("theme", 2.0);
        manager.tick(0.5);

        assert_eq!(manager.play_bgm("theme"), Some(BGM1));

        assert_eq!(manager.active_fades().count(), 0);
        assert_eq!(playing(&manager, Category::Bgm), vec![BGM1]);
        assert_eq!(manager.channel(BGM1).unwrap().volume(), 1.0);
    }

    #[test]
    fn test_stolen_bgm_channel_drops_its_fade() {
        let mut config = SoundConfig::default();
        config.bgm_channels = Some(1);
        config.bgm_overflow = OverflowPolicy::StealFirst;
        let mut manager = manager_with(config);
        let (rx, _id) = manager.events().subscribe();

        manager.play_bgm("theme");
        manager.stop_bgm_with_fade_out("theme", 2.0);
        manager.tick(0.5);

        assert_eq!(manager.play_bgm("battle"), Some(BGM0));
        assert_eq!(manager.active_fades().count(), 0);
        assert_eq!(manager.channel(BGM0).unwrap().clip_name(), Some("battle"));
        assert_eq!(manager.channel(BGM0).unwrap().volume(), 1.0);
        assert!(drain(&rx).contains(&SoundEvent::ChannelStolen { channel: BGM0 }));
    }

    #[test]
    fn test_stop_all_bgm_leaves_nothing_playing() {
        let mut manager = manager();
        let keep = PlayOptions::default().with_stop_others(false);
        manager.play_bgm("theme");
        manager.play_bgm_with("battle", keep);
        manager.play_bgm_with("ending", PlayOptions::fade_in(3.0).with_stop_others(false));
        manager.play_se("click");
        assert_eq!(playing(&manager, Category::Bgm).len(), 3);
        let (rx, _id) = manager.events().subscribe();

        manager.stop_all_bgm();

        assert!(playing(&manager, Category::Bgm).is_empty());
        assert!(manager
            .channels(Category::Bgm)
            .iter()
            .all(|c| c.clip().is_none()));
        assert_eq!(manager.active_fades().count(), 0);
        assert_eq!(playing(&manager, Category::Se), vec![SE0]);

        let stopped = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, SoundEvent::BgmStopped { .. }))
            .count();
        assert_eq!(stopped, 3);
    }

    #[test]
    fn test_stop_all_bgm_with_fade_out() {
        let mut manager = manager();
        let keep = PlayOptions::default().with_stop_others(false);
        manager.play_bgm("theme");
        manager.play_bgm_with("battle", keep);

        manager.stop_all_bgm_with_fade_out(1.0);
        assert_eq!(manager.active_fades().count(), 2);

        manager.tick(1.0);
        assert!(playing(&manager, Category::Bgm).is_empty());
        assert_eq!(manager.backend().sounding_count(), 0);
    }

    #[test]
    fn test_stop_all_se() {
        let mut manager = manager();
        manager.play_se("click");
        manager.play_se("boom");

        manager.stop_all_se();
        assert!(playing(&manager, Category::Se).is_empty());
        assert_eq!(manager.backend().sounding_count(), 0);
    }

    /// Put BGM0 in the Stopped state: clip assigned, voice gone
    fn stopped_theme(manager: &mut SoundManager<HeadlessBackend>) {
        manager.play_bgm("theme");
        manager.backend_mut().drop_voice(BGM0);
        manager.tick(0.0);
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Stopped);
    }

    #[test]
    fn test_stop_guard_require_playing() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);

        let mut manager = self::manager();
        stopped_theme(&mut manager);
        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Stopped);
    }

    #[test]
    fn test_stop_guard_require_not_playing() {
        let mut config = SoundConfig::default();
        config.stop_guard = StopGuard::RequireNotPlaying;

        let mut manager = manager_with(config.clone());
        manager.play_bgm("theme");
        manager.stop_bgm("theme");
        assert!(manager.is_bgm_playing("theme"));

        let mut manager = manager_with(config);
        stopped_theme(&mut manager);
        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
    }

    #[test]
    fn test_stop_guard_always() {
        let mut config = SoundConfig::default();
        config.stop_guard = StopGuard::Always;

        let mut manager = manager_with(config.clone());
        manager.play_bgm("theme");
        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);

        let mut manager = manager_with(config);
        stopped_theme(&mut manager);
        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
    }

    fn state_after_fade_out_stop(guard: StopGuard, stopped: bool) -> ChannelState {
        let mut config = SoundConfig::default();
        config.stop_guard = guard;
        let mut manager = manager_with(config);
        if stopped {
            stopped_theme(&mut manager);
        } else {
            manager.play_bgm("theme");
        }

        manager.stop_bgm_with_fade_out("theme", 0.5);
        manager.tick(0.5);
        manager.channel(BGM0).unwrap().state()
    }

    #[test]
    fn test_fade_out_stop_respects_guard() {
        use ChannelState::{Idle, Playing, Stopped};

        let cases = [
            (StopGuard::RequirePlaying, Idle, Stopped),
            (StopGuard::RequireNotPlaying, Playing, Idle),
            (StopGuard::Always, Idle, Idle),
        ];
        for (guard, from_playing, from_stopped) in cases {
            assert_eq!(state_after_fade_out_stop(guard, false), from_playing, "{:?}", guard);
            assert_eq!(state_after_fade_out_stop(guard, true), from_stopped, "{:?}", guard);
        }
    }

    #[test]
    fn test_stop_unknown_bgm_reports_once() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();

        manager.stop_bgm("nope");
        manager.stop_bgm("battle");

        assert!(manager.is_bgm_playing("theme"));
        assert_eq!(
            drain(&rx),
            vec![SoundEvent::ClipNotFound {
                category: Category::Bgm,
                name: "nope".to_string()
            }]
        );
    }

    #[test]
    fn test_pause_and_resume_bgm() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();

        manager.pause_bgm("theme");
        assert!(!manager.is_bgm_playing("theme"));
        assert!(manager.channel(BGM0).unwrap().is_paused());
        assert_eq!(manager.backend().sounding_count(), 0);

        manager.resume_bgm("theme");
        assert!(manager.is_bgm_playing("theme"));

        assert_eq!(
            drain(&rx),
            vec![
                SoundEvent::BgmPaused {
                    channel: BGM0,
                    name: "theme".to_string()
                },
                SoundEvent::BgmResumed {
                    channel: BGM0,
                    name: "theme".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_paused_bgm_can_be_stopped() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.pause_bgm("theme");

        manager.stop_bgm("theme");
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
    }

    #[test]
    fn test_volume_round_trip() {
        let mut manager = manager();
        for level in [0.1f32, 0.5, 0.9, 1.0] {
            manager.set_volume(Bus::Bgm, level);
            assert!((manager.volume(Bus::Bgm) - level).abs() < 1e-4);
        }

        manager.set_volume(Bus::Se, 0.0);
        assert!(manager.volume(Bus::Se) < 1e-3);
    }

    #[test]
    fn test_category_bus_reaches_playing_channels() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.play_se("click");

        manager.set_volume(Bus::Bgm, 0.5);

        let bgm = manager.channel(BGM0).unwrap();
        assert_eq!(bgm.volume(), 1.0);
        assert!((bgm.output_gain() - 0.5).abs() < 1e-4);
        assert!((manager.backend().volume_of(BGM0).unwrap() - 0.5).abs() < 1e-4);
        assert!((manager.backend().volume_of(SE0).unwrap() - 1.0).abs() < 1e-4);

        // New voices pick up the current bus gain
        manager.play_bgm("battle");
        assert!((manager.backend().volume_of(BGM1).unwrap() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_master_bus_goes_to_output_stage() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();
        manager.backend_mut().clear_calls();

        manager.set_volume(Bus::Master, 0.25);

        assert!((manager.backend().master_gain() - 0.25).abs() < 1e-4);
        assert!(matches!(
            manager.backend().calls(),
            [BackendCall::SetMasterGain(_)]
        ));
        assert!(matches!(
            drain(&rx).as_slice(),
            [SoundEvent::VolumeChanged { bus: Bus::Master, .. }]
        ));
    }

    #[test]
    fn test_backend_failure_reports_once() {
        let mut manager = manager();
        let (rx, _id) = manager.events().subscribe();
        manager.backend_mut().set_failing(true);

        assert_eq!(manager.play_bgm("theme"), None);
        assert_eq!(manager.play_se("click"), None);

        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
        assert_eq!(manager.channel(SE0).unwrap().state(), ChannelState::Idle);
        let failures = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, SoundEvent::BackendFailed { .. }))
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_refused_bgm_keeps_current_music() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();
        manager.backend_mut().set_failing(true);

        assert_eq!(manager.play_bgm_with_fade_in("battle", 1.0), None);

        assert!(manager.is_bgm_playing("theme"));
        assert_eq!(manager.channel(BGM1).unwrap().state(), ChannelState::Idle);
        assert_eq!(manager.active_fades().count(), 0);
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SoundEvent::BackendFailed { .. }));
    }

    #[test]
    fn test_refused_se_keeps_busy_channel() {
        let mut config = SoundConfig::default();
        config.se_channels = Some(1);
        let mut manager = manager_with(config);
        manager.play_se("click");
        let (rx, _id) = manager.events().subscribe();
        manager.backend_mut().set_failing(true);

        assert_eq!(manager.play_se("boom"), None);

        let channel = manager.channel(SE0).unwrap();
        assert_eq!(channel.state(), ChannelState::Playing);
        assert_eq!(channel.clip_name(), Some("click"));
        assert!(manager.backend().is_playing(SE0));
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SoundEvent::BackendFailed { .. }));
    }

    #[test]
    fn test_fade_in_crossfades_other_bgm() {
        let mut manager = manager();
        manager.play_bgm("theme");
        let (rx, _id) = manager.events().subscribe();

        assert_eq!(manager.play_bgm_with_fade_in("battle", 2.0), Some(BGM1));
        manager.tick(0.5);

        assert!(manager.is_bgm_playing("theme"));
        assert!((manager.channel(BGM0).unwrap().volume() - 0.75).abs() < 1e-5);
        assert!((manager.channel(BGM1).unwrap().volume() - 0.25).abs() < 1e-5);
        assert!(!drain(&rx)
            .iter()
            .any(|e| matches!(e, SoundEvent::BgmStopped { .. })));

        manager.tick(1.5);
        assert_eq!(playing(&manager, Category::Bgm), vec![BGM1]);
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
        assert_eq!(manager.channel(BGM1).unwrap().volume(), 1.0);
        assert!(drain(&rx).contains(&SoundEvent::BgmStopped {
            channel: BGM0,
            name: "theme".to_string()
        }));
    }

    #[test]
    fn test_paused_other_bgm_is_cut_on_crossfade() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.pause_bgm("theme");

        manager.play_bgm_with_fade_in("battle", 2.0);

        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
        assert!(!manager.is_fading(BGM0));
    }

    #[test]
    fn test_stop_command_without_length_uses_default_fade() {
        let mut config = SoundConfig::default();
        config.default_fade_seconds = 1.0;
        let mut manager = manager_with(config);
        manager.play_bgm("theme");

        manager.apply(SoundCommand::StopBgm {
            name: "theme".to_string(),
            fade_seconds: None,
        });
        assert!(manager.is_fading(BGM0));
        assert!(manager.is_bgm_playing("theme"));

        manager.tick(1.0);
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);

        manager.play_bgm("theme");
        manager.apply(SoundCommand::StopAllBgm {
            fade_seconds: Some(0.0),
        });
        assert!(playing(&manager, Category::Bgm).is_empty());
        assert_eq!(manager.active_fades().count(), 0);
    }

    #[test]
    fn test_paused_bgm_holds_fade_out() {
        let mut manager = manager();
        manager.play_bgm("theme");
        manager.stop_bgm_with_fade_out("theme", 1.0);
        manager.tick(0.5);

        manager.pause_bgm("theme");
        manager.tick(2.0);
        let channel = manager.channel(BGM0).unwrap();
        assert!(channel.is_paused());
        assert_eq!(channel.clip_name(), Some("theme"));
        assert!(manager.is_fading(BGM0));

        manager.resume_bgm("theme");
        manager.tick(0.5);
        assert_eq!(manager.channel(BGM0).unwrap().state(), ChannelState::Idle);
    }

    #[test]
    fn test_requests_before_initialize_are_ignored() {
        let mut manager = SoundManager::new(SoundConfig::default(), library(), HeadlessBackend::new());

        assert_eq!(manager.play_se("click"), None);
        assert_eq!(manager.play_bgm("theme"), None);
        assert!(manager.backend().calls().is_empty());
        assert_eq!(manager.shutdown(), Err(TransitionError::NotStarted));
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut manager = manager();
        manager.play_bgm_with_fade_in("theme", 2.0);
        manager.play_se("click");
        let (rx, _id) = manager.events().subscribe();

        assert!(manager.shutdown().is_ok());

        assert_eq!(manager.backend().sounding_count(), 0);
        assert_eq!(manager.active_fades().count(), 0);
        assert_eq!(manager.lifecycle(), Lifecycle::ShutDown);
        assert_eq!(manager.play_se("click"), None);
        assert_eq!(manager.shutdown(), Err(TransitionError::AlreadyShutDown));
        assert_eq!(manager.initialize(), Err(TransitionError::AlreadyShutDown));

        let events = drain(&rx);
        assert_eq!(events.last(), Some(&SoundEvent::Shutdown));
        assert!(events.contains(&SoundEvent::LifecycleChanged {
            old_state: Lifecycle::Running,
            new_state: Lifecycle::ShutDown
        }));
    }

    #[test]
    fn test_queued_commands_run_on_tick() {
        let mut manager = manager();
        let sender = manager.command_sender();

        sender.send(SoundCommand::PlaySe {
            name: "click".to_string(),
        });
        sender.send(SoundCommand::PlayBgm {
            name: "theme".to_string(),
            options: PlayOptions::default(),
        });
        assert!(playing(&manager, Category::Se).is_empty());

        manager.tick(0.0);
        assert_eq!(playing(&manager, Category::Se), vec![SE0]);
        assert!(manager.is_bgm_playing("theme"));

        sender.send(SoundCommand::Shutdown);
        manager.tick(0.016);
        assert_eq!(manager.lifecycle(), Lifecycle::ShutDown);
    }
}
