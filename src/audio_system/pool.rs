/// Channel pools
///
/// Each category owns an ordered, fixed-capacity set of channels. The pool
/// decides which channel serves a request: the first idle one, and when none
/// is idle, whatever the overflow policy says.

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, SoundError};

use super::backend::AudioBackend;
use super::channel::Channel;
use super::library::Clip;
use super::source::{Category, ChannelId};

/// What to do when every channel of a pool is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum OverflowPolicy {
    /// Fail the request with `NoFreeChannel`
    Reject,

    /// Reuse the channel at index 0 (not LRU)
    StealFirst,

    /// Append channels up to a limit, then reject
    Grow { max_channels: usize },
}

/// Which channel state a stop-by-name request is allowed to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopGuard {
    /// Stop only channels that are currently playing
    RequirePlaying,

    /// Stop only channels that hold a clip but are silent
    RequireNotPlaying,

    /// Stop whatever channel holds the clip
    Always,
}

impl StopGuard {
    pub fn permits(&self, playing: bool) -> bool {
        match self {
            StopGuard::RequirePlaying => playing,
            StopGuard::RequireNotPlaying => !playing,
            StopGuard::Always => true,
        }
    }
}

impl Default for StopGuard {
    fn default() -> Self {
        StopGuard::RequirePlaying
    }
}

/// Outcome of a channel acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub channel: ChannelId,

    /// A busy channel was taken over
    pub stolen: bool,

    /// The pool appended a new channel
    pub grown: bool,
}

/// Ordered channel set for one category
#[derive(Debug)]
pub struct ChannelPool {
    category: Category,
    channels: Vec<Channel>,
    overflow: OverflowPolicy,
    bus_gain: f32,
}

impl ChannelPool {
    pub fn new(category: Category, size: usize, overflow: OverflowPolicy, bus_gain: f32) -> Self {
        let channels = (0..size)
            .map(|i| Channel::new(ChannelId::new(category, i), bus_gain))
            .collect();

        tracing::debug!(
            "Created {} pool with {} channels (overflow={:?})",
            category,
            size,
            overflow
        );

        Self {
            category,
            channels,
            overflow,
            bus_gain,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    pub fn playing_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_playing()).count()
    }

    fn grow(&mut self) -> Option<usize> {
        match self.overflow {
            OverflowPolicy::Grow { max_channels } if self.channels.len() < max_channels => {
                let index = self.channels.len();
                self.channels
                    .push(Channel::new(ChannelId::new(self.category, index), self.bus_gain));
                tracing::debug!("{} pool grew to {} channels", self.category, index + 1);
                Some(index)
            }
            _ => None,
        }
    }

    /// Pick a slot when the preferred search found nothing
    fn overflow_slot(&mut self) -> Result<(usize, bool, bool), SoundError> {
        let no_free = SoundError::NoFreeChannel {
            category: self.category,
        };
        match self.overflow {
            OverflowPolicy::StealFirst if !self.channels.is_empty() => Ok((0, true, false)),
            OverflowPolicy::Grow { .. } => self.grow().map(|i| (i, false, true)).ok_or(no_free),
            _ => Err(no_free),
        }
    }

    /// Start a one-shot on the first channel that is not playing.
    ///
    /// Pitch is reset to 1.0; the clip is not looped and is released when the
    /// voice finishes. A stolen channel is replaced by the backend; when the
    /// new voice fails the old one keeps playing.
    pub fn acquire_for_se(
        &mut self,
        backend: &mut dyn AudioBackend,
        clip: Clip,
        volume: f32,
    ) -> Result<Allocation, SoundError> {
        let index = self.channels.iter().position(|c| !c.is_playing());
        self.start_on(index, backend, |channel, backend| {
            channel.play_one_shot(backend, clip, volume, 1.0)
        })
    }

    /// Start looping playback on the first channel with no assigned clip.
    ///
    /// `start` assigns and starts the clip. Nothing changes unless it
    /// succeeds.
    pub fn acquire_for_bgm<F>(
        &mut self,
        backend: &mut dyn AudioBackend,
        start: F,
    ) -> Result<Allocation, SoundError>
    where
        F: FnOnce(&mut Channel, &mut dyn AudioBackend) -> Result<(), BackendError>,
    {
        let index = self.channels.iter().position(|c| c.clip().is_none());
        self.start_on(index, backend, start)
    }

    fn start_on<F>(
        &mut self,
        preferred: Option<usize>,
        backend: &mut dyn AudioBackend,
        start: F,
    ) -> Result<Allocation, SoundError>
    where
        F: FnOnce(&mut Channel, &mut dyn AudioBackend) -> Result<(), BackendError>,
    {
        let (index, stolen, grown) = match preferred {
            Some(index) => (index, false, false),
            None => self.overflow_slot()?,
        };

        let channel = &mut self.channels[index];
        let id = channel.id();
        if let Err(e) = start(channel, backend) {
            if grown {
                self.channels.truncate(index);
            }
            return Err(e.into());
        }

        Ok(Allocation {
            channel: id,
            stolen,
            grown,
        })
    }

    /// Index of the first channel whose assigned clip has this name
    pub fn find_by_clip_name(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.clip_name() == Some(name))
    }

    /// Stop every channel and clear its clip. Returns how many held a clip.
    pub fn release_all(&mut self, backend: &mut dyn AudioBackend) -> usize {
        let mut released = 0;
        for channel in &mut self.channels {
            if channel.clip().is_some() || channel.is_playing() {
                released += 1;
            }
            channel.stop(backend, true);
        }
        tracing::debug!("Released {} {} channels", released, self.category);
        released
    }

    /// Broadcast a new category bus gain to every channel
    pub fn set_bus_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) {
        self.bus_gain = gain;
        for channel in &mut self.channels {
            channel.set_bus_gain(backend, gain);
        }
    }

    /// Poll the backend for every channel; returns one-shots that finished
    pub fn sync(&mut self, backend: &dyn AudioBackend) -> Vec<ChannelId> {
        self.channels
            .iter_mut()
            .filter_map(|c| c.sync(backend).then(|| c.id()))
            .collect()
    }
}

/// The BGM and SE pools of one manager
#[derive(Debug)]
pub struct PoolSet {
    pub bgm: ChannelPool,
    pub se: ChannelPool,
}

impl PoolSet {
    pub fn pool(&self, category: Category) -> &ChannelPool {
        match category {
            Category::Bgm => &self.bgm,
            Category::Se => &self.se,
        }
    }

    pub fn pool_mut(&mut self, category: Category) -> &mut ChannelPool {
        match category {
            Category::Bgm => &mut self.bgm,
            Category::Se => &mut self.se,
        }
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.pool(id.category).get(id.index)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.pool_mut(id.category).get_mut(id.index)
    }

    pub fn find_by_clip_name(&self, category: Category, name: &str) -> Option<ChannelId> {
        self.pool(category)
            .find_by_clip_name(name)
            .map(|index| ChannelId::new(category, index))
    }
}
