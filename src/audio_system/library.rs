/// Clip library
///
/// Named lookup from logical clip name to clip handle, kept separately for
/// the BGM and SE categories. Read-only once the manager is running.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClipEntry, SoundConfig};
use crate::error::{ConfigError, SoundError};

use super::source::Category;

struct ClipAsset {
    bytes: Arc<Vec<u8>>,
    duration: Option<Duration>,
}

/// Opaque, shared handle to preloaded audio data
#[derive(Clone)]
pub struct ClipHandle(Arc<ClipAsset>);

impl ClipHandle {
    /// Wrap encoded audio bytes; WAV data gets its duration probed
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let duration = probe_wav_duration(&bytes);
        Self(Arc::new(ClipAsset {
            bytes: Arc::new(bytes),
            duration,
        }))
    }

    /// A handle with no audio data and a known length, for headless playback
    pub fn silent(duration: Duration) -> Self {
        Self(Arc::new(ClipAsset {
            bytes: Arc::new(Vec::new()),
            duration: Some(duration),
        }))
    }

    /// Read an audio file fully into memory
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        tracing::debug!("Preloaded clip {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(bytes))
    }

    pub fn bytes(&self) -> &Arc<Vec<u8>> {
        &self.0.bytes
    }

    /// Playback length, when known
    pub fn duration(&self) -> Option<Duration> {
        self.0.duration
    }

    /// Whether both handles point at the same asset
    pub fn same_asset(&self, other: &ClipHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ClipHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipHandle")
            .field("bytes", &self.0.bytes.len())
            .field("duration", &self.0.duration)
            .finish()
    }
}

fn probe_wav_duration(bytes: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let sample_rate = reader.spec().sample_rate;
    if sample_rate == 0 {
        return None;
    }
    let frames = reader.duration();
    Some(Duration::from_secs_f64(frames as f64 / sample_rate as f64))
}

/// A registered clip: logical name plus handle
#[derive(Debug, Clone)]
pub struct Clip {
    name: Arc<str>,
    handle: ClipHandle,
}

impl Clip {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &ClipHandle {
        &self.handle
    }
}

#[derive(Default)]
struct ClipSet {
    clips: Vec<Clip>,
    index: HashMap<Arc<str>, usize>,
}

/// Clip library for both categories
#[derive(Default)]
pub struct ClipLibrary {
    bgm: ClipSet,
    se: ClipSet,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every clip listed in the config manifest.
    ///
    /// Relative paths resolve against `base_dir`.
    pub fn from_config(config: &SoundConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut library = Self::new();
        library.load_entries(Category::Bgm, &config.bgm_clips, base_dir)?;
        library.load_entries(Category::Se, &config.se_clips, base_dir)?;
        tracing::info!(
            "Clip library ready: {} BGM, {} SE",
            library.len(Category::Bgm),
            library.len(Category::Se)
        );
        Ok(library)
    }

    fn load_entries(
        &mut self,
        category: Category,
        entries: &[ClipEntry],
        base_dir: &Path,
    ) -> Result<(), ConfigError> {
        for entry in entries {
            let path = base_dir.join(&entry.path);
            let handle = ClipHandle::load(&path).map_err(|source| ConfigError::ClipLoadFailed {
                name: entry.name.clone(),
                path: path.display().to_string(),
                source,
            })?;
            self.register(category, &entry.name, handle)?;
        }
        Ok(())
    }

    fn set(&self, category: Category) -> &ClipSet {
        match category {
            Category::Bgm => &self.bgm,
            Category::Se => &self.se,
        }
    }

    /// Register a clip under a name unique within its category
    pub fn register(
        &mut self,
        category: Category,
        name: &str,
        handle: ClipHandle,
    ) -> Result<(), SoundError> {
        let set = match category {
            Category::Bgm => &mut self.bgm,
            Category::Se => &mut self.se,
        };

        if set.index.contains_key(name) {
            return Err(SoundError::DuplicateName {
                category,
                name: name.to_string(),
            });
        }

        let name: Arc<str> = Arc::from(name);
        set.index.insert(Arc::clone(&name), set.clips.len());
        set.clips.push(Clip { name, handle });
        Ok(())
    }

    /// Resolve a name to its clip (exact, case-sensitive match)
    pub fn resolve(&self, category: Category, name: &str) -> Result<&Clip, SoundError> {
        let set = self.set(category);
        set.index
            .get(name)
            .map(|&i| &set.clips[i])
            .ok_or_else(|| SoundError::ClipNotFound {
                category,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.set(category).index.contains_key(name)
    }

    /// Registered names in declaration order
    pub fn names(&self, category: Category) -> impl Iterator<Item = &str> {
        self.set(category).clips.iter().map(|c| c.name())
    }

    pub fn len(&self, category: Category) -> usize {
        self.set(category).clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bgm.clips.is_empty() && self.se.clips.is_empty()
    }
}
