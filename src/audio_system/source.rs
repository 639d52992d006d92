/// Audio categories and channel addressing
///
/// Defines the two clip categories, the three volume buses and the id that
/// names one playback slot.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Clip / channel categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Looping background music
    Bgm,

    /// Fire-and-forget sound effects
    Se,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Bgm => write!(f, "BGM"),
            Category::Se => write!(f, "SE"),
        }
    }
}

impl Category {
    /// Whether channels of this category loop their clip
    pub fn loops(&self) -> bool {
        match self {
            Category::Bgm => true,
            Category::Se => false,
        }
    }

    /// The volume bus feeding this category
    pub fn bus(&self) -> Bus {
        match self {
            Category::Bgm => Bus::Bgm,
            Category::Se => Bus::Se,
        }
    }
}

/// Volume buses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    /// Output-stage attenuator applied to the final mix
    Master,

    /// Pre-mix gain for BGM channels
    Bgm,

    /// Pre-mix gain for SE channels
    Se,
}

impl Bus {
    pub const ALL: [Bus; 3] = [Bus::Master, Bus::Bgm, Bus::Se];

    /// The category this bus feeds, `None` for the master bus
    pub fn category(&self) -> Option<Category> {
        match self {
            Bus::Master => None,
            Bus::Bgm => Some(Category::Bgm),
            Bus::Se => Some(Category::Se),
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::Master => write!(f, "Master"),
            Bus::Bgm => write!(f, "BGM"),
            Bus::Se => write!(f, "SE"),
        }
    }
}

/// Identifies one playback slot: its category and its index inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId {
    pub category: Category,
    pub index: usize,
}

impl ChannelId {
    pub fn new(category: Category, index: usize) -> Self {
        Self { category, index }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.category, self.index)
    }
}
