use std::time::{Duration, Instant};

/// Frame timer that hands out delta time for `SoundManager::tick`
pub struct FrameClock {
    last_frame: Option<Instant>,
    max_delta: Duration,
}

impl FrameClock {
    /// Create a clock that never reports more than `max_delta_ms` per frame
    pub fn new(max_delta_ms: u64) -> Self {
        Self {
            last_frame: None,
            max_delta: Duration::from_millis(max_delta_ms),
        }
    }

    /// Seconds since the previous call.
    /// The first call returns 0; long stalls are capped at the max delta.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta_at(now)
    }

    fn delta_at(&mut self, now: Instant) -> f32 {
        let delta = match self.last_frame {
            None => Duration::ZERO,
            Some(last) => now.saturating_duration_since(last).min(self.max_delta),
        };
        self.last_frame = Some(now);
        delta.as_secs_f32()
    }

    /// Forget the previous frame, e.g. after the loop was suspended
    pub fn reset(&mut self) {
        self.last_frame = None;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        // 100ms cap
        Self::new(100)
    }
}
