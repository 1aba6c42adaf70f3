//! Frame clock shared by a part bundle and its anim controls

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
enum ClockMode {
    /// Frame time only moves when the owner sets or advances it
    Manual,
    /// Frame time is sampled from the wall clock on every `tick()`
    RealTime { start: Instant },
}

#[derive(Debug)]
struct ClockInner {
    mode: ClockMode,
    /// f64 seconds stored as raw bits
    frame_time: AtomicU64,
    frame_count: AtomicU64,
}

/// Frame clock.
///
/// All playback math reads the *frame* time, which only changes between
/// ticks. Every control bound to one bundle sees the same time within a
/// single `PartBundle::update`.
#[derive(Clone, Debug)]
pub struct AnimClock {
    inner: Arc<ClockInner>,
}

impl AnimClock {
    /// Create a manually driven clock starting at time 0
    pub fn manual() -> Self {
        Self::with_mode(ClockMode::Manual)
    }

    /// Create a clock that follows the wall clock on each `tick()`
    pub fn real_time() -> Self {
        Self::with_mode(ClockMode::RealTime { start: Instant::now() })
    }

    fn with_mode(mode: ClockMode) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                mode,
                frame_time: AtomicU64::new(0f64.to_bits()),
                frame_count: AtomicU64::new(0),
            }),
        }
    }

    /// Current frame time in seconds
    pub fn frame_time(&self) -> f64 {
        f64::from_bits(self.inner.frame_time.load(Ordering::Acquire))
    }

    /// Number of ticks so far
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count.load(Ordering::Acquire)
    }

    /// Set the frame time directly
    pub fn set_frame_time(&self, seconds: f64) {
        self.inner.frame_time.store(seconds.to_bits(), Ordering::Release);
        self.inner.frame_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Move the frame time forward by `dt` seconds
    pub fn advance(&self, dt: f64) {
        self.set_frame_time(self.frame_time() + dt);
    }

    /// Start a new frame. Real-time clocks sample the wall clock; manual
    /// clocks just count the frame.
    pub fn tick(&self) {
        match self.inner.mode {
            ClockMode::RealTime { start } => {
                self.set_frame_time(start.elapsed().as_secs_f64());
            }
            ClockMode::Manual => {
                self.inner.frame_count.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    /// True if this is a manually driven clock
    pub fn is_manual(&self) -> bool {
        matches!(self.inner.mode, ClockMode::Manual)
    }
}

impl Default for AnimClock {
    fn default() -> Self {
        Self::real_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = AnimClock::manual();
        assert_eq!(clock.frame_time(), 0.0);

        clock.advance(0.5);
        clock.advance(0.25);
        assert!((clock.frame_time() - 0.75).abs() < 1e-12);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = AnimClock::manual();
        let other = clock.clone();
        clock.set_frame_time(3.0);
        assert_eq!(other.frame_time(), 3.0);
    }

    #[test]
    fn test_manual_tick_keeps_time() {
        let clock = AnimClock::manual();
        clock.set_frame_time(1.0);
        clock.tick();
        assert_eq!(clock.frame_time(), 1.0);
        assert!(clock.is_manual());
    }

    #[test]
    fn test_real_time_tick_is_monotonic() {
        let clock = AnimClock::real_time();
        clock.tick();
        let first = clock.frame_time();
        clock.tick();
        assert!(clock.frame_time() >= first);
    }
}
