use std::time::{Duration, Instant};

/// Timing of one completed present.
#[derive(Debug, Copy, Clone)]
pub struct PresentSample {
    /// Time since the previous present, clamped. `None` for the first present
    /// after a reset.
    pub interval: Option<Duration>,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Zero-based index of this present.
    pub index: u64,
}

/// Aggregated present statistics.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct PresentStats {
    pub presented: u64,

    /// Smoothed presents per second; 0 until two presents have been timed.
    pub fps: f32,

    pub last_interval: Option<Duration>,
}

/// Measures the present cadence.
///
/// Frames are presented as they arrive, so the interval follows the camera
/// rather than the display. Intervals are clamped so a stall (surface loss,
/// debugger) does not drag the estimate for seconds afterwards.
#[derive(Debug, Clone)]
pub struct PresentClock {
    last: Option<Instant>,
    presented: u64,
    dt_min: Duration,
    dt_max: Duration,

    /// Exponential moving average of the interval, in seconds.
    smoothed: Option<f32>,
    smoothing: f32,
    last_interval: Option<Duration>,
}

impl PresentClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom interval clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            presented: 0,
            dt_min,
            dt_max,
            smoothed: None,
            smoothing: 0.1,
            last_interval: None,
        }
    }

    /// Forgets the previous present so the next interval is not measured
    /// across a pause. Counters are kept.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn tick(&mut self) -> PresentSample {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> PresentSample {
        let interval = self
            .last
            .map(|last| now.saturating_duration_since(last).clamp(self.dt_min, self.dt_max));

        if let Some(dt) = interval {
            let secs = dt.as_secs_f32();
            self.smoothed = Some(match self.smoothed {
                Some(avg) => avg + (secs - avg) * self.smoothing,
                None => secs,
            });
            self.last_interval = Some(dt);
        }

        self.last = Some(now);
        let sample = PresentSample { interval, now, index: self.presented };
        self.presented = self.presented.wrapping_add(1);
        sample
    }

    pub fn stats(&self) -> PresentStats {
        PresentStats {
            presented: self.presented,
            fps: self.smoothed.filter(|s| *s > 0.0).map_or(0.0, |s| 1.0 / s),
            last_interval: self.last_interval,
        }
    }
}

impl Default for PresentClock {
    fn default() -> Self {
        Self::new()
    }
}
