use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickStats {
    pub ticks: u32,
    pub fps: f32,
    pub average_tick_ms: f32,
    pub max_tick_ms: f32,
}

/// Accumulates render tick durations and reports them once per interval.
pub struct TickTimer {
    window_start: Instant,
    tick_start: Option<Instant>,
    ticks: u32,
    total: Duration,
    max: Duration,
}

impl TickTimer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            tick_start: None,
            ticks: 0,
            total: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn begin_tick(&mut self) {
        self.tick_start = Some(Instant::now());
    }

    /// Closes the current tick. Returns statistics when a full report
    /// interval has elapsed, then starts a new interval.
    pub fn end_tick(&mut self) -> Option<TickStats> {
        let now = Instant::now();
        if let Some(start) = self.tick_start.take() {
            self.record(now - start);
        }
        if now.duration_since(self.window_start) >= REPORT_INTERVAL {
            let stats = self.stats(now);
            *self = Self::starting_at(now);
            return Some(stats);
        }
        None
    }

    fn record(&mut self, tick: Duration) {
        self.ticks += 1;
        self.total += tick;
        self.max = self.max.max(tick);
    }

    fn stats(&self, now: Instant) -> TickStats {
        let elapsed = now.duration_since(self.window_start).as_secs_f32();
        let average = if self.ticks > 0 {
            self.total.as_secs_f32() / self.ticks as f32
        } else {
            0.0
        };
        TickStats {
            ticks: self.ticks,
            fps: if elapsed > 0.0 { self.ticks as f32 / elapsed } else { 0.0 },
            average_tick_ms: average * 1000.0,
            max_tick_ms: self.max.as_secs_f32() * 1000.0,
        }
    }
}

impl Default for TickTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stats_from_recorded_ticks() {
        let start = Instant::now();
        let mut timer = TickTimer::starting_at(start);
        for ms in [5, 10, 15] {
            timer.record(Duration::from_millis(ms));
        }

        let stats = timer.stats(start + Duration::from_secs(2));
        assert_eq!(stats.ticks, 3);
        assert_relative_eq!(stats.fps, 1.5);
        assert_relative_eq!(stats.average_tick_ms, 10.0, epsilon = 1e-3);
        assert_relative_eq!(stats.max_tick_ms, 15.0, epsilon = 1e-3);
    }

    #[test]
    fn test_empty_interval() {
        let start = Instant::now();
        let timer = TickTimer::starting_at(start);
        let stats = timer.stats(start + Duration::from_secs(1));
        assert_eq!(stats.ticks, 0);
        assert_eq!(stats.fps, 0.0);
        assert_eq!(stats.average_tick_ms, 0.0);
    }

    #[test]
    fn test_no_report_before_interval() {
        let mut timer = TickTimer::new();
        timer.begin_tick();
        assert!(timer.end_tick().is_none());
        assert_eq!(timer.ticks, 1);
    }

    #[test]
    fn test_report_resets_interval() {
        let mut timer = TickTimer::starting_at(Instant::now() - REPORT_INTERVAL);
        timer.begin_tick();
        let stats = timer.end_tick().expect("interval elapsed");
        assert_eq!(stats.ticks, 1);
        assert_eq!(timer.ticks, 0);
        assert_eq!(timer.total, Duration::ZERO);
    }
}
