use std::time::Duration;

/// Hard ceiling on catch-up ticks per frame. After a long stall the
/// accumulator is reset instead of replaying the whole backlog.
pub const MAX_CATCHUP_TICKS: u32 = 20;

/// Fixed-timestep accumulator decoupling simulation ticks from the display
/// refresh rate.
///
/// Each frame feeds in the real elapsed time; whole tick durations are
/// consumed as discrete ticks and the fractional remainder becomes the
/// interpolation alpha for blending between the last two tick states.
#[derive(Debug, Clone)]
pub struct Timestep {
    tick_ms: f64,
    accumulator_ms: f64,
    alpha: f32,
}

impl Timestep {
    pub fn new(tick_rate: f64) -> Self {
        Self {
            tick_ms: 1000.0 / tick_rate,
            accumulator_ms: 0.0,
            alpha: 0.0,
        }
    }

    pub fn set_rate(&mut self, tick_rate: f64) {
        self.tick_ms = 1000.0 / tick_rate;
    }

    /// Advance by real elapsed time, returning how many discrete ticks to run.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator_ms += elapsed.as_secs_f64() * 1000.0;

        let mut ticks = 0;
        while self.accumulator_ms >= self.tick_ms && ticks < MAX_CATCHUP_TICKS {
            self.accumulator_ms -= self.tick_ms;
            ticks += 1;
        }
        if self.accumulator_ms >= self.tick_ms {
            // Cannot keep up; drop the backlog.
            self.accumulator_ms = 0.0;
        }

        self.alpha = (self.accumulator_ms / self.tick_ms).clamp(0.0, 1.0) as f32;
        ticks
    }

    /// Interpolation factor in `[0, 1]`: how far into the next tick we are.
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.accumulator_ms = 0.0;
        self.alpha = 0.0;
    }
}

/// Blend between the previous and current value of a tick-stepped quantity.
pub fn lerp(alpha: f32, prev: f64, current: f64) -> f64 {
    let a = alpha.clamp(0.0, 1.0) as f64;
    current * a + prev * (1.0 - a)
}
