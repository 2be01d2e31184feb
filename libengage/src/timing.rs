//! Human-like pacing
//!
//! Delays are drawn uniformly from configured bounds using an injected RNG, so
//! a seeded controller produces the same schedule every time. The controller
//! only advises; the rate limiter alone enforces caps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::TimingConfig;
use crate::error::{ConfigError, Result};

/// Validated pacing bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingBounds {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub batch_size: u32,
    pub min_batch_pause: Duration,
    pub max_batch_pause: Duration,
}

impl PacingBounds {
    pub fn from_config(config: &TimingConfig) -> Result<Self> {
        let bounds = Self {
            min_delay: secs("timing.min_action_delay_secs", config.min_action_delay_secs)?,
            max_delay: secs("timing.max_action_delay_secs", config.max_action_delay_secs)?,
            batch_size: config.batch_size,
            min_batch_pause: secs("timing.min_batch_pause_secs", config.min_batch_pause_secs)?,
            max_batch_pause: secs("timing.max_batch_pause_secs", config.max_batch_pause_secs)?,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(invalid("timing.min_action_delay_secs", "exceeds maximum"));
        }
        if self.min_batch_pause > self.max_batch_pause {
            return Err(invalid("timing.min_batch_pause_secs", "exceeds maximum"));
        }
        if self.batch_size == 0 {
            return Err(invalid("timing.batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| invalid(field, "must be a finite, non-negative number"))
}

fn invalid(field: &str, reason: &str) -> crate::error::EngageError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Produces action delays and batch pauses
#[derive(Debug)]
pub struct TimingController<R = StdRng> {
    bounds: PacingBounds,
    rng: R,
    actions_since_pause: u32,
}

impl TimingController<StdRng> {
    /// Build from config, seeding from `timing.seed` or from entropy
    pub fn from_config(config: &TimingConfig) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::new(PacingBounds::from_config(config)?, rng))
    }
}

impl<R: Rng> TimingController<R> {
    pub fn new(bounds: PacingBounds, rng: R) -> Self {
        Self {
            bounds,
            rng,
            actions_since_pause: 0,
        }
    }

    /// Delay to apply before the next action
    pub fn next_delay(&mut self) -> Duration {
        uniform(&mut self.rng, self.bounds.min_delay, self.bounds.max_delay)
    }

    /// True once `actions_since_last_pause` reaches the batch size
    pub fn should_pause_for_batch(&self, actions_since_last_pause: u32) -> bool {
        actions_since_last_pause >= self.bounds.batch_size
    }

    /// Count one performed action; returns true when a batch pause is due
    pub fn note_action(&mut self) -> bool {
        self.actions_since_pause += 1;
        self.should_pause_for_batch(self.actions_since_pause)
    }

    /// Draw a batch pause and restart the rolling counter
    pub fn next_batch_pause(&mut self) -> Duration {
        self.actions_since_pause = 0;
        uniform(
            &mut self.rng,
            self.bounds.min_batch_pause,
            self.bounds.max_batch_pause,
        )
    }

    pub fn actions_since_pause(&self) -> u32 {
        self.actions_since_pause
    }

    pub fn bounds(&self) -> &PacingBounds {
        &self.bounds
    }
}

fn uniform<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if min >= max {
        return min;
    }
    let secs = rng.gen_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Spread `total` actions over `batches` with a little jitter.
///
/// The remainder lands on random batches, then neighbouring batches trade a
/// single action back and forth. The sum always equals `total`.
pub fn plan_batches<R: Rng>(total: u32, batches: u32, rng: &mut R) -> Vec<u32> {
    if batches == 0 {
        return Vec::new();
    }
    let n = batches as usize;
    let mut plan = vec![total / batches; n];

    for _ in 0..(total % batches) {
        let idx = rng.gen_range(0..n);
        plan[idx] += 1;
    }

    for i in 0..n.saturating_sub(1) {
        if plan[i] > 2 && plan[i + 1] > 2 {
            match rng.gen_range(-1i32..=1) {
                1 => {
                    plan[i] += 1;
                    plan[i + 1] -= 1;
                }
                -1 => {
                    plan[i] -= 1;
                    plan[i + 1] += 1;
                }
                _ => {}
            }
        }
    }

    plan
}
