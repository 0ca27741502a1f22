// Rate limiter for the combined wheel command stream
//
// `allow` is a pure query; acceptance is committed separately with `reset`,
// so rejected candidates never restart the clock.

use std::time::{Duration, Instant, TryFromFloatSecsError};

use tracing::warn;

use crate::config::NAN_DEFAULT;
use crate::messages::Command;

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("Throttle rate must be a finite, non-negative number of Hz, got {0}")]
    Invalid(f64),

    #[error("Throttle rate {hz} Hz has no representable period: {source}")]
    Period {
        hz: f64,
        #[source]
        source: TryFromFloatSecsError,
    },
}

#[derive(Debug, Clone)]
pub struct Throttle {
    period: Duration,
    // None until the first acceptance, so the first command always passes
    last_accepted: Option<Instant>,
    nan_default: f32,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_accepted: None,
            nan_default: NAN_DEFAULT,
        }
    }

    /// Throttle that accepts at most `hz` commands per second
    ///
    /// A rate of 0 disables throttling.
    pub fn from_rate(hz: f64) -> Result<Self, RateError> {
        if !hz.is_finite() || hz < 0.0 {
            return Err(RateError::Invalid(hz));
        }
        if hz == 0.0 {
            return Ok(Self::new(Duration::ZERO));
        }
        let period =
            Duration::try_from_secs_f64(1.0 / hz).map_err(|source| RateError::Period { hz, source })?;
        Ok(Self::new(period))
    }

    /// Value substituted for NaN components of a candidate
    pub fn with_nan_default(mut self, default: f32) -> Self {
        self.nan_default = default;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether `candidate` may replace `current` right now
    pub fn allow(&self, candidate: &Command, current: &Command) -> bool {
        self.allow_at(Instant::now(), candidate, current)
    }

    pub fn allow_at(&self, now: Instant, candidate: &Command, current: &Command) -> bool {
        let candidate = candidate.sanitized(self.nan_default);
        self.past_at(now) && candidate != *current
    }

    /// Replace NaN components with the configured default
    pub fn sanitize(&self, candidate: Command) -> Command {
        if candidate.has_nan() {
            warn!(
                "NaN in wheel command {:?}, substituting {}",
                candidate, self.nan_default
            );
            candidate.sanitized(self.nan_default)
        } else {
            candidate
        }
    }

    /// Mark an acceptance at the current time
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.last_accepted = Some(now);
    }

    /// Time left before the next command may pass, floored at zero
    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last_accepted {
            Some(t) => self.period.saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        }
    }

    /// Whether a full period has elapsed since the last acceptance
    pub fn past(&self) -> bool {
        self.past_at(Instant::now())
    }

    pub fn past_at(&self, now: Instant) -> bool {
        match self.last_accepted {
            Some(t) => now.saturating_duration_since(t) >= self.period,
            None => true,
        }
    }
}
