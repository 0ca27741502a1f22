// Fraction bounding and time-stepped linear ramps
//
// Interpolation is linear in fraction space; duty cycle is not assumed to be
// linear in torque or speed.

use std::time::Duration;

use tracing::warn;

/// Bound a requested fraction to [-1, 1]
///
/// Over-range requests are common at control saturation, so they are logged
/// and capped rather than rejected. NaN maps to 0.0.
pub fn clamp(x: f32) -> f32 {
    if x.is_nan() {
        warn!("Motor fraction is NaN, using 0.0");
        return 0.0;
    }
    if x.abs() > 1.0 {
        warn!("Capping motor fraction from {}", x);
    }
    x.clamp(-1.0, 1.0)
}

/// Number of steps needed to cover `duration` in `increment` slices (at least one)
pub fn step_count(duration: Duration, increment: Duration) -> usize {
    let increment = increment.as_nanos();
    if increment == 0 {
        return 1;
    }
    let n = duration.as_nanos().div_ceil(increment);
    n.max(1) as usize
}

/// Inclusive ramp: first value is `start`, last is `stop`
pub fn steps(start: f32, stop: f32, duration: Duration, increment: Duration) -> RampSteps {
    RampSteps::inclusive(start, stop, step_count(duration, increment))
}

/// Ramp that leaves `start` out: the first value is already one step along
///
/// Used when `start` is the value the motor is currently running at.
pub fn approach(start: f32, stop: f32, duration: Duration, increment: Duration) -> RampSteps {
    RampSteps::exclusive(start, stop, step_count(duration, increment))
}

/// Lazy, finite sequence of interpolated fractions
///
/// Each value is meant to be applied after waiting one increment; the
/// consumer supplies the pacing. Clone to restart.
#[derive(Debug, Clone)]
pub struct RampSteps {
    start: f32,
    stop: f32,
    len: usize,
    // denominator of the interpolation parameter
    span: usize,
    // offset added to the index before interpolating
    skip: usize,
    index: usize,
}

impl RampSteps {
    pub fn inclusive(start: f32, stop: f32, len: usize) -> Self {
        Self {
            start,
            stop,
            len,
            span: len.saturating_sub(1),
            skip: 0,
            index: 0,
        }
    }

    pub fn exclusive(start: f32, stop: f32, len: usize) -> Self {
        Self {
            start,
            stop,
            len,
            span: len,
            skip: 1,
            index: 0,
        }
    }

    fn value_at(&self, i: usize) -> f32 {
        let k = i + self.skip;
        if self.span == 0 || k >= self.span {
            return self.stop;
        }
        let t = k as f32 / self.span as f32;
        self.start + (self.stop - self.start) * t
    }
}

impl Iterator for RampSteps {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.index >= self.len {
            return None;
        }
        let value = self.value_at(self.index);
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len - self.index;
        (n, Some(n))
    }
}

impl ExactSizeIterator for RampSteps {}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_clamp_in_range_is_identity() {
        for f in [-1.0, -0.5, 0.0, 0.004, 0.75, 1.0] {
            assert_eq!(clamp(f), f);
        }
    }

    #[test]
    fn test_clamp_out_of_range() {
        assert_eq!(clamp(1.5), 1.0);
        assert_eq!(clamp(-20.0), -1.0);
        assert_eq!(clamp(f32::INFINITY), 1.0);
        assert_eq!(clamp(f32::NAN), 0.0);
    }

    #[test]
    fn test_full_swing_ramp() {
        let values: Vec<f32> =
            steps(-1.0, 1.0, Duration::from_secs(1), Duration::from_millis(100)).collect();
        assert_eq!(values.len(), 10);
        assert!((values[0] + 1.0).abs() < EPS);
        assert!((values[9] - 1.0).abs() < EPS);
        assert!(values.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_approach_skips_start() {
        let values: Vec<f32> =
            approach(0.0, 0.5, Duration::from_millis(200), Duration::from_millis(100)).collect();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 0.25).abs() < EPS);
        assert!((values[1] - 0.5).abs() < EPS);
    }

    #[test]
    fn test_step_count_rounds_up() {
        assert_eq!(step_count(Duration::from_millis(250), Duration::from_millis(100)), 3);
        assert_eq!(step_count(Duration::from_millis(200), Duration::from_millis(100)), 2);
        assert_eq!(step_count(Duration::ZERO, Duration::from_millis(100)), 1);
        assert_eq!(step_count(Duration::from_secs(1), Duration::ZERO), 1);
    }

    #[test]
    fn test_single_step_lands_on_stop() {
        let values: Vec<f32> =
            steps(0.2, 0.8, Duration::from_millis(5), Duration::from_millis(10)).collect();
        assert_eq!(values, vec![0.8]);
    }

    #[test]
    fn test_restartable_by_clone() {
        let ramp = steps(0.0, 1.0, Duration::from_millis(40), Duration::from_millis(10));
        assert_eq!(ramp.len(), 4);
        let first: Vec<f32> = ramp.clone().collect();
        let second: Vec<f32> = ramp.collect();
        assert_eq!(first, second);
    }
}
