// Left/right motor pair for the differential base
//
// Left is always commanded before right. The two writes are sequential, so
// the wheels never change at exactly the same instant.

use std::time::Duration;

use tracing::{debug, info};

use super::actuator::{Actuator, Result, Timer};
use super::channel::MotorChannel;
use super::ramp;

pub struct MotorPair<A> {
    left: MotorChannel<A>,
    right: MotorChannel<A>,
}

impl<A: Actuator> MotorPair<A> {
    pub fn new(left: MotorChannel<A>, right: MotorChannel<A>) -> Self {
        Self { left, right }
    }

    /// Build a pair directly from two actuators
    pub fn from_actuators(left: A, right: A) -> Self {
        Self::new(
            MotorChannel::new("left", left),
            MotorChannel::new("right", right),
        )
    }

    /// Apply (left, right) fractions, left first
    pub fn set_fractions(&mut self, (left, right): (f32, f32)) -> Result<()> {
        self.left.set_frac(left)?;
        self.right.set_frac(right)
    }

    /// Stop both motors; the right side is still stopped if the left fails
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping both motors");
        let left = self.left.stop();
        let right = self.right.stop();
        left.and(right)
    }

    /// Ramp both wheels in lockstep
    ///
    /// Both sides use the same step count, so they arrive together even if
    /// their deltas differ. Each step sleeps `increment` and then applies both
    /// fractions.
    pub fn ramp(
        &mut self,
        stops: (f32, f32),
        starts: Option<(f32, f32)>,
        duration: Duration,
        increment: Duration,
        timer: &impl Timer,
    ) -> Result<()> {
        let nsteps = ramp::step_count(duration, increment);
        let (stop_l, stop_r) = (ramp::clamp(stops.0), ramp::clamp(stops.1));

        let (lefts, rights) = match starts {
            Some((start_l, start_r)) => (
                ramp::RampSteps::inclusive(ramp::clamp(start_l), stop_l, nsteps),
                ramp::RampSteps::inclusive(ramp::clamp(start_r), stop_r, nsteps),
            ),
            None => (
                ramp::RampSteps::exclusive(self.left.fraction(), stop_l, nsteps),
                ramp::RampSteps::exclusive(self.right.fraction(), stop_r, nsteps),
            ),
        };
        debug!(
            "Ramping pair to ({:.3}, {:.3}) in {} steps",
            stop_l, stop_r, nsteps
        );

        for pair in lefts.zip(rights) {
            timer.sleep(increment);
            self.set_fractions(pair)?;
        }
        Ok(())
    }

    /// Live (left, right) fractions
    pub fn fractions(&self) -> (f32, f32) {
        (self.left.fraction(), self.right.fraction())
    }

    pub fn left(&self) -> &MotorChannel<A> {
        &self.left
    }

    pub fn right(&self) -> &MotorChannel<A> {
        &self.right
    }
}
