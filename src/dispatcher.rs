// Coalesces per-wheel targets into throttled pair commands
//
// Left and right targets arrive on independent streams. Each update is merged
// into the pending pair, and the pair (not each wheel) passes the throttle.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::messages::{Command, Wheel};
use crate::motor::actuator::{Actuator, Result, Timer};
use crate::motor::MotorPair;
use crate::throttle::Throttle;

pub struct CommandDispatcher<A> {
    motors: MotorPair<A>,
    throttle: Throttle,
    // latest requested pair, accepted or not
    targets: Command,
    // pair last forwarded to the motors
    current: Command,
}

impl<A: Actuator> CommandDispatcher<A> {
    pub fn new(motors: MotorPair<A>, throttle: Throttle) -> Self {
        Self {
            motors,
            throttle,
            targets: Command::zero(),
            current: Command::zero(),
        }
    }

    /// Update one wheel's target, keeping the other, and try to forward the pair
    pub fn on_target(&mut self, wheel: Wheel, value: f32) -> Result<bool> {
        self.on_target_at(Instant::now(), wheel, value)
    }

    pub fn on_target_at(&mut self, now: Instant, wheel: Wheel, value: f32) -> Result<bool> {
        let candidate = self.targets.with_wheel(wheel, value);
        self.submit_at(now, candidate)
    }

    /// Offer a full pair; returns whether it reached the motors
    pub fn submit(&mut self, candidate: Command) -> Result<bool> {
        self.submit_at(Instant::now(), candidate)
    }

    pub fn submit_at(&mut self, now: Instant, candidate: Command) -> Result<bool> {
        let candidate = self.throttle.sanitize(candidate);
        self.targets = candidate;

        if !self.throttle.allow_at(now, &candidate, &self.current) {
            return Ok(false);
        }

        self.throttle.reset_at(now);
        self.current = candidate;
        debug!(
            "Forwarding wheel command ({:.3}, {:.3})",
            candidate.left, candidate.right
        );
        self.motors.set_fractions(candidate.as_tuple())?;
        Ok(true)
    }

    /// Retry the pending targets if an earlier update was throttled
    pub fn tick(&mut self) -> Result<bool> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<bool> {
        if self.targets == self.current {
            return Ok(false);
        }
        self.submit_at(now, self.targets)
    }

    /// Request a stop through the throttle
    pub fn stop(&mut self) -> Result<bool> {
        self.stop_at(Instant::now())
    }

    pub fn stop_at(&mut self, now: Instant) -> Result<bool> {
        self.submit_at(now, Command::zero())
    }

    /// Stop both motors immediately, bypassing the throttle
    pub fn halt(&mut self) -> Result<()> {
        info!("Halting motors");
        self.targets = Command::zero();
        self.current = Command::zero();
        self.motors.stop()
    }

    /// Ramp both wheels from where they are to `stops`, blocking until done
    pub fn ramp_to(
        &mut self,
        stops: Command,
        duration: Duration,
        increment: Duration,
        timer: &impl Timer,
    ) -> Result<()> {
        let stops = self.throttle.sanitize(stops);
        self.motors
            .ramp(stops.as_tuple(), None, duration, increment, timer)?;
        self.targets = stops;
        self.current = stops;
        self.throttle.reset();
        Ok(())
    }

    pub fn targets(&self) -> Command {
        self.targets
    }

    pub fn current(&self) -> Command {
        self.current
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn motors(&self) -> &MotorPair<A> {
        &self.motors
    }
}
