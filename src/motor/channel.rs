// Single motor driven by a signed duty fraction
//
// Stopped <-> Running(fraction). Near-zero fractions stop the motor instead
// of driving the H-bridge at a duty it can only buzz at.

use std::time::Duration;

use tracing::debug;

use super::actuator::{Actuator, Result, Timer};
use super::ramp;
use crate::config::DEAD_BAND;

/// Observable state of a motor channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelState {
    Stopped,
    Running(f32),
}

/// Actuation state owned by one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorState {
    pub fraction: f32,
    /// Whether the duty-cycle generator has been started
    pub started: bool,
}

pub struct MotorChannel<A> {
    name: &'static str,
    actuator: A,
    state: MotorState,
    dead_band: f32,
}

impl<A: Actuator> MotorChannel<A> {
    pub fn new(name: &'static str, actuator: A) -> Self {
        Self {
            name,
            actuator,
            state: MotorState::default(),
            dead_band: DEAD_BAND,
        }
    }

    pub fn with_dead_band(mut self, dead_band: f32) -> Self {
        self.dead_band = dead_band.abs();
        self
    }

    /// Drive the motor at `frac` (clamped to [-1, 1])
    pub fn set_frac(&mut self, frac: f32) -> Result<()> {
        let frac = ramp::clamp(frac);

        if frac.abs() < self.dead_band {
            return self.stop();
        }

        let pct = frac.abs() * 100.0;
        debug!("{} motor: fraction {:.3} ({:.1}%)", self.name, frac, pct);

        if self.state.started {
            self.actuator.update_duty(pct)?;
        } else {
            self.actuator.start_duty(pct)?;
            self.state.started = true;
        }
        self.actuator.set_direction(frac > 0.0)?;
        self.state.fraction = frac;
        Ok(())
    }

    /// Stop the motor, even if it is already stopped
    pub fn stop(&mut self) -> Result<()> {
        debug!("{} motor: stop", self.name);
        self.actuator.stop_duty()?;
        self.state = MotorState::default();
        Ok(())
    }

    /// Walk linearly to `target`, sleeping `increment` before each step
    ///
    /// Without an explicit `start` the ramp begins one step away from the
    /// current fraction. Blocks for the whole ramp.
    pub fn ramp(
        &mut self,
        target: f32,
        start: Option<f32>,
        duration: Duration,
        increment: Duration,
        timer: &impl Timer,
    ) -> Result<()> {
        let target = ramp::clamp(target);
        let steps = match start {
            Some(start) => ramp::steps(ramp::clamp(start), target, duration, increment),
            None => ramp::approach(self.state.fraction, target, duration, increment),
        };
        debug!(
            "{} motor: ramp to {:.3} in {} steps",
            self.name,
            target,
            steps.len()
        );

        for frac in steps {
            timer.sleep(increment);
            self.set_frac(frac)?;
        }
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        if self.state.started {
            ChannelState::Running(self.state.fraction)
        } else {
            ChannelState::Stopped
        }
    }

    pub fn motor_state(&self) -> MotorState {
        self.state
    }

    pub fn fraction(&self) -> f32 {
        self.state.fraction
    }

    /// Current duty magnitude in percent
    pub fn duty_percent(&self) -> f32 {
        self.state.fraction.abs() * 100.0
    }

    pub fn is_started(&self) -> bool {
        self.state.started
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::actuator::ActuatorError;
    use crate::motor::mock::{ActuatorCall, MockActuator, MockTimer};

    fn channel() -> (MotorChannel<MockActuator>, MockActuator) {
        let actuator = MockActuator::new(0);
        (MotorChannel::new("left", actuator.clone()), actuator)
    }

    #[test]
    fn test_dead_band_stops() {
        let (mut motor, log) = channel();
        motor.set_frac(0.005).unwrap();
        assert_eq!(motor.state(), ChannelState::Stopped);
        assert_eq!(log.calls(), vec![ActuatorCall::Stop]);
    }

    #[test]
    fn test_start_then_update() {
        let (mut motor, log) = channel();
        motor.set_frac(0.5).unwrap();
        motor.set_frac(-0.25).unwrap();
        assert_eq!(
            log.calls(),
            vec![
                ActuatorCall::Start(50.0),
                ActuatorCall::Direction(true),
                ActuatorCall::Update(25.0),
                ActuatorCall::Direction(false),
            ]
        );
        assert_eq!(motor.state(), ChannelState::Running(-0.25));
        assert_eq!(motor.duty_percent(), 25.0);
    }

    #[test]
    fn test_restart_after_dead_band() {
        let (mut motor, log) = channel();
        motor.set_frac(0.75).unwrap();
        motor.set_frac(0.0).unwrap();
        motor.set_frac(0.75).unwrap();
        let calls = log.calls();
        assert_eq!(calls[2], ActuatorCall::Stop);
        assert_eq!(calls[3], ActuatorCall::Start(75.0));
    }

    #[test]
    fn test_over_range_is_capped() {
        let (mut motor, log) = channel();
        motor.set_frac(-3.0).unwrap();
        assert_eq!(motor.fraction(), -1.0);
        assert_eq!(log.calls()[0], ActuatorCall::Start(100.0));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut motor, log) = channel();
        motor.stop().unwrap();
        motor.stop().unwrap();
        assert_eq!(log.calls(), vec![ActuatorCall::Stop, ActuatorCall::Stop]);
        assert!(!motor.is_started());
    }

    #[test]
    fn test_ramp_from_current() {
        let (mut motor, log) = channel();
        let timer = MockTimer::new();
        motor
            .ramp(0.5, None, Duration::from_millis(200), Duration::from_millis(100), &timer)
            .unwrap();

        let duties: Vec<f32> = log
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCall::Start(p) | ActuatorCall::Update(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(duties.len(), 2);
        assert!((duties[0] - 25.0).abs() < 1e-3);
        assert!((duties[1] - 50.0).abs() < 1e-3);
        assert_eq!(timer.sleeps(), vec![Duration::from_millis(100); 2]);
        assert_eq!(motor.state(), ChannelState::Running(0.5));
    }

    #[test]
    fn test_ramp_with_explicit_start() {
        let (mut motor, log) = channel();
        let timer = MockTimer::new();
        motor
            .ramp(
                0.0,
                Some(1.0),
                Duration::from_millis(30),
                Duration::from_millis(10),
                &timer,
            )
            .unwrap();
        let calls = log.calls();
        assert_eq!(calls[0], ActuatorCall::Start(100.0));
        assert_eq!(*calls.last().unwrap(), ActuatorCall::Stop);
        assert_eq!(motor.state(), ChannelState::Stopped);
    }

    #[test]
    fn test_unavailable_actuator_propagates() {
        let (mut motor, log) = channel();
        log.set_unavailable(true);
        assert!(matches!(
            motor.set_frac(0.5),
            Err(ActuatorError::Unavailable { channel: 0, .. })
        ));
        assert!(motor.stop().is_err());
        assert!(!motor.is_started());
    }
}
