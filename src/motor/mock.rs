// Recording actuator and timer for simulation and tests

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use super::actuator::{Actuator, ActuatorError, Result, Timer};
use super::board::BoardError;

/// A single call observed by a [`MockActuator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Start(f32),
    Update(f32),
    Direction(bool),
    Stop,
}

#[derive(Default)]
struct MockActuatorInner {
    calls: Vec<ActuatorCall>,
    unavailable: bool,
}

/// Actuator that records every call instead of driving hardware
///
/// Clones share the same call log, so a test can keep a handle while the
/// motor channel owns another.
#[derive(Clone)]
pub struct MockActuator {
    channel: u8,
    inner: Arc<Mutex<MockActuatorInner>>,
}

impl MockActuator {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            inner: Arc::new(Mutex::new(MockActuatorInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockActuatorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All calls seen so far
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    /// Make every subsequent call fail as if the board stopped answering
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn record(&mut self, call: ActuatorCall) -> Result<()> {
        let mut inner = self.lock();
        if inner.unavailable {
            return Err(ActuatorError::Unavailable {
                channel: self.channel,
                source: BoardError::Timeout {
                    channel: self.channel,
                },
            });
        }
        debug!("Simulated channel {}: {:?}", self.channel, call);
        inner.calls.push(call);
        Ok(())
    }
}

impl Actuator for MockActuator {
    fn start_duty(&mut self, pct: f32) -> Result<()> {
        self.record(ActuatorCall::Start(pct))
    }

    fn update_duty(&mut self, pct: f32) -> Result<()> {
        self.record(ActuatorCall::Update(pct))
    }

    fn set_direction(&mut self, forward: bool) -> Result<()> {
        self.record(ActuatorCall::Direction(forward))
    }

    fn stop_duty(&mut self) -> Result<()> {
        self.record(ActuatorCall::Stop)
    }
}

/// Timer that records requested sleeps and returns immediately
#[derive(Clone, Default)]
pub struct MockTimer {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl MockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Timer for MockTimer {
    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}
