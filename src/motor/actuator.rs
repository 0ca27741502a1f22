// Hardware capabilities consumed by the motor channels
//
// The channels never touch pins or registers; they talk to an Actuator (one
// per motor) and pace ramps through a Timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::board::{BoardError, MotorBoard};

/// Error returned when a motor can no longer be commanded
///
/// Fatal for the command path: a motor that cannot be confirmed stopped must
/// not be driven further. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Actuator on channel {channel} unavailable: {source}")]
    Unavailable {
        channel: u8,
        #[source]
        source: BoardError,
    },

    #[error("Motor board lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// Duty-cycle output for a single motor
///
/// `start_duty` must be issued once before `update_duty` is accepted.
pub trait Actuator {
    fn start_duty(&mut self, pct: f32) -> Result<()>;
    fn update_duty(&mut self, pct: f32) -> Result<()>;
    fn set_direction(&mut self, forward: bool) -> Result<()>;
    fn stop_duty(&mut self) -> Result<()>;
}

/// Blocking delay used to pace ramps
pub trait Timer {
    fn sleep(&self, duration: Duration);
}

/// Timer backed by the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// One channel of a motor board shared between several motors
pub struct BoardChannel<P> {
    board: Arc<Mutex<MotorBoard<P>>>,
    channel: u8,
}

impl<P> BoardChannel<P> {
    pub fn new(board: Arc<Mutex<MotorBoard<P>>>, channel: u8) -> Self {
        Self { board, channel }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }
}

impl<P: std::io::Read + std::io::Write> BoardChannel<P> {
    fn with_board<T>(
        &self,
        op: impl FnOnce(&mut MotorBoard<P>, u8) -> std::result::Result<T, BoardError>,
    ) -> Result<T> {
        let mut board = self.board.lock().map_err(|_| ActuatorError::Poisoned)?;
        op(&mut *board, self.channel).map_err(|source| ActuatorError::Unavailable {
            channel: self.channel,
            source,
        })
    }
}

impl<P: std::io::Read + std::io::Write> Actuator for BoardChannel<P> {
    fn start_duty(&mut self, pct: f32) -> Result<()> {
        self.with_board(|b, ch| b.start_duty(ch, pct))
    }

    fn update_duty(&mut self, pct: f32) -> Result<()> {
        self.with_board(|b, ch| b.update_duty(ch, pct))
    }

    fn set_direction(&mut self, forward: bool) -> Result<()> {
        self.with_board(|b, ch| b.set_direction(ch, forward))
    }

    fn stop_duty(&mut self) -> Result<()> {
        self.with_board(|b, ch| b.stop_duty(ch))
    }
}
