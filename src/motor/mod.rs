// Motor control module for the Gunnar differential base
//
// Provides:
// - Fraction clamping and lockstep linear ramps
// - Actuator/timer capabilities and the serial motor-board backend
// - Single-motor channels and the left/right motor pair

pub mod actuator;
pub mod board;
mod channel;
pub mod mock;
mod pair;
pub mod ramp;

pub use actuator::{Actuator, ActuatorError, BoardChannel, ThreadTimer, Timer};
pub use board::{BoardError, MotorBoard};
pub use channel::{ChannelState, MotorChannel, MotorState};
pub use pair::MotorPair;
