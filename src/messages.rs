// Message types exchanged between the runtime and the rest of the robot

use serde::{Deserialize, Serialize};

// Per-wheel velocity target from teleop/planners -> runtime
// Value is already a normalized fraction; physical unit conversion happens upstream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WheelTarget {
    pub value: f32,
}

/// Which side of the robot a target or encoder belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Wheel {
    Left,
    Right,
}

/// Left/right fraction pair forwarded to the motors as one unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Command {
    pub left: f32,
    pub right: f32,
}

impl Command {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns the pair as a tuple (left, right)
    pub fn as_tuple(&self) -> (f32, f32) {
        (self.left, self.right)
    }

    /// Copy of this command with the given wheel replaced
    pub fn with_wheel(self, wheel: Wheel, value: f32) -> Self {
        match wheel {
            Wheel::Left => Self { left: value, ..self },
            Wheel::Right => Self { right: value, ..self },
        }
    }

    /// Replace NaN components with `default`
    pub fn sanitized(self, default: f32) -> Self {
        let fix = |v: f32| if v.is_nan() { default } else { v };
        Self {
            left: fix(self.left),
            right: fix(self.right),
        }
    }

    pub fn has_nan(&self) -> bool {
        self.left.is_nan() || self.right.is_nan()
    }
}

impl From<(f32, f32)> for Command {
    fn from((left, right): (f32, f32)) -> Self {
        Self { left, right }
    }
}

// Raw encoder transition from the GPIO edge source -> runtime
// phase = A + 2*B, sampled right after the edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EdgeEvent {
    pub timestamp_us: u64,
    pub phase: u8,
}

/// Direction of the most recent encoder step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Stationary,
    Forward,
    Backward,
}

/// Position/speed snapshot for one wheel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WheelState {
    /// Signed tick count since start
    pub position: i64,
    /// Ticks per second, signed by direction
    pub speed: f32,
    pub direction: Direction,
}

// Wheel feedback published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct WheelStates {
    pub left: WheelState,
    pub right: WheelState,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
