// Rates, timeouts, topics, motor and encoder configuration
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Maximum rate at which a new wheel pair is forwarded to the motors
pub const THROTTLE_HZ: f64 = 10.0;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Zenoh topics
pub const TOPIC_LWHEEL_VTARGET: &str = "gunnar/lwheel_vtarget"; // left wheel target
pub const TOPIC_RWHEEL_VTARGET: &str = "gunnar/rwheel_vtarget"; // right wheel target
pub const TOPIC_LEFT_EDGES: &str = "gunnar/encoder/left/edges"; // left encoder edges
pub const TOPIC_RIGHT_EDGES: &str = "gunnar/encoder/right/edges"; // right encoder edges
pub const TOPIC_WHEEL_STATE: &str = "gunnar/state/wheels"; // position/speed snapshots
pub const TOPIC_COMMAND: &str = "gunnar/state/command"; // last accepted pair
pub const TOPIC_HEALTH: &str = "gunnar/state/health"; // health status

// Motor configuration
// Serial port for the motor board
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// Board channels wired to each wheel
pub const CHANNEL_LEFT: u8 = 0;
pub const CHANNEL_RIGHT: u8 = 1;

// Fractions below this magnitude stop the motor instead of driving it
pub const DEAD_BAND: f32 = 0.01;

// Value substituted for a NaN wheel target
pub const NAN_DEFAULT: f32 = 0.0;

// Ramp pacing
pub const RAMP_INCREMENT: Duration = Duration::from_millis(10);
pub const SHUTDOWN_RAMP: Duration = Duration::from_millis(500);

// Edges closer together than this are treated as contact bounce
pub const ENCODER_MIN_EDGE_INTERVAL: Duration = Duration::from_micros(50);
