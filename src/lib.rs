// Gunnar differential-drive runtime
//
// Wheel targets come in over zenoh, pass a pair-level throttle, and drive two
// motors through bounded, ramped duty fractions. Quadrature edges come back
// and are decoded into per-wheel position/speed snapshots.

pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod throttle;
