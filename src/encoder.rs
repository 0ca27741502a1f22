// Quadrature decoding for the wheel encoders
//
// Phase code is A + 2*B. Rotating forward the code walks 0 -> 3 -> 2 -> 1 -> 0,
// backward it walks 0 -> 1 -> 2 -> 3 -> 0.
//
// QuadratureDecoder is a pure transition function driven by on_edge.
// EncoderFeed owns a decoder on the edge side and publishes every new
// WheelState as one immutable snapshot, so a reader on the command side never
// sees a position from one edge paired with the speed from another.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::messages::{Direction, EdgeEvent, WheelState};

/// Phase code for the given line levels
pub fn phase(a: bool, b: bool) -> u8 {
    a as u8 + 2 * b as u8
}

/// Next phase when rotating forward
pub fn forward_successor(phase: u8) -> u8 {
    ((phase & 0b11) + 3) % 4
}

/// Next phase when rotating backward
pub fn backward_successor(phase: u8) -> u8 {
    ((phase & 0b11) + 1) % 4
}

/// How transitions that are not a forward step are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Anything that is not a forward step counts as one backward step,
    /// including repeats and double skips from bounce. Error is bounded to
    /// one tick per anomalous edge.
    #[default]
    Lossy,
    /// Only true backward steps count; repeats and skips are tallied in
    /// `illegal_transitions` and leave position untouched.
    Strict,
}

#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    position: i64,
    last_phase: u8,
    // ticks per second, signed
    speed: f32,
    direction: Direction,
    last_update: Duration,
    policy: DecodePolicy,
    illegal_transitions: u64,
}

impl QuadratureDecoder {
    /// Start from the phase currently present on the lines
    pub fn new(initial_phase: u8, now: Duration) -> Self {
        Self::with_policy(initial_phase, now, DecodePolicy::Lossy)
    }

    pub fn with_policy(initial_phase: u8, now: Duration, policy: DecodePolicy) -> Self {
        Self {
            position: 0,
            last_phase: initial_phase & 0b11,
            speed: 0.0,
            direction: Direction::Stationary,
            last_update: now,
            policy,
            illegal_transitions: 0,
        }
    }

    /// Process one edge on either line
    pub fn on_edge(&mut self, timestamp: Duration, phase_bits: u8) -> WheelState {
        let new_phase = phase_bits & 0b11;

        let step: i64 = if new_phase == forward_successor(self.last_phase) {
            1
        } else {
            match self.policy {
                DecodePolicy::Lossy => -1,
                DecodePolicy::Strict if new_phase == backward_successor(self.last_phase) => -1,
                DecodePolicy::Strict => {
                    self.illegal_transitions += 1;
                    debug!(
                        "Illegal quadrature transition {} -> {}",
                        self.last_phase, new_phase
                    );
                    self.last_phase = new_phase;
                    return self.snapshot();
                }
            }
        };

        self.position = self.position.wrapping_add(step);
        self.direction = if step > 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };

        let dt = timestamp.saturating_sub(self.last_update);
        if !dt.is_zero() {
            self.speed = step as f32 / dt.as_secs_f32();
        }
        self.last_update = timestamp;
        self.last_phase = new_phase;

        self.snapshot()
    }

    pub fn snapshot(&self) -> WheelState {
        WheelState {
            position: self.position,
            speed: self.speed,
            direction: self.direction,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last_phase(&self) -> u8 {
        self.last_phase
    }

    pub fn illegal_transitions(&self) -> u64 {
        self.illegal_transitions
    }
}

/// Drops edges that follow the previous accepted edge too closely
#[derive(Debug, Clone)]
pub struct EdgeDebouncer {
    min_interval: Duration,
    last: Option<Duration>,
    rejected: u64,
}

impl EdgeDebouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            rejected: 0,
        }
    }

    /// Whether an edge at `timestamp` should reach the decoder
    pub fn accept(&mut self, timestamp: Duration) -> bool {
        if let Some(last) = self.last {
            if timestamp.saturating_sub(last) < self.min_interval {
                self.rejected += 1;
                return false;
            }
        }
        self.last = Some(timestamp);
        true
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// Single writer for one wheel's encoder state
///
/// The first event only seeds the decoder with the current line levels.
pub struct EncoderFeed {
    name: &'static str,
    decoder: Option<QuadratureDecoder>,
    debouncer: EdgeDebouncer,
    policy: DecodePolicy,
    tx: watch::Sender<WheelState>,
}

impl EncoderFeed {
    pub fn new(name: &'static str, min_interval: Duration) -> (Self, EncoderReader) {
        Self::with_policy(name, min_interval, DecodePolicy::Lossy)
    }

    pub fn with_policy(
        name: &'static str,
        min_interval: Duration,
        policy: DecodePolicy,
    ) -> (Self, EncoderReader) {
        let (tx, rx) = watch::channel(WheelState::default());
        let feed = Self {
            name,
            decoder: None,
            debouncer: EdgeDebouncer::new(min_interval),
            policy,
            tx,
        };
        (feed, EncoderReader { rx })
    }

    pub fn on_event(&mut self, event: EdgeEvent) {
        let timestamp = Duration::from_micros(event.timestamp_us);

        if self.decoder.is_none() {
            info!(
                "{} encoder initialized at phase {}",
                self.name,
                event.phase & 0b11
            );
            self.decoder = Some(QuadratureDecoder::with_policy(
                event.phase,
                timestamp,
                self.policy,
            ));
            self.debouncer.accept(timestamp);
            return;
        }

        if !self.debouncer.accept(timestamp) {
            return;
        }
        if let Some(decoder) = self.decoder.as_mut() {
            self.tx.send_replace(decoder.on_edge(timestamp, event.phase));
        }
    }

    pub fn decoder(&self) -> Option<&QuadratureDecoder> {
        self.decoder.as_ref()
    }

    /// Edges dropped as bounce so far
    pub fn bounced(&self) -> u64 {
        self.debouncer.rejected()
    }

    pub fn reader(&self) -> EncoderReader {
        EncoderReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of an [`EncoderFeed`]; safe to poll at any rate
#[derive(Clone)]
pub struct EncoderReader {
    rx: watch::Receiver<WheelState>,
}

impl EncoderReader {
    /// Latest consistent position/speed/direction
    pub fn snapshot(&self) -> WheelState {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_successors() {
        assert_eq!(phase(false, false), 0);
        assert_eq!(phase(true, true), 3);
        let forward: Vec<u8> = (0..4).map(forward_successor).collect();
        assert_eq!(forward, vec![3, 0, 1, 2]);
        let backward: Vec<u8> = (0..4).map(backward_successor).collect();
        assert_eq!(backward, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_forward_sequence() {
        let mut dec = QuadratureDecoder::new(1, ms(0));
        for (i, p) in [0u8, 3, 2, 1, 0, 3, 2, 1].into_iter().enumerate() {
            let state = dec.on_edge(ms(i as u64 + 1), p);
            assert_eq!(state.position, i as i64 + 1);
            assert_eq!(state.direction, Direction::Forward);
        }
        assert_eq!(dec.position(), 8);
    }

    #[test]
    fn test_backward_sequence() {
        let mut dec = QuadratureDecoder::new(0, ms(0));
        for (i, p) in [1u8, 2, 3, 0, 1, 2, 3, 0].into_iter().enumerate() {
            let state = dec.on_edge(ms(i as u64 + 1), p);
            assert_eq!(state.position, -(i as i64 + 1));
        }
        assert_eq!(dec.position(), -8);
        assert_eq!(dec.direction(), Direction::Backward);
    }

    #[test]
    fn test_speed_from_edge_interval() {
        let mut dec = QuadratureDecoder::new(0, ms(0));
        let state = dec.on_edge(ms(10), 3);
        assert!((state.speed - 100.0).abs() < 1e-3);
        let state = dec.on_edge(ms(30), 3); // repeat of phase 3
        assert!((state.speed + 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_lossy_skip_counts_one_backward() {
        let mut dec = QuadratureDecoder::new(0, ms(0));
        // 0 -> 2 skips a phase
        dec.on_edge(ms(1), 2);
        assert_eq!(dec.position(), -1);
        assert_eq!(dec.last_phase(), 2);
        assert_eq!(dec.illegal_transitions(), 0);
    }

    #[test]
    fn test_strict_policy_flags_skips() {
        let mut dec = QuadratureDecoder::with_policy(0, ms(0), DecodePolicy::Strict);
        dec.on_edge(ms(1), 2);
        assert_eq!(dec.position(), 0);
        assert_eq!(dec.illegal_transitions(), 1);
        // resynchronized on phase 2, so 2 -> 1 is a forward step
        dec.on_edge(ms(2), 1);
        assert_eq!(dec.position(), 1);
        dec.on_edge(ms(3), 2);
        assert_eq!(dec.position(), 0);
    }

    #[test]
    fn test_zero_interval_keeps_speed() {
        let mut dec = QuadratureDecoder::new(0, ms(0));
        dec.on_edge(ms(5), 3);
        let before = dec.speed();
        dec.on_edge(ms(5), 2);
        assert_eq!(dec.speed(), before);
        assert_eq!(dec.position(), 2);
    }

    #[test]
    fn test_debouncer() {
        let mut debounce = EdgeDebouncer::new(Duration::from_micros(50));
        assert!(debounce.accept(Duration::from_micros(100)));
        assert!(!debounce.accept(Duration::from_micros(120)));
        assert!(debounce.accept(Duration::from_micros(150)));
        assert_eq!(debounce.rejected(), 1);
    }

    #[test]
    fn test_feed_publishes_snapshots() {
        let (mut feed, reader) = EncoderFeed::new("left", Duration::from_micros(50));
        // seed only
        feed.on_event(EdgeEvent { timestamp_us: 0, phase: 0 });
        assert_eq!(reader.snapshot(), WheelState::default());

        feed.on_event(EdgeEvent { timestamp_us: 1_000, phase: 3 });
        feed.on_event(EdgeEvent { timestamp_us: 1_010, phase: 2 }); // bounce
        feed.on_event(EdgeEvent { timestamp_us: 2_000, phase: 2 });

        let state = reader.snapshot();
        assert_eq!(state.position, 2);
        assert_eq!(state.direction, Direction::Forward);
        assert!((state.speed - 1000.0).abs() < 1e-2);
        assert_eq!(feed.bounced(), 1);
        assert_eq!(feed.reader().snapshot(), state);
    }
}
