// Fixed-rate command loop with watchdog
// Note: if teleop stops publishing targets, the watchdog requests a stop so the
// robot does not keep driving on the last target forever

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};

// local imports
use crate::config::{
    CHANNEL_LEFT, CHANNEL_RIGHT, CMD_TIMEOUT, ENCODER_MIN_EDGE_INTERVAL, LOOP_HZ, MOTOR_PORT,
    RAMP_INCREMENT, SHUTDOWN_RAMP, THROTTLE_HZ, TOPIC_COMMAND, TOPIC_HEALTH, TOPIC_LEFT_EDGES,
    TOPIC_LWHEEL_VTARGET, TOPIC_RIGHT_EDGES, TOPIC_RWHEEL_VTARGET, TOPIC_WHEEL_STATE,
};
use crate::dispatcher::CommandDispatcher;
use crate::encoder::{EncoderFeed, EncoderReader};
use crate::messages::{Command, EdgeEvent, RuntimeHealth, Wheel, WheelStates, WheelTarget};
use crate::motor::actuator::{self, Actuator, Timer};
use crate::motor::mock::MockActuator;
use crate::motor::{BoardChannel, MotorBoard, MotorPair, ThreadTimer};
use crate::throttle::Throttle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type SampleSubscriber =
    zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>;

/// Settings the binary may override
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub port: String,
    /// Drive recording actuators instead of the motor board
    pub mock: bool,
    pub loop_hz: u64,
    pub throttle_hz: f64,
    pub cmd_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            mock: false,
            loop_hz: LOOP_HZ,
            throttle_hz: THROTTLE_HZ,
            cmd_timeout: CMD_TIMEOUT,
        }
    }
}

pub struct Runtime<A> {
    dispatcher: CommandDispatcher<A>,
    cmd_timeout: Duration,
    target_received_at: Option<Instant>,
    health: RuntimeHealth,
}

impl<A: Actuator> Runtime<A> {
    pub fn new(dispatcher: CommandDispatcher<A>, cmd_timeout: Duration) -> Self {
        Self {
            dispatcher,
            cmd_timeout,
            target_received_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first target
        }
    }

    /// Process an incoming wheel target
    pub fn on_target(&mut self, wheel: Wheel, target: WheelTarget) -> actuator::Result<bool> {
        self.on_target_at(Instant::now(), wheel, target)
    }

    pub fn on_target_at(
        &mut self,
        now: Instant,
        wheel: Wheel,
        target: WheelTarget,
    ) -> actuator::Result<bool> {
        self.target_received_at = Some(now);
        self.dispatcher.on_target_at(now, wheel, target.value)
    }

    /// Retry throttled targets and apply the watchdog
    pub fn step(&mut self) -> actuator::Result<()> {
        self.step_at(Instant::now())
    }

    pub fn step_at(&mut self, now: Instant) -> actuator::Result<()> {
        let fresh = self
            .target_received_at
            .is_some_and(|t| now.saturating_duration_since(t) <= self.cmd_timeout);

        if fresh {
            self.health = RuntimeHealth::Ok;
        } else if self.health != RuntimeHealth::CmdStale {
            // Watchdog triggered - stop the robot
            warn!(
                "No wheel target for {:?}, stopping robot",
                self.cmd_timeout
            );
            self.health = RuntimeHealth::CmdStale;
            self.dispatcher.stop_at(now)?;
            return Ok(());
        }

        self.dispatcher.tick_at(now)?;
        Ok(())
    }

    /// Ramp both wheels to rest, then stop them even if the ramp failed
    ///
    /// Returns the first error seen.
    pub fn shut_down(
        &mut self,
        duration: Duration,
        increment: Duration,
        timer: &impl Timer,
    ) -> actuator::Result<()> {
        let ramped = self
            .dispatcher
            .ramp_to(Command::zero(), duration, increment, timer);
        if let Err(e) = &ramped {
            error!("Shutdown ramp failed: {}", e);
        }

        let halted = self.dispatcher.halt();
        if let Err(e) = &halted {
            error!("Failed to halt motors: {}", e);
        }
        ramped.and(halted)
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<A> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher<A> {
        &mut self.dispatcher
    }
}

/// Feed one wheel's edge stream into its decoder until the subscriber closes
async fn pump_edges(subscriber: SampleSubscriber, mut feed: EncoderFeed) {
    while let Ok(sample) = subscriber.recv_async().await {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<EdgeEvent>(&payload) {
            Ok(event) => feed.on_event(event),
            Err(e) => warn!("Failed to parse encoder edge: {}", e),
        }
    }
}

pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    let throttle = Throttle::from_rate(options.throttle_hz)?;

    if options.mock {
        info!("Simulation mode: motor commands are only logged");
        let motors = MotorPair::from_actuators(
            MockActuator::new(CHANNEL_LEFT),
            MockActuator::new(CHANNEL_RIGHT),
        );
        return run_with(CommandDispatcher::new(motors, throttle), &options).await;
    }

    info!("Opening motor board on {}", options.port);
    let mut board = MotorBoard::open(&options.port)?;
    for channel in [CHANNEL_LEFT, CHANNEL_RIGHT] {
        if !board.ping(channel)? {
            warn!("Motor channel {} not responding to ping", channel);
            return Err(format!("motor channel {} not responding", channel).into());
        }
    }
    let board = Arc::new(Mutex::new(board));
    let motors = MotorPair::from_actuators(
        BoardChannel::new(board.clone(), CHANNEL_LEFT),
        BoardChannel::new(board, CHANNEL_RIGHT),
    );
    run_with(CommandDispatcher::new(motors, throttle), &options).await
}

async fn run_with<A: Actuator>(
    dispatcher: CommandDispatcher<A>,
    options: &RuntimeOptions,
) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_left = session.declare_subscriber(TOPIC_LWHEEL_VTARGET).await?;
    let sub_right = session.declare_subscriber(TOPIC_RWHEEL_VTARGET).await?;
    let pub_wheels = session.declare_publisher(TOPIC_WHEEL_STATE).await?;
    let pub_command = session.declare_publisher(TOPIC_COMMAND).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // Encoder path runs on its own tasks; the loop only reads snapshots
    let (left_feed, left_reader) = EncoderFeed::new("left", ENCODER_MIN_EDGE_INTERVAL);
    let (right_feed, right_reader) = EncoderFeed::new("right", ENCODER_MIN_EDGE_INTERVAL);
    tokio::spawn(pump_edges(
        session.declare_subscriber(TOPIC_LEFT_EDGES).await?,
        left_feed,
    ));
    tokio::spawn(pump_edges(
        session.declare_subscriber(TOPIC_RIGHT_EDGES).await?,
        right_feed,
    ));

    let mut runtime = Runtime::new(dispatcher, options.cmd_timeout);
    let mut tick = interval(loop_period(options.loop_hz));
    let mut published = None;

    info!(
        "Runtime started: {}Hz loop, {:?} throttle period, {}ms watchdog timeout",
        options.loop_hz,
        runtime.dispatcher().throttle().period(),
        options.cmd_timeout.as_millis()
    );
    info!("Subscribed to: {}, {}", TOPIC_LWHEEL_VTARGET, TOPIC_RWHEEL_VTARGET);
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_WHEEL_STATE, TOPIC_COMMAND, TOPIC_HEALTH
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Drain all pending targets (non-blocking), each one goes through the throttle
        // 2. Retry throttled targets, apply watchdog
        if let Err(e) = drain_targets(&mut runtime, &sub_left, &sub_right)
            .and_then(|_| runtime.step())
        {
            error!("Actuator failure: {}", e);
            if let Err(stop_err) = runtime.dispatcher_mut().halt() {
                error!("Failed to halt motors: {}", stop_err);
            }
            return Err(e.into());
        }

        // 3. Publish accepted command when it changes
        let current = runtime.dispatcher().current();
        if published != Some(current) {
            pub_command.put(serde_json::to_string(&current)?).await?;
            published = Some(current);
        }

        // 4. Publish wheel feedback
        let wheels = wheel_states(&left_reader, &right_reader);
        pub_wheels.put(serde_json::to_string(&wheels)?).await?;

        // 5. Publish health
        pub_health
            .put(serde_json::to_string(&runtime.health())?)
            .await?;
    }

    // Ramp down before cutting the duty-cycle generators
    tokio::task::block_in_place(|| {
        runtime.shut_down(SHUTDOWN_RAMP, RAMP_INCREMENT, &ThreadTimer)
    })?;
    info!("Motors stopped, exiting");
    Ok(())
}

/// Control loop period, never zero
fn loop_period(hz: u64) -> Duration {
    Duration::from_nanos(1_000_000_000 / hz.max(1)).max(Duration::from_nanos(1))
}

fn drain_targets<A: Actuator>(
    runtime: &mut Runtime<A>,
    sub_left: &SampleSubscriber,
    sub_right: &SampleSubscriber,
) -> actuator::Result<()> {
    for (wheel, subscriber) in [(Wheel::Left, sub_left), (Wheel::Right, sub_right)] {
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<WheelTarget>(&payload) {
                Ok(target) => {
                    runtime.on_target(wheel, target)?;
                }
                Err(e) => {
                    warn!("Failed to parse {:?} wheel target: {}", wheel, e);
                }
            }
        }
    }
    Ok(())
}

fn wheel_states(left: &EncoderReader, right: &EncoderReader) -> WheelStates {
    WheelStates {
        left: left.snapshot(),
        right: right.snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::actuator::ActuatorError;
    use crate::motor::mock::{ActuatorCall, MockTimer};

    fn runtime(timeout: Duration) -> (Runtime<MockActuator>, MockActuator) {
        let (rt, l, _) = throttled_runtime(timeout, Duration::ZERO);
        (rt, l)
    }

    fn throttled_runtime(
        timeout: Duration,
        period: Duration,
    ) -> (Runtime<MockActuator>, MockActuator, MockActuator) {
        let (l, r) = (MockActuator::new(0), MockActuator::new(1));
        let motors = MotorPair::from_actuators(l.clone(), r.clone());
        let dispatcher = CommandDispatcher::new(motors, Throttle::new(period));
        (Runtime::new(dispatcher, timeout), l, r)
    }

    #[test]
    fn test_starts_stale_without_stopping() {
        let (mut rt, l) = runtime(Duration::from_millis(100));
        rt.step().unwrap();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert!(l.calls().is_empty());
    }

    #[test]
    fn test_target_makes_healthy() {
        let (mut rt, _) = runtime(Duration::from_millis(100));
        assert!(rt.on_target(Wheel::Left, WheelTarget { value: 0.5 }).unwrap());
        rt.step().unwrap();
        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert_eq!(rt.dispatcher().current(), Command::new(0.5, 0.0));
    }

    #[test]
    fn test_watchdog_stops_once() {
        let (mut rt, l) = runtime(Duration::from_millis(100));
        rt.on_target(Wheel::Left, WheelTarget { value: 0.5 }).unwrap();
        rt.step().unwrap();

        let later = Instant::now() + Duration::from_secs(1);
        rt.step_at(later).unwrap();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(rt.dispatcher().current(), Command::zero());
        assert_eq!(l.calls().last(), Some(&ActuatorCall::Stop));

        let calls = l.calls().len();
        rt.step_at(later + Duration::from_secs(1)).unwrap();
        assert_eq!(l.calls().len(), calls);
    }

    #[test]
    fn test_actuator_failure_surfaces() {
        let (mut rt, l) = runtime(Duration::from_millis(100));
        l.set_unavailable(true);
        assert!(rt.on_target(Wheel::Left, WheelTarget { value: 0.5 }).is_err());
    }

    #[test]
    fn test_throttled_watchdog_stop_is_retried() {
        let (mut rt, l, _) =
            throttled_runtime(Duration::from_millis(50), Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(rt.on_target_at(t0, Wheel::Left, WheelTarget { value: 0.5 }).unwrap());
        rt.step_at(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        // stale, but the stop lands inside the throttle period
        rt.step_at(t0 + Duration::from_millis(60)).unwrap();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(rt.dispatcher().current(), Command::new(0.5, 0.0));
        assert_eq!(l.calls().last(), Some(&ActuatorCall::Direction(true)));

        rt.step_at(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(rt.dispatcher().current(), Command::zero());
        assert_eq!(l.calls().last(), Some(&ActuatorCall::Stop));
    }

    #[test]
    fn test_shut_down_ramps_to_rest() {
        let (mut rt, l, r) = throttled_runtime(Duration::from_millis(100), Duration::ZERO);
        let timer = MockTimer::new();
        rt.on_target(Wheel::Left, WheelTarget { value: 0.5 }).unwrap();
        rt.on_target(Wheel::Right, WheelTarget { value: 0.5 }).unwrap();

        rt.shut_down(Duration::from_millis(50), Duration::from_millis(10), &timer)
            .unwrap();
        assert_eq!(timer.sleeps().len(), 5);
        assert_eq!(rt.dispatcher().motors().fractions(), (0.0, 0.0));
        assert_eq!(l.calls().last(), Some(&ActuatorCall::Stop));
        assert_eq!(r.calls().last(), Some(&ActuatorCall::Stop));
    }

    #[test]
    fn test_shut_down_halts_after_failed_ramp() {
        let (mut rt, l, r) = throttled_runtime(Duration::from_millis(100), Duration::ZERO);
        let timer = MockTimer::new();
        rt.on_target(Wheel::Left, WheelTarget { value: 0.5 }).unwrap();
        rt.on_target(Wheel::Right, WheelTarget { value: 0.5 }).unwrap();
        l.set_unavailable(true);
        r.clear();

        let result = rt.shut_down(Duration::from_millis(50), Duration::from_millis(10), &timer);
        assert!(matches!(result, Err(ActuatorError::Unavailable { channel: 0, .. })));
        // the ramp died on its first left write; the halt still reached the right motor
        assert_eq!(r.calls(), vec![ActuatorCall::Stop]);
        assert_eq!(rt.dispatcher().current(), Command::zero());
    }

    #[test]
    fn test_loop_period_never_zero() {
        assert_eq!(loop_period(50), Duration::from_millis(20));
        assert_eq!(loop_period(2000), Duration::from_micros(500));
        assert_eq!(loop_period(0), Duration::from_secs(1));
        assert_eq!(loop_period(u64::MAX), Duration::from_nanos(1));
    }
}
