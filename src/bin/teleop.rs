// Keyboard teleop: W/S drive, A/D turn, R/F speed, Q quit
// Publishes per-wheel targets on the same topics a planner would use
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use gunnar_runtime::config::{TOPIC_LWHEEL_VTARGET, TOPIC_RWHEEL_VTARGET};
use gunnar_runtime::messages::WheelTarget;

const SPEEDS: [f32; 3] = [0.2, 0.5, 0.9]; // wheel fractions
const TURN_RATIO: f32 = 0.6; // share of speed used for turning in place
const INPUT_TIMEOUT_MS: u64 = 100; // Reset targets after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_left = session.declare_publisher(TOPIC_LWHEEL_VTARGET).await?;
    let pub_right = session.declare_publisher(TOPIC_RWHEEL_VTARGET).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_left, &pub_right).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_left: &zenoh::pubsub::Publisher<'_>,
    pub_right: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent target state
    let mut left = 0.0f32;
    let mut right = 0.0f32;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let speed = SPEEDS[speed_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        (left, right) = (speed, speed);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        (left, right) = (-speed, -speed);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        (left, right) = (-speed * TURN_RATIO, speed * TURN_RATIO);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        (left, right) = (speed * TURN_RATIO, -speed * TURN_RATIO);
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset targets if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            left = 0.0;
            right = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        pub_left
            .put(serde_json::to_string(&WheelTarget { value: left })?)
            .await?;
        pub_right
            .put(serde_json::to_string(&WheelTarget { value: right })?)
            .await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
