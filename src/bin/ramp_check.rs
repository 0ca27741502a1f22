// Ramp check: step-by-step hardware test of both motor channels
//
// Usage: cargo run --bin ramp_check -- --port /dev/ttyACM0
//
// Safety features:
// - Explicit confirmation before any writes
// - Every maneuver is a bounded ramp, never a duty step
// - Motors are stopped at the end, even if the motion test is declined

use clap::Parser;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use gunnar_runtime::config::{CHANNEL_LEFT, CHANNEL_RIGHT, MOTOR_PORT};
use gunnar_runtime::motor::{BoardChannel, MotorBoard, MotorPair, ThreadTimer};

const RAMP: Duration = Duration::from_secs(1);
const INCREMENT: Duration = Duration::from_millis(4);
const PAUSE: Duration = Duration::from_millis(500);

/// Ramp both motors through a forward/reverse sequence
#[derive(Debug, Parser)]
#[command(about)]
struct Args {
    /// Serial port of the motor board
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    println!("Gunnar ramp check (WITH WRITES)");
    println!("  This tool WILL drive both motors.");
    println!("  Make sure the treads are OFF THE GROUND before proceeding!");
    println!();
    println!("Serial port: {}", args.port);
    println!();

    if !confirm("Is the robot elevated so the treads can spin freely?")? {
        return Ok(());
    }

    println!("Step 1: Opening motor board...");
    let mut board = MotorBoard::open(&args.port)?;
    for (name, channel) in [("Left", CHANNEL_LEFT), ("Right", CHANNEL_RIGHT)] {
        if !board.ping(channel)? {
            println!("  ✗ {} channel ({}) NOT responding - aborting", name, channel);
            return Ok(());
        }
        println!("  ✓ {} channel ({}) responding", name, channel);
    }
    println!();

    let board = Arc::new(Mutex::new(board));
    let mut motors = MotorPair::from_actuators(
        BoardChannel::new(board.clone(), CHANNEL_LEFT),
        BoardChannel::new(board, CHANNEL_RIGHT),
    );

    // Forward to full, through zero to a slow reverse, back to rest, then spin
    let sequence = [
        ("Ramp up to full forward", (1.0, 1.0)),
        ("Ramp down to slow reverse", (-0.37, -0.37)),
        ("Ramp back to rest", (0.0, 0.0)),
        ("Spin in place", (0.5, -0.5)),
        ("Ramp back to rest", (0.0, 0.0)),
    ];

    println!("Step 2: Ramp sequence ({:?} per ramp)", RAMP);
    if confirm("Proceed with motion test?")? {
        for (name, stops) in sequence {
            println!("  {}...", name);
            motors.ramp(stops, None, RAMP, INCREMENT, &ThreadTimer)?;
            let (left, right) = motors.fractions();
            println!("    fractions now: left={:.2}, right={:.2}", left, right);
            sleep(PAUSE);
        }
    }

    println!();
    println!("Step 3: Stopping motors...");
    motors.stop()?;
    println!("  ✓ Motors stopped");
    println!();
    println!("If both treads ramped smoothly in each direction, actuation is working.");
    println!("You can now try the full runtime with: cargo run --bin gunnar-runtime");

    Ok(())
}
