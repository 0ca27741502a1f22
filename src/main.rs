use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gunnar_runtime::config::{CMD_TIMEOUT, LOOP_HZ, MOTOR_PORT, THROTTLE_HZ};
use gunnar_runtime::runtime::RuntimeOptions;

/// Gunnar base runtime: wheel targets in, motor commands and encoder state out
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the motor board
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Log motor commands instead of driving the board
    #[arg(long)]
    mock: bool,

    /// Control loop frequency (Hz)
    #[arg(long, default_value_t = LOOP_HZ)]
    loop_hz: u64,

    /// Maximum rate of wheel commands forwarded to the motors (Hz)
    #[arg(long, default_value_t = THROTTLE_HZ)]
    throttle_hz: f64,

    /// Stop the robot after this long without a wheel target (ms)
    #[arg(long, default_value_t = CMD_TIMEOUT.as_millis() as u64)]
    cmd_timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RuntimeOptions {
        port: args.port,
        mock: args.mock,
        loop_hz: args.loop_hz,
        throttle_hz: args.throttle_hz,
        cmd_timeout: Duration::from_millis(args.cmd_timeout_ms),
    };

    if let Err(e) = gunnar_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
