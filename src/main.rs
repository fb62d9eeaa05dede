use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drivehub_runtime::config::{
    DEFAULT_AXLE_TRACK_MM, DEFAULT_LOG_CAPACITY, DEFAULT_SETTINGS_PATH, DEFAULT_WHEEL_DIAMETER_MM,
};
use drivehub_runtime::runtime::RuntimeOptions;

/// Drive hub runtime: simulated two-wheel robot with IMU, driven over zenoh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Wheel diameter (mm)
    #[arg(long, default_value_t = DEFAULT_WHEEL_DIAMETER_MM)]
    wheel_diameter: i32,

    /// Distance between the wheels (mm)
    #[arg(long, default_value_t = DEFAULT_AXLE_TRACK_MM)]
    axle_track: i32,

    /// IMU calibration file
    #[arg(long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Gyro bias of the simulated IMU (deg/s)
    #[arg(long, default_value_t = 0.35, allow_negative_numbers = true)]
    sim_gyro_bias: f32,

    /// Drivebase log records kept between telemetry messages
    #[arg(long, default_value_t = DEFAULT_LOG_CAPACITY)]
    log_capacity: usize,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let options = RuntimeOptions {
        wheel_diameter: args.wheel_diameter,
        axle_track: args.axle_track,
        settings_path: args.settings,
        sim_gyro_bias: args.sim_gyro_bias,
        log_capacity: args.log_capacity,
    };

    if let Err(e) = drivehub_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
