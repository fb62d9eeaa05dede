// Loop timing, topics, default robot geometry
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Loop period seen by the differentiators and the simulation (ms)
pub const LOOP_PERIOD_MS: u32 = (1000 / LOOP_HZ) as u32;

// Drive commands older than this stop the drivebase
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "drivehub/cmd/drive"; // commands
pub const TOPIC_TELEMETRY: &str = "drivehub/state/telemetry"; // drivebase + imu state
pub const TOPIC_HEALTH: &str = "drivehub/state/health"; // health status

// Robot geometry (mm)
pub const DEFAULT_WHEEL_DIAMETER_MM: i32 = 56;
pub const DEFAULT_AXLE_TRACK_MM: i32 = 114;

// Motor ports the drivebase uses
pub const LEFT_PORT: crate::motor::Port = crate::motor::Port::A;
pub const RIGHT_PORT: crate::motor::Port = crate::motor::Port::B;

// IMU calibration file
pub const DEFAULT_SETTINGS_PATH: &str = "drivehub-settings.json";

// Drivebase log records kept between telemetry drains
pub const DEFAULT_LOG_CAPACITY: usize = 500;
