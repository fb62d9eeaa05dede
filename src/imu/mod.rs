// Inertial measurement for the hub
//
// Provides:
// - The driver interface (raw frames, stationary aggregates, thresholds)
// - Persistent calibration settings and their validation
// - The orientation engine: calibration, bias tracking, heading
// - A simulated IMU mounted on a differential-drive robot

pub mod engine;
pub mod settings;
pub mod sim;

pub use engine::ImuEngine;
pub use settings::ImuSettings;
pub use sim::SimImu;

/// Static properties of an IMU driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuConfig {
    /// Gyro scale, deg/s per raw count
    pub gyro_scale: f32,
    /// Accelerometer scale, mm/s^2 per raw count
    pub accel_scale: f32,
    /// Time between raw frames (s)
    pub sample_time: f32,
}

/// Data pushed by the driver, drained by the hub in order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImuEvent {
    /// One frame of raw gyro (x, y, z) and accelerometer (x, y, z) counts
    Frame([i16; 6]),
    /// Sums of raw samples over a window in which the driver saw no motion
    Stationary {
        gyro_sum: [i32; 3],
        accel_sum: [i32; 3],
        num_samples: u32,
    },
}

/// Capability interface of an IMU driver
pub trait ImuDriver {
    fn config(&self) -> ImuConfig;

    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<ImuEvent>;

    /// True if the driver saw no motion over its last window
    fn is_stationary(&self) -> bool;

    /// Sensor temperature in degrees Celsius
    fn temperature(&self) -> f32;

    /// Raw-count thresholds below which the driver treats samples as still
    fn set_stationary_thresholds(&mut self, gyro: i16, accel: i16);
}
