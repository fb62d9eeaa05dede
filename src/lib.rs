// Drive hub core: IMU orientation engine, differential drivebase and the
// zenoh runtime that drives them.

pub mod angle;
pub mod config;
pub mod differentiator;
pub mod drivebase;
pub mod error;
pub mod fixed;
pub mod geometry;
pub mod hub;
pub mod imu;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod storage;

pub use error::{Error, Result};
