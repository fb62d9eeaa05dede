// Error type shared by the IMU engine, motor ports and drivebase

use crate::motor::Port;

/// Errors returned by the hub core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Not available: {0}")]
    NotAvailable(&'static str),

    #[error("Busy: {0}")]
    Busy(&'static str),

    #[error("No motor connected on port {port:?}")]
    NoDevice { port: Port },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings encoding error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
