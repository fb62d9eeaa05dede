// Bounded log of drivebase state, filled by the poll loop

use serde::{Deserialize, Serialize};

use super::DriveState;
use crate::error::{Error, Result};

/// One logged sample, counts as in [`DriveState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub time_us: u64,
    pub distance: i32,
    pub distance_rate: i32,
    pub heading: i32,
    pub heading_rate: i32,
}

impl From<&DriveState> for LogRecord {
    fn from(state: &DriveState) -> Self {
        Self {
            time_us: state.time_us,
            distance: state.distance,
            distance_rate: state.distance_rate,
            heading: state.heading,
            heading_rate: state.heading_rate,
        }
    }
}

#[derive(Debug, Default)]
pub struct DataLog {
    records: Vec<LogRecord>,
    capacity: usize,
    active: bool,
}

impl DataLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start logging into an empty buffer of `capacity` records
    pub fn start(&mut self, capacity: usize) {
        self.records = Vec::with_capacity(capacity);
        self.capacity = capacity;
        self.active = true;
    }

    /// Stop logging, keeping what was recorded
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record. Does nothing while stopped.
    pub fn update(&mut self, record: LogRecord) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if self.records.len() >= self.capacity {
            return Err(Error::NotAvailable("drivebase log is full"));
        }
        self.records.push(record);
        Ok(())
    }

    /// Take every record logged so far, freeing the space
    pub fn drain(&mut self) -> Vec<LogRecord> {
        std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity))
    }
}
