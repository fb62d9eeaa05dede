// Persistent IMU settings
//
// Settings are kept as JSON next to the firmware version that wrote them.
// Settings from another version, or with values the engine cannot use, are
// not trusted; the hub starts from defaults instead.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::imu::ImuSettings;

pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub firmware_version: String,
    pub imu: ImuSettings,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the settings file as is
    pub fn read(&self) -> Result<StoredSettings> {
        let contents = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Settings to apply at boot, or `None` if defaults should be used
    pub fn load(&self) -> Option<ImuSettings> {
        match self.read() {
            Ok(stored) if stored.firmware_version == FIRMWARE_VERSION => {
                if let Err(e) = stored.imu.validate_stored() {
                    warn!("Ignoring invalid IMU settings in {}: {}", self.path.display(), e);
                    return None;
                }
                info!("Loaded IMU settings from {}", self.path.display());
                Some(stored.imu)
            }
            Ok(stored) => {
                info!(
                    "Ignoring IMU settings from firmware {} (running {})",
                    stored.firmware_version, FIRMWARE_VERSION
                );
                None
            }
            Err(crate::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!("No IMU settings at {}, using defaults", self.path.display());
                None
            }
            Err(e) => {
                warn!("Failed to read IMU settings: {}", e);
                None
            }
        }
    }

    /// Replace the settings file. A temporary file is renamed over the old
    /// one, so a failed write leaves the previous settings intact.
    pub fn write(&self, settings: &ImuSettings) -> Result<()> {
        let stored = StoredSettings {
            firmware_version: FIRMWARE_VERSION.to_string(),
            imu: settings.clone(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        let mut temp = OsString::from(self.path.as_os_str());
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
