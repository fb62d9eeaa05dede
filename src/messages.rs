// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drivebase::{DriveState, DrivebaseState, LogRecord};
use crate::geometry::{Side, Xyz};
use crate::imu::ImuSettings;
use crate::motor::Actuation;

// Command from teleop/scripts -> runtime
// Tagged by "type", e.g. {"type":"drive","speed":100,"turn_rate":0}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Open-loop drive: speed in mm/s, turn rate in deg/s (clockwise positive)
    Drive { speed: i32, turn_rate: i32 },
    Stop { mode: Actuation },
    /// Re-zero the heading to this value (deg)
    SetHeading { heading: f32 },
    /// How the hub is mounted: robot-frame directions of its front and top
    SetBaseOrientation { front: Xyz, top: Xyz },
    /// Partial settings update, members selected by `flags`
    SetImuSettings(ImuSettings),
}

// State published by the runtime every loop
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HubTelemetry {
    pub time_ms: u32,
    pub drivebase: Option<DrivebaseState>,
    pub drive: Option<DriveState>,
    /// deg, clockwise positive
    pub heading: f32,
    /// deg/s, robot frame, calibrated
    pub angular_velocity: Xyz,
    /// mm/s^2, robot frame, calibrated
    pub acceleration: Xyz,
    pub up_side: Option<Side>,
    pub imu_stationary: bool,
    pub imu_ready: bool,
    /// deg/s
    pub gyro_bias: Xyz,
    /// deg C
    pub temperature: f32,
    // Drivebase log records since the previous message
    pub log: Vec<LogRecord>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    MotorFault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"type":"drive","speed":150,"turn_rate":-30}"#).unwrap();
        assert_eq!(
            cmd,
            DriveCommand::Drive {
                speed: 150,
                turn_rate: -30
            }
        );

        let cmd: DriveCommand = serde_json::from_str(r#"{"type":"stop","mode":"brake"}"#).unwrap();
        assert_eq!(
            cmd,
            DriveCommand::Stop {
                mode: Actuation::Brake
            }
        );

        assert!(serde_json::from_str::<DriveCommand>(r#"{"type":"fly"}"#).is_err());
    }

    #[test]
    fn test_vectors_are_json_arrays() {
        let cmd: DriveCommand = serde_json::from_str(
            r#"{"type":"set_base_orientation","front":[0.0,1.0,0.0],"top":[0.0,0.0,1.0]}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            DriveCommand::SetBaseOrientation {
                front: Xyz::y(),
                top: Xyz::z(),
            }
        );
        assert!(serde_json::from_str::<DriveCommand>(
            r#"{"type":"set_base_orientation","front":[0.0,1.0],"top":[0.0,0.0,1.0]}"#
        )
        .is_err());
    }

    #[test]
    fn test_settings_command_json() {
        let mut settings = ImuSettings::default();
        settings.flags = 1;
        settings.gyro_stationary_threshold = 4.0;
        let json = serde_json::to_string(&DriveCommand::SetImuSettings(settings.clone())).unwrap();
        println!("Settings command: {}", json);
        assert!(json.starts_with(r#"{"type":"set_imu_settings""#));

        let parsed: DriveCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, DriveCommand::SetImuSettings(settings));
    }

    #[test]
    fn test_health_json() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::MotorFault).unwrap(),
            r#""motor_fault""#
        );
    }
}
