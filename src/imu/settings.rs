// Persistent IMU calibration settings
//
// The settings are owned by the engine once storage has loaded them. Updates
// arrive as a partial settings value whose `flags` select the members to
// merge; every selected member is validated before anything is changed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Xyz;

/// Standard gravity in mm/s^2
pub const STANDARD_GRAVITY: f32 = 9806.65;

/// Accepted range of the per-axis angular velocity scale (degrees measured
/// for one full rotation)
pub const ANGULAR_VELOCITY_SCALE_RANGE: (f32, f32) = (350.0, 370.0);

/// Selectors for [`ImuSettings::flags`]. In stored settings they record which
/// members were ever set by the user.
pub mod flags {
    pub const GYRO_STATIONARY_THRESHOLD: u32 = 1 << 0;
    pub const ACCEL_STATIONARY_THRESHOLD: u32 = 1 << 1;
    pub const GYRO_BIAS_INITIAL: u32 = 1 << 2;
    pub const GYRO_SCALE: u32 = 1 << 3;
    pub const ACCEL_CALIBRATED: u32 = 1 << 4;

    pub const ALL: u32 = GYRO_STATIONARY_THRESHOLD
        | ACCEL_STATIONARY_THRESHOLD
        | GYRO_BIAS_INITIAL
        | GYRO_SCALE
        | ACCEL_CALIBRATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuSettings {
    pub flags: u32,
    /// deg/s
    pub gyro_stationary_threshold: f32,
    /// mm/s^2
    pub accel_stationary_threshold: f32,
    /// Acceleration measured with each axis pointing up (mm/s^2)
    pub gravity_pos: Xyz,
    /// Acceleration measured with each axis pointing down (mm/s^2)
    pub gravity_neg: Xyz,
    /// Gyro bias used until the hub has been stationary (deg/s)
    pub angular_velocity_bias_start: Xyz,
    /// Degrees the gyro reports for one full rotation per axis
    pub angular_velocity_scale: Xyz,
}

impl Default for ImuSettings {
    fn default() -> Self {
        Self {
            flags: 0,
            gyro_stationary_threshold: 3.0,
            accel_stationary_threshold: 2500.0,
            gravity_pos: Xyz::repeat(STANDARD_GRAVITY),
            gravity_neg: Xyz::repeat(-STANDARD_GRAVITY),
            angular_velocity_bias_start: Xyz::zeros(),
            angular_velocity_scale: Xyz::repeat(360.0),
        }
    }
}

impl ImuSettings {
    /// Check every member selected by `self.flags`
    pub fn validate(&self) -> Result<()> {
        if self.flags & flags::GYRO_SCALE != 0 {
            let (min, max) = ANGULAR_VELOCITY_SCALE_RANGE;
            for i in 0..3 {
                let scale = self.angular_velocity_scale[i];
                if !(min..=max).contains(&scale) {
                    return Err(Error::InvalidArgument("angular velocity scale out of range"));
                }
            }
        }

        if self.flags & flags::ACCEL_CALIBRATED != 0 {
            for i in 0..3 {
                if gravity_out_of_range(self.gravity_pos[i], true)
                    || gravity_out_of_range(self.gravity_neg[i], false)
                {
                    return Err(Error::InvalidArgument("gravity calibration out of range"));
                }
            }
        }

        Ok(())
    }

    /// Check a complete settings value, such as one read back from storage.
    /// Every member is checked regardless of `flags`, since all of them are
    /// used once the settings are loaded.
    pub fn validate_stored(&self) -> Result<()> {
        let thresholds = [self.gyro_stationary_threshold, self.accel_stationary_threshold];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(Error::InvalidArgument("stationary threshold out of range"));
        }
        if self.angular_velocity_bias_start.iter().any(|b| !b.is_finite()) {
            return Err(Error::InvalidArgument("initial gyro bias is not finite"));
        }

        ImuSettings {
            flags: flags::ALL,
            ..self.clone()
        }
        .validate()
    }

    /// Copy the members selected by `update.flags` and record them as set
    pub fn merge(&mut self, update: &ImuSettings) {
        let selected = |flag: u32| update.flags & flag != 0;

        if selected(flags::GYRO_STATIONARY_THRESHOLD) {
            self.gyro_stationary_threshold = update.gyro_stationary_threshold;
        }
        if selected(flags::ACCEL_STATIONARY_THRESHOLD) {
            self.accel_stationary_threshold = update.accel_stationary_threshold;
        }
        if selected(flags::GYRO_BIAS_INITIAL) {
            self.angular_velocity_bias_start = update.angular_velocity_bias_start;
        }
        if selected(flags::GYRO_SCALE) {
            self.angular_velocity_scale = update.angular_velocity_scale;
        }
        if selected(flags::ACCEL_CALIBRATED) {
            self.gravity_pos = update.gravity_pos;
            self.gravity_neg = update.gravity_neg;
        }

        self.flags |= update.flags;
    }
}

/// True if a stationary gravity reading is further than g/15 from +/-g
fn gravity_out_of_range(value: f32, expect_positive: bool) -> bool {
    let expected = if expect_positive {
        STANDARD_GRAVITY
    } else {
        -STANDARD_GRAVITY
    };
    // Written so that NaN counts as out of range.
    !((value - expected).abs() <= STANDARD_GRAVITY / 15.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let mut settings = ImuSettings::default();
        settings.flags = flags::GYRO_SCALE | flags::ACCEL_CALIBRATED;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_stored_settings_checked_in_full() {
        assert!(ImuSettings::default().validate_stored().is_ok());

        // Flags only say what the user set; a zero scale still breaks the caches
        let mut stored = ImuSettings::default();
        stored.angular_velocity_scale.x = 0.0;
        assert!(stored.validate().is_ok());
        assert!(matches!(stored.validate_stored(), Err(Error::InvalidArgument(_))));

        let mut stored = ImuSettings::default();
        stored.gravity_neg = stored.gravity_pos;
        assert!(stored.validate_stored().is_err());

        let mut stored = ImuSettings::default();
        stored.gyro_stationary_threshold = f32::NAN;
        assert!(stored.validate_stored().is_err());

        let mut stored = ImuSettings::default();
        stored.angular_velocity_bias_start.z = f32::INFINITY;
        assert!(stored.validate_stored().is_err());
    }

    #[test]
    fn test_scale_out_of_range() {
        let mut update = ImuSettings::default();
        update.flags = flags::GYRO_SCALE;
        update.angular_velocity_scale.y = 400.0;
        assert!(matches!(update.validate(), Err(Error::InvalidArgument(_))));

        // Not selected, so not checked.
        update.flags = flags::GYRO_BIAS_INITIAL;
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_gravity_bounds() {
        let mut update = ImuSettings::default();
        update.flags = flags::ACCEL_CALIBRATED;
        update.gravity_neg.z = -9200.0;
        assert!(update.validate().is_ok());

        update.gravity_neg.z = -9000.0;
        assert!(update.validate().is_err());

        update.gravity_neg.z = -STANDARD_GRAVITY;
        update.gravity_pos.x = -STANDARD_GRAVITY;
        assert!(update.validate().is_err());

        update.gravity_pos.x = f32::NAN;
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_merge_only_selected() {
        let mut stored = ImuSettings::default();
        let mut update = ImuSettings::default();
        update.flags = flags::GYRO_STATIONARY_THRESHOLD;
        update.gyro_stationary_threshold = 5.0;
        update.accel_stationary_threshold = 1.0;

        stored.merge(&update);
        assert_eq!(stored.gyro_stationary_threshold, 5.0);
        assert_eq!(stored.accel_stationary_threshold, 2500.0);
        assert_eq!(stored.flags, flags::GYRO_STATIONARY_THRESHOLD);

        update.flags = flags::GYRO_SCALE;
        update.angular_velocity_scale = Xyz::new(361.0, 359.0, 362.5);
        stored.merge(&update);
        assert_eq!(stored.angular_velocity_scale.z, 362.5);
        assert_eq!(
            stored.flags,
            flags::GYRO_STATIONARY_THRESHOLD | flags::GYRO_SCALE
        );
    }
}
