// Differential-drive kinematics for a two-wheel base
// Maps wheel angles (degrees) to distance and heading counts and back, in
// 16.16 fixed point so every target produces the same integer counts.

use crate::error::{Error, Result};
use crate::fixed::{Fix16, div_i32, mul_i32};

/// Heading resolution: counts per degree of robot rotation
pub const COUNTS_PER_DEGREE: i32 = 10;

/// Distance resolution: counts per millimeter of travel
pub const COUNTS_PER_MM: i32 = 10;

/// Duty cycle units per deg/s of open-loop wheel speed
const DUTY_PER_DEGPS: i32 = 10;

/// Geometry of a differential drivebase and the factors derived from it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// mm
    pub wheel_diameter: Fix16,
    /// mm, distance between the wheel contact points
    pub axle_track: Fix16,
    /// Heading counts per degree of difference between the wheel angles
    pub turn_counts_per_diff: Fix16,
    /// Distance counts per degree of the summed wheel angles
    pub drive_counts_per_sum: Fix16,
}

/// Distance and heading of the base, in counts and counts/s
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaseCounts {
    pub distance: i32,
    pub distance_rate: i32,
    pub heading: i32,
    pub heading_rate: i32,
}

impl Geometry {
    /// Both dimensions must be strictly positive
    pub fn new(wheel_diameter: Fix16, axle_track: Fix16) -> Result<Self> {
        if wheel_diameter <= Fix16::ZERO || axle_track <= Fix16::ZERO {
            return Err(Error::InvalidArgument(
                "wheel diameter and axle track must be positive",
            ));
        }

        // d * counts/deg / (2 * axle): robot rotation per degree of wheel difference
        let turn_counts_per_diff = wheel_diameter
            .mul(Fix16::from_int(COUNTS_PER_DEGREE))
            .div(axle_track.mul(Fix16::from_int(2)));

        // d * pi * counts/mm / 720: travel per degree of wheel sum
        let drive_counts_per_sum = wheel_diameter
            .mul(Fix16::PI)
            .mul(Fix16::from_int(COUNTS_PER_MM))
            .div(Fix16::from_int(720));

        Ok(Self {
            wheel_diameter,
            axle_track,
            turn_counts_per_diff,
            drive_counts_per_sum,
        })
    }

    /// Forward map: wheel angles (deg) and rates (deg/s) to base counts
    pub fn forward(&self, angles: (i32, i32), rates: (i32, i32)) -> BaseCounts {
        let (angle_left, angle_right) = angles;
        let (rate_left, rate_right) = rates;
        BaseCounts {
            distance: mul_i32(
                angle_left.saturating_add(angle_right),
                self.drive_counts_per_sum,
            ),
            distance_rate: mul_i32(
                rate_left.saturating_add(rate_right),
                self.drive_counts_per_sum,
            ),
            heading: mul_i32(
                angle_left.saturating_sub(angle_right),
                self.turn_counts_per_diff,
            ),
            heading_rate: mul_i32(
                rate_left.saturating_sub(rate_right),
                self.turn_counts_per_diff,
            ),
        }
    }

    /// Inverse map: distance and heading control to (left, right) duty cycles
    pub fn inverse(&self, distance_control: i32, heading_control: i32) -> (i32, i32) {
        let dif = mul_i32(heading_control, self.turn_counts_per_diff);
        let sum = mul_i32(distance_control, self.drive_counts_per_sum);
        (sum.saturating_add(dif), sum.saturating_sub(dif))
    }

    /// Open-loop duty cycles for a speed (mm/s) and turn rate (deg/s,
    /// clockwise positive). The wheels are not synchronized.
    pub fn open_loop(&self, speed: i32, rate: i32) -> (i32, i32) {
        // Wheel deg/s for the speed: speed / d * 4/pi * 180
        let sum = 180 * mul_i32(div_i32(speed, self.wheel_diameter), Fix16::FOUR_DIV_PI);
        // Wheel deg/s difference for the rate: 2 * rate * axle / d
        let dif = 2 * div_i32(mul_i32(rate, self.axle_track), self.wheel_diameter);

        let left = ((sum + dif) / 2).saturating_mul(DUTY_PER_DEGPS);
        let right = ((sum - dif) / 2).saturating_mul(DUTY_PER_DEGPS);
        (left, right)
    }
}
