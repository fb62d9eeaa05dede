// Wrap-free angle representation: whole rotations plus a millidegree remainder

/// Millidegrees in one full rotation
pub const MDEG_PER_ROTATION: i32 = 360_000;

/// Angle as whole rotations plus millidegrees
///
/// Splitting the value keeps millidegree resolution for angles far beyond
/// what fits in a single `i32` of millidegrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Angle {
    pub rotations: i32,
    pub millidegrees: i32,
}

impl Angle {
    pub fn new(rotations: i32, millidegrees: i32) -> Self {
        let mut angle = Self {
            rotations,
            millidegrees: 0,
        };
        angle.add_mdeg(millidegrees);
        angle
    }

    pub fn from_millidegrees(mdeg: i64) -> Self {
        Self {
            rotations: (mdeg / MDEG_PER_ROTATION as i64) as i32,
            millidegrees: (mdeg % MDEG_PER_ROTATION as i64) as i32,
        }
    }

    pub fn to_millidegrees(&self) -> i64 {
        self.rotations as i64 * MDEG_PER_ROTATION as i64 + self.millidegrees as i64
    }

    pub fn to_degrees(&self) -> f32 {
        self.rotations as f32 * 360.0 + self.millidegrees as f32 / 1000.0
    }

    /// Add millidegrees, carrying whole rotations out of the remainder
    pub fn add_mdeg(&mut self, increment: i32) {
        let total = self.millidegrees as i64 + increment as i64;
        self.rotations += (total / MDEG_PER_ROTATION as i64) as i32;
        self.millidegrees = (total % MDEG_PER_ROTATION as i64) as i32;
    }

    /// Difference `self - other` in millidegrees, saturated to `i32`
    pub fn diff_mdeg(&self, other: &Angle) -> i32 {
        let diff = self.to_millidegrees() - other.to_millidegrees();
        diff.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_carries_rotations() {
        let mut angle = Angle::new(0, 350_000);
        angle.add_mdeg(20_000);
        assert_eq!(angle, Angle::new(1, 10_000));
        angle.add_mdeg(-380_000);
        assert_eq!(angle.to_millidegrees(), -10_000);
    }

    #[test]
    fn test_diff() {
        let a = Angle::new(3, 1_000);
        let b = Angle::new(2, 359_000);
        assert_eq!(a.diff_mdeg(&b), 2_000);
        assert_eq!(b.diff_mdeg(&a), -2_000);
        assert_eq!(Angle::from_millidegrees(-720_500).to_degrees(), -720.5);
    }
}
