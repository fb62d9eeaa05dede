// Signed 16.16 fixed-point arithmetic
//
// Drivebase geometry factors are kept in fixed point so the control loop
// produces the same integer counts on every target.

use std::ops::{Add, Neg, Sub};

/// Signed 16.16 fixed-point number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fix16(i32);

impl Fix16 {
    pub const ZERO: Fix16 = Fix16(0);
    pub const ONE: Fix16 = Fix16(0x0001_0000);
    pub const PI: Fix16 = Fix16(205_887);
    pub const FOUR_DIV_PI: Fix16 = Fix16(0x0001_45F3);
    pub const MAX: Fix16 = Fix16(i32::MAX);
    pub const MIN: Fix16 = Fix16(i32::MIN);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Integer to fixed point, saturating outside +/-32767
    pub const fn from_int(value: i32) -> Self {
        if value > i16::MAX as i32 {
            Self::MAX
        } else if value < i16::MIN as i32 {
            Self::MIN
        } else {
            Self(value << 16)
        }
    }

    /// Nearest integer, ties away from zero
    pub const fn to_int(self) -> i32 {
        let half = 1i64 << 15;
        let raw = self.0 as i64;
        if raw >= 0 {
            ((raw + half) >> 16) as i32
        } else {
            -((-raw + half) >> 16) as i32
        }
    }

    pub fn from_f32(value: f32) -> Self {
        saturate((value as f64 * 65536.0).round() as i64)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }

    /// Rounded product, saturating on overflow
    pub fn mul(self, rhs: Fix16) -> Fix16 {
        let product = self.0 as i64 * rhs.0 as i64;
        saturate((product + (1 << 15)) >> 16)
    }

    /// Rounded quotient, saturating on overflow and on division by zero
    pub fn div(self, rhs: Fix16) -> Fix16 {
        if rhs.0 == 0 {
            return if self.0 >= 0 { Self::MAX } else { Self::MIN };
        }
        let num = (self.0 as i64) << 16;
        let den = rhs.0 as i64;
        let half = den.abs() / 2;
        let rounded = if (num >= 0) == (den > 0) {
            (num.abs() + half) / den.abs()
        } else {
            -((num.abs() + half) / den.abs())
        };
        saturate(rounded)
    }
}

fn saturate(raw: i64) -> Fix16 {
    Fix16(raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

impl Add for Fix16 {
    type Output = Fix16;
    fn add(self, rhs: Fix16) -> Fix16 {
        Fix16(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fix16 {
    type Output = Fix16;
    fn sub(self, rhs: Fix16) -> Fix16 {
        Fix16(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Fix16 {
    type Output = Fix16;
    fn neg(self) -> Fix16 {
        Fix16(self.0.saturating_neg())
    }
}

/// Scale an integer by a fixed-point factor and round back to an integer
pub fn mul_i32(a: i32, b: Fix16) -> i32 {
    let product = (a as i64) * (b.raw() as i64);
    Fix16::from_raw(product.clamp(i32::MIN as i64, i32::MAX as i64) as i32).to_int()
}

/// Divide an integer by a fixed-point factor and round back to an integer
pub fn div_i32(a: i32, b: Fix16) -> i32 {
    Fix16::from_int(a).div(b).to_int()
}
