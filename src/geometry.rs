// Small 3D geometry helpers for mapping hub-frame vectors to the robot frame

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tolerance used when checking that two axes are perpendicular
const ORTHOGONALITY_TOLERANCE: f32 = 1e-3;

/// Three-component vector in either the hub or the robot frame
pub type Xyz = Vector3<f32>;

/// Rotation from the hub frame to the robot frame
pub type Matrix3 = nalgebra::Matrix3<f32>;

/// Unit vector in the same direction, or an error for a zero vector
pub fn unit(v: &Xyz) -> Result<Xyz> {
    let norm = v.norm();
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::InvalidArgument("vector has zero length"));
    }
    Ok(v.unscale(norm))
}

/// Rotation whose columns are the hub x, y and z axes expressed in the
/// robot frame.
///
/// `front` is where the hub's front side (x) points and `top` is where
/// its top side (z) points. They must be non-zero and perpendicular.
pub fn base_orientation(front: &Xyz, top: &Xyz) -> Result<Matrix3> {
    let x = unit(front)?;
    let z = unit(top)?;

    if x.dot(&z).abs() > ORTHOGONALITY_TOLERANCE {
        return Err(Error::InvalidArgument("base axes must be perpendicular"));
    }

    let y = z.cross(&x);
    Ok(Matrix3::from_columns(&[x, y, z]))
}

/// Scalar projection of `v` onto the direction of `axis`
pub fn project(axis: &Xyz, v: &Xyz) -> Result<f32> {
    Ok(unit(axis)?.dot(v))
}

/// Side of a unit box, named from the hub's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Side {
    Front = 0,
    Left = 1,
    Top = 2,
    Back = 4,
    Right = 5,
    Bottom = 6,
}

impl Side {
    /// Side that a vector leaving the box center passes through first.
    /// A zero vector gives the front.
    pub fn from_vector(v: &Xyz) -> Side {
        let mut axis = 0;
        let mut negative = false;
        let mut largest = 0.0f32;

        for (i, &value) in v.iter().enumerate() {
            if value > largest {
                largest = value;
                axis = i;
                negative = false;
            } else if -value > largest {
                largest = -value;
                axis = i;
                negative = true;
            }
        }

        match (axis, negative) {
            (0, false) => Side::Front,
            (1, false) => Side::Left,
            (2, false) => Side::Top,
            (0, true) => Side::Back,
            (1, true) => Side::Right,
            _ => Side::Bottom,
        }
    }
}
