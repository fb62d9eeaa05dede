// Control-law strategy for the drivebase
//
// The kinematics layer asks the control law for a (distance, heading)
// control pair each poll while the base is active. No closed-loop law ships
// yet, so the default produces nothing and open-loop duty cycles stay in
// effect.

use super::DriveState;

/// Control output in distance and heading counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Control {
    pub distance: i32,
    pub heading: i32,
}

pub trait ControlLaw: Send {
    /// Control for the measured state, or `None` to leave the motors as they are
    fn update(&mut self, state: &DriveState) -> Option<Control>;

    /// Forget any accumulated state, e.g. when the base is restarted
    fn reset(&mut self) {}
}

/// Control law that never actuates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoControl;

impl ControlLaw for NoControl {
    fn update(&mut self, _state: &DriveState) -> Option<Control> {
        None
    }
}
