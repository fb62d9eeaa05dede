// Drivebase: two motors composed into forward and turn motion
//
// Provides:
// - Differential-drive kinematics in fixed point (wheel angles <-> distance, heading)
// - A pluggable control law, polled while the base is active
// - A bounded state log
//
// The drivebase holds the ports of its two motors, not the motors. Every
// operation borrows the hub's motor ports, so the motors stay owned by one
// place and a claimed motor cannot be driven by anything else.

pub mod control;
pub mod kinematics;
pub mod log;

pub use control::{Control, ControlLaw, NoControl};
pub use kinematics::{COUNTS_PER_DEGREE, COUNTS_PER_MM, Geometry};
pub use log::{DataLog, LogRecord};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fixed::Fix16;
use crate::motor::{Actuation, MotorChannel, MotorPorts, Port};

/// Passive: motors are left alone. Active: the control law drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrivebaseState {
    Passive,
    Active,
}

/// Measured state of the base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriveState {
    pub time_us: u64,
    /// Counts of [`COUNTS_PER_MM`]
    pub distance: i32,
    pub distance_rate: i32,
    /// Counts of [`COUNTS_PER_DEGREE`], clockwise positive
    pub heading: i32,
    pub heading_rate: i32,
}

pub struct Drivebase {
    left: Port,
    right: Port,
    geometry: Geometry,
    state: DrivebaseState,
    log: DataLog,
    control: Box<dyn ControlLaw>,
}

impl Drivebase {
    /// Validate the geometry, coast both motors and claim them.
    ///
    /// Nothing is claimed if any step fails. A motor already claimed by
    /// another consumer makes this fail with [`Error::Busy`].
    pub fn setup<M: MotorChannel>(
        ports: &mut MotorPorts<M>,
        left: Port,
        right: Port,
        wheel_diameter: Fix16,
        axle_track: Fix16,
    ) -> Result<Self> {
        let geometry = Geometry::new(wheel_diameter, axle_track)?;
        if left == right {
            return Err(Error::InvalidArgument("left and right motor must differ"));
        }

        for port in [left, right] {
            if ports.get(port)?.is_claimed() {
                return Err(Error::Busy("motor is already in use"));
            }
        }

        ports.get_mut(left)?.stop(Actuation::Coast)?;
        ports.get_mut(right)?.stop(Actuation::Coast)?;

        ports.claim(left)?;
        if let Err(e) = ports.claim(right) {
            ports.release(left);
            return Err(e);
        }

        info!(
            "Drivebase set up on {:?}/{:?}: turn {} counts/deg, drive {} counts/deg",
            left,
            right,
            geometry.turn_counts_per_diff.to_f32(),
            geometry.drive_counts_per_sum.to_f32()
        );

        Ok(Self {
            left,
            right,
            geometry,
            state: DrivebaseState::Passive,
            log: DataLog::new(),
            control: Box::new(NoControl),
        })
    }

    /// Replace the control law used while active
    pub fn with_control(mut self, control: Box<dyn ControlLaw>) -> Self {
        self.control = control;
        self
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn state(&self) -> DrivebaseState {
        self.state
    }

    pub fn ports(&self) -> (Port, Port) {
        (self.left, self.right)
    }

    pub fn log(&self) -> &DataLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut DataLog {
        &mut self.log
    }

    /// Read both wheels. The first failing read aborts the rest.
    pub fn get_state<M: MotorChannel>(
        &self,
        ports: &mut MotorPorts<M>,
        time_us: u64,
    ) -> Result<DriveState> {
        let angle_left = ports.get_mut(self.left)?.channel.get_angle()?;
        let angle_right = ports.get_mut(self.right)?.channel.get_angle()?;
        let rate_left = ports.get_mut(self.left)?.channel.get_angular_rate()?;
        let rate_right = ports.get_mut(self.right)?.channel.get_angular_rate()?;

        let counts = self
            .geometry
            .forward((angle_left, angle_right), (rate_left, rate_right));

        Ok(DriveState {
            time_us,
            distance: counts.distance,
            distance_rate: counts.distance_rate,
            heading: counts.heading,
            heading_rate: counts.heading_rate,
        })
    }

    /// Turn a distance and heading control pair into wheel duty cycles
    pub fn actuate<M: MotorChannel>(
        &self,
        ports: &mut MotorPorts<M>,
        distance_control: i32,
        heading_control: i32,
    ) -> Result<()> {
        let (left, right) = self.geometry.inverse(distance_control, heading_control);
        self.set_duty_cycles(ports, left, right)
    }

    fn set_duty_cycles<M: MotorChannel>(&self, ports: &mut MotorPorts<M>, left: i32, right: i32) -> Result<()> {
        ports.get_mut(self.left)?.channel.set_duty_cycle(left)?;
        ports.get_mut(self.right)?.channel.set_duty_cycle(right)
    }

    /// One control loop iteration.
    ///
    /// Does nothing unless both wheels are connected; losing a wheel drops an
    /// active base back to passive and coasts the wheel that is left.
    /// Otherwise the state is read, the control law runs while active, and
    /// the state is logged.
    pub fn poll<M: MotorChannel>(&mut self, ports: &mut MotorPorts<M>, time_us: u64) -> Result<()> {
        if !ports.is_connected(self.left) || !ports.is_connected(self.right) {
            if self.state == DrivebaseState::Active {
                warn!("Drivebase wheel disconnected, going passive");
                self.state = DrivebaseState::Passive;
                self.control.reset();
                self.coast_connected(ports);
            }
            return Ok(());
        }

        let state = self.get_state(ports, time_us)?;

        if self.state == DrivebaseState::Active {
            if let Some(control) = self.control.update(&state) {
                self.actuate(ports, control.distance, control.heading)?;
            }
        }

        self.log.update(LogRecord::from(&state))
    }

    /// Stop both wheels. The second wheel is stopped even if the first fails;
    /// the first error is returned. Holding is not supported.
    pub fn stop<M: MotorChannel>(&mut self, ports: &mut MotorPorts<M>, mode: Actuation) -> Result<()> {
        if mode == Actuation::Hold {
            return Err(Error::InvalidArgument("drivebase cannot hold"));
        }

        let left = ports.get_mut(self.left).and_then(|servo| servo.stop(mode));
        let right = ports.get_mut(self.right).and_then(|servo| servo.stop(mode));

        if self.state == DrivebaseState::Active {
            debug!("Drivebase stopped ({:?})", mode);
        }
        self.state = DrivebaseState::Passive;
        self.control.reset();

        left.and(right)
    }

    /// Drive open loop at `speed` (mm/s) and `rate` (deg/s, clockwise positive).
    ///
    /// If either wheel cannot be driven, the base coasts what it can and
    /// goes passive, so no wheel is left running on its own.
    pub fn start<M: MotorChannel>(&mut self, ports: &mut MotorPorts<M>, speed: i32, rate: i32) -> Result<()> {
        let (left, right) = self.geometry.open_loop(speed, rate);
        if let Err(e) = self.set_duty_cycles(ports, left, right) {
            warn!("Drivebase start failed, coasting: {}", e);
            self.state = DrivebaseState::Passive;
            self.control.reset();
            self.coast_connected(ports);
            return Err(e);
        }

        if self.state != DrivebaseState::Active {
            debug!("Drivebase active: {} mm/s, {} deg/s", speed, rate);
            self.control.reset();
        }
        self.state = DrivebaseState::Active;
        Ok(())
    }

    /// True while the base is active or either wheel is still driven
    pub fn is_driving<M: MotorChannel>(&self, ports: &MotorPorts<M>) -> bool {
        self.state == DrivebaseState::Active
            || ports.is_driven(self.left)
            || ports.is_driven(self.right)
    }

    /// Coast every wheel that still answers. Errors from the others are
    /// dropped: the caller is already handling a failure.
    fn coast_connected<M: MotorChannel>(&self, ports: &mut MotorPorts<M>) {
        for port in [self.left, self.right] {
            if ports.is_connected(port) {
                if let Err(e) = ports.get_mut(port).and_then(|servo| servo.stop(Actuation::Coast)) {
                    debug!("Could not coast {:?}: {}", port, e);
                }
            }
        }
    }

    /// Give both motors back
    pub fn release<M: MotorChannel>(self, ports: &mut MotorPorts<M>) {
        ports.release(self.left);
        ports.release(self.right);
        info!("Drivebase released {:?}/{:?}", self.left, self.right);
    }
}
