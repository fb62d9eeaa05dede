// Simulated DC motor with quadrature encoder
//
// The motor is a first-order system: a duty cycle sets a target speed that
// the rotor approaches with a fixed time constant. Coasting lets friction
// slow it down, braking shorts the windings and stops it quickly. The tacho
// rate is estimated from encoder angles with a `Differentiator`, like a
// real hub does.
//
// Handles are cheap clones sharing one state, so a simulated IMU can observe
// the wheels that the drivebase drives.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MAX_DUTY, MotorChannel};
use crate::angle::Angle;
use crate::config::LOOP_PERIOD_MS;
use crate::differentiator::Differentiator;
use crate::error::{Error, Result};

/// Speed at full duty cycle (deg/s)
const NO_LOAD_SPEED: f32 = 1_000.0;

/// Time constants (s) of the speed response per actuation mode
const DRIVE_TAU: f32 = 0.08;
const COAST_TAU: f32 = 0.4;
const BRAKE_TAU: f32 = 0.02;

/// Number of encoder samples the tacho differentiates over
const TACHO_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Drive {
    Coast,
    Brake,
    Duty(i32),
}

struct SimMotorState {
    drive: Drive,
    speed: f32,
    angle: Angle,
    angle_remainder: f32,
    tacho: Differentiator<TACHO_BUFFER>,
    tacho_rate: i32,
    connected: bool,
    fault: Option<io::ErrorKind>,
}

/// Simulated motor handle
#[derive(Clone)]
pub struct SimMotor {
    state: Arc<Mutex<SimMotorState>>,
}

impl SimMotor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimMotorState {
                drive: Drive::Coast,
                speed: 0.0,
                angle: Angle::default(),
                angle_remainder: 0.0,
                tacho: Differentiator::new(LOOP_PERIOD_MS),
                tacho_rate: 0,
                connected: true,
                fault: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimMotorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the simulation by one loop period
    pub fn step(&self) {
        let dt = LOOP_PERIOD_MS as f32 / 1000.0;
        let mut guard = self.state();
        let state = &mut *guard;

        let (target, tau) = match state.drive {
            Drive::Coast => (0.0, COAST_TAU),
            Drive::Brake => (0.0, BRAKE_TAU),
            Drive::Duty(duty) => (duty as f32 / MAX_DUTY as f32 * NO_LOAD_SPEED, DRIVE_TAU),
        };
        state.speed += (target - state.speed) * (dt / (tau + dt));

        // Integrate in millidegrees and carry the fractional part to the
        // next step so slow speeds still move the encoder.
        let travel = state.speed * dt * 1000.0 + state.angle_remainder;
        let whole = travel.trunc();
        state.angle_remainder = travel - whole;
        state.angle.add_mdeg(whole as i32);

        state.tacho_rate = state.tacho.update_and_get_speed(&state.angle);
    }

    /// True rotor speed in deg/s, bypassing the tacho
    pub fn true_speed(&self) -> f32 {
        self.state().speed
    }

    pub fn duty_cycle(&self) -> i32 {
        match self.state().drive {
            Drive::Duty(duty) => duty,
            _ => 0,
        }
    }

    /// Place the encoder at an angle (degrees) and clear the tacho history
    pub fn set_angle(&self, degrees: i32) {
        let mut guard = self.state();
        let state = &mut *guard;
        state.angle = Angle::from_millidegrees(degrees as i64 * 1000);
        state.angle_remainder = 0.0;
        state.tacho.reset(&state.angle);
        state.tacho_rate = 0;
    }

    /// Force the tacho rate (deg/s) read back by the channel
    pub fn set_rate(&self, degrees_per_second: i32) {
        self.state().tacho_rate = degrees_per_second.saturating_mul(1000);
    }

    /// Unplugging a motor also cuts its drive
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state();
        state.connected = connected;
        if !connected {
            state.drive = Drive::Coast;
        }
    }

    /// Make every subsequent channel operation fail with this I/O error
    pub fn inject_fault(&self, fault: Option<io::ErrorKind>) {
        self.state().fault = fault;
    }

    fn check(&self) -> Result<()> {
        let state = self.state();
        if !state.connected {
            return Err(Error::Io(io::ErrorKind::NotConnected.into()));
        }
        match state.fault {
            Some(kind) => Err(Error::Io(kind.into())),
            None => Ok(()),
        }
    }
}

impl Default for SimMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorChannel for SimMotor {
    fn get_angle(&mut self) -> Result<i32> {
        self.check()?;
        Ok((self.state().angle.to_millidegrees() / 1000) as i32)
    }

    fn get_angular_rate(&mut self) -> Result<i32> {
        self.check()?;
        Ok(self.state().tacho_rate / 1000)
    }

    fn set_duty_cycle(&mut self, duty: i32) -> Result<()> {
        self.check()?;
        self.state().drive = Drive::Duty(duty.clamp(-MAX_DUTY, MAX_DUTY));
        Ok(())
    }

    fn coast(&mut self) -> Result<()> {
        self.check()?;
        self.state().drive = Drive::Coast;
        Ok(())
    }

    fn brake(&mut self) -> Result<()> {
        self.check()?;
        self.state().drive = Drive::Brake;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn is_coasting(&self) -> bool {
        self.state().drive == Drive::Coast
    }

    fn is_braking(&self) -> bool {
        self.state().drive == Drive::Brake
    }
}
