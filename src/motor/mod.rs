// Motor ports of the hub
//
// Provides:
// - The capability interface every motor back-end implements
// - Port bookkeeping with exclusive claiming by higher-level consumers
// - A simulated DC motor with encoder for host runs and tests

pub mod sim;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub use sim::SimMotor;

/// Largest duty cycle magnitude accepted by the motor bridges
pub const MAX_DUTY: i32 = 10_000;

/// Motor port identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Port {
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    fn index(self) -> usize {
        self as usize
    }
}

/// What to do with a motor after it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuation {
    Coast,
    Brake,
    Hold,
}

/// Capability interface of a single tachometered, duty-cycle driven motor
pub trait MotorChannel {
    /// Encoder angle in degrees
    fn get_angle(&mut self) -> Result<i32>;

    /// Angular rate in degrees per second
    fn get_angular_rate(&mut self) -> Result<i32>;

    /// Drive with a duty cycle in [-MAX_DUTY, MAX_DUTY]
    fn set_duty_cycle(&mut self, duty: i32) -> Result<()>;

    fn coast(&mut self) -> Result<()>;

    fn brake(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// True if the motor is not being actively driven
    fn is_coasting(&self) -> bool;

    /// True if the windings are shorted to hold the rotor back
    fn is_braking(&self) -> bool;
}

/// A motor channel plus its claim state
pub struct Servo<M> {
    pub channel: M,
    claimed: bool,
}

impl<M: MotorChannel> Servo<M> {
    pub fn new(channel: M) -> Self {
        Self {
            channel,
            claimed: false,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Stop the motor the requested way. Holding is not supported.
    pub fn stop(&mut self, mode: Actuation) -> Result<()> {
        match mode {
            Actuation::Coast => self.channel.coast(),
            Actuation::Brake => self.channel.brake(),
            Actuation::Hold => Err(Error::InvalidArgument("hold is not supported")),
        }
    }
}

/// All motor ports of the hub
pub struct MotorPorts<M> {
    slots: [Option<Servo<M>>; 6],
}

impl<M: MotorChannel> MotorPorts<M> {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None, None, None],
        }
    }

    /// Attach a motor to a port, replacing whatever was there
    pub fn attach(&mut self, port: Port, channel: M) {
        debug!("Motor attached on port {:?}", port);
        self.slots[port.index()] = Some(Servo::new(channel));
    }

    pub fn detach(&mut self, port: Port) -> Option<M> {
        self.slots[port.index()].take().map(|servo| servo.channel)
    }

    pub fn get(&self, port: Port) -> Result<&Servo<M>> {
        self.slots[port.index()]
            .as_ref()
            .ok_or(Error::NoDevice { port })
    }

    pub fn get_mut(&mut self, port: Port) -> Result<&mut Servo<M>> {
        self.slots[port.index()]
            .as_mut()
            .ok_or(Error::NoDevice { port })
    }

    pub fn is_connected(&self, port: Port) -> bool {
        self.get(port).is_ok_and(|servo| servo.channel.is_connected())
    }

    /// Claim a motor for exclusive use. Fails if someone else holds it.
    pub fn claim(&mut self, port: Port) -> Result<()> {
        let servo = self.get_mut(port)?;
        if servo.claimed {
            return Err(Error::Busy("motor is already in use"));
        }
        servo.claimed = true;
        Ok(())
    }

    pub fn release(&mut self, port: Port) {
        if let Some(servo) = self.slots[port.index()].as_mut() {
            servo.claimed = false;
        }
    }

    /// True if the motor on `port` is connected and driven with a duty cycle
    pub fn is_driven(&self, port: Port) -> bool {
        self.get(port).is_ok_and(|servo| {
            servo.channel.is_connected()
                && !servo.channel.is_coasting()
                && !servo.channel.is_braking()
        })
    }

    /// True if no attached motor is being driven
    pub fn all_coasting(&self) -> bool {
        self.slots
            .iter()
            .flatten()
            .all(|servo| servo.channel.is_coasting())
    }
}

impl<M: MotorChannel> Default for MotorPorts<M> {
    fn default() -> Self {
        Self::new()
    }
}
