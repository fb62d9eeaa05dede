// 50 Hz loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if teleop crashes while the robot drives, the drivebase is coasted once commands go stale

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

// local imports
use crate::config::{
    CMD_TIMEOUT, LEFT_PORT, LOOP_HZ, RIGHT_PORT, TOPIC_CMD_DRIVE, TOPIC_HEALTH, TOPIC_TELEMETRY,
};
use crate::error::Result;
use crate::fixed::Fix16;
use crate::geometry::Xyz;
use crate::hub::Hub;
use crate::imu::{ImuDriver, SimImu};
use crate::messages::{DriveCommand, HubTelemetry, RuntimeHealth};
use crate::motor::{Actuation, MotorChannel, MotorPorts, SimMotor};
use crate::storage::SettingsStore;

/// Startup options, filled from the command line
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// mm
    pub wheel_diameter: i32,
    /// mm
    pub axle_track: i32,
    pub settings_path: PathBuf,
    /// Gyro bias of the simulated IMU, deg/s about z
    pub sim_gyro_bias: f32,
    /// Drivebase log records kept between telemetry messages
    pub log_capacity: usize,
}

pub struct Runtime<M, D> {
    pub hub: Hub<M, D>,
    started_at: Instant,
    cmd_received_at: Option<Instant>,
    health: RuntimeHealth,
}

impl<M: MotorChannel, D: ImuDriver> Runtime<M, D> {
    pub fn new(hub: Hub<M, D>, now: Instant) -> Self {
        Self {
            hub,
            started_at: now,
            cmd_received_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Apply an incoming command. Failures are logged, not fatal.
    pub fn on_command(&mut self, cmd: DriveCommand, now: Instant) {
        debug!("Received command: {:?}", &cmd);
        self.cmd_received_at = Some(now);

        let result = match cmd {
            // Idle teleop coasts the base so the IMU can calibrate
            DriveCommand::Drive {
                speed: 0,
                turn_rate: 0,
            } => self.coast_if_driving(),
            DriveCommand::Drive { speed, turn_rate } => self.hub.drivebase_start(speed, turn_rate),
            DriveCommand::Stop { mode } => self.hub.drivebase_stop(mode),
            DriveCommand::SetHeading { heading } => {
                self.hub.set_heading(heading);
                Ok(())
            }
            DriveCommand::SetBaseOrientation { front, top } => {
                self.hub.set_base_orientation(&front, &top)
            }
            DriveCommand::SetImuSettings(update) => self.hub.set_imu_settings(&update),
        };

        if let Err(e) = result {
            warn!("Command failed: {}", e);
        }
    }

    /// Coast the drivebase if it is active or a wheel was left driven.
    /// A braked base is left braked.
    fn coast_if_driving(&mut self) -> Result<()> {
        if self.hub.drivebase_is_driving() {
            self.hub.drivebase_stop(Actuation::Coast)
        } else {
            Ok(())
        }
    }

    /// One loop iteration: watchdog, IMU, drivebase. Returns the state to publish.
    pub fn tick(&mut self, now: Instant) -> HubTelemetry {
        let elapsed = now.saturating_duration_since(self.started_at);
        let now_ms = elapsed.as_millis() as u32;
        let time_us = elapsed.as_micros() as u64;

        // 1. Watchdog
        let cmd_stale = match self.cmd_received_at {
            Some(at) => now.saturating_duration_since(at) > CMD_TIMEOUT,
            None => true,
        };
        if cmd_stale && self.hub.drivebase_is_driving() {
            warn!("Command stale, coasting drivebase");
            if let Err(e) = self.coast_if_driving() {
                warn!("Watchdog stop failed: {}", e);
            }
        }

        // 2. IMU events
        self.hub.service_imu(now_ms);

        // 3. Drivebase
        let poll = self.hub.drivebase_poll(time_us);
        if let Err(ref e) = poll {
            if self.health != RuntimeHealth::MotorFault {
                warn!("Drivebase poll failed: {}", e);
            }
        }

        self.health = if poll.is_err() {
            RuntimeHealth::MotorFault
        } else if cmd_stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };

        self.telemetry(now_ms, time_us)
    }

    fn telemetry(&mut self, now_ms: u32, time_us: u64) -> HubTelemetry {
        let drive = match self.hub.drivebase() {
            Some(_) => self.hub.drivebase_state(time_us).ok(),
            None => None,
        };
        let log = self
            .hub
            .drivebase_mut()
            .map(|drivebase| drivebase.log_mut().drain())
            .unwrap_or_default();

        let imu = self.hub.imu();
        HubTelemetry {
            time_ms: now_ms,
            drivebase: self.hub.drivebase().map(|d| d.state()),
            drive,
            heading: imu.get_heading(),
            angular_velocity: imu.get_angular_velocity(true),
            acceleration: imu.get_acceleration(true),
            up_side: Some(imu.get_up_side(true)),
            imu_stationary: self.hub.imu_is_stationary(),
            imu_ready: imu.is_ready(now_ms),
            gyro_bias: imu.gyro_bias(),
            temperature: self.hub.imu_temperature(),
            log,
        }
    }
}

/// Simulated robot: two wheels on ports A and B and an IMU riding on them
pub struct SimWorld {
    left: SimMotor,
    right: SimMotor,
}

impl SimWorld {
    pub fn build(options: &RuntimeOptions) -> (Self, Hub<SimMotor, SimImu>) {
        let left = SimMotor::new();
        let right = SimMotor::new();

        let mut ports = MotorPorts::new();
        ports.attach(LEFT_PORT, left.clone());
        ports.attach(RIGHT_PORT, right.clone());

        let imu = SimImu::new(
            left.clone(),
            right.clone(),
            options.wheel_diameter as f32,
            options.axle_track as f32,
        )
        .with_gyro_bias(Xyz::new(0.0, 0.0, options.sim_gyro_bias));

        (Self { left, right }, Hub::new(ports, imu))
    }

    /// Advance the wheels and the IMU by one loop period
    pub fn step(&self, hub: &mut Hub<SimMotor, SimImu>) {
        self.left.step();
        self.right.step();
        hub.driver_mut().step();
    }
}

pub async fn run(options: RuntimeOptions) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (world, mut hub) = SimWorld::build(&options);

    let store = SettingsStore::new(&options.settings_path);
    hub.apply_stored_settings(store.load());

    let drivebase = hub.drivebase_setup(
        LEFT_PORT,
        RIGHT_PORT,
        Fix16::from_int(options.wheel_diameter),
        Fix16::from_int(options.axle_track),
    )?;
    drivebase.log_mut().start(options.log_capacity);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(hub, Instant::now());
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), apply in order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd, Instant::now());
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Advance the simulated robot, then run the hub
        world.step(&mut runtime.hub);
        let telemetry = runtime.tick(Instant::now());

        // 3. Persist settings changes without blocking the loop
        if let Some(settings) = runtime.hub.take_settings_write() {
            let store = store.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = store.write(&settings) {
                    warn!("Failed to write IMU settings: {}", e);
                }
            });
        }

        // 4. Publish telemetry
        let telemetry_json = serde_json::to_string(&telemetry)?;
        pub_telemetry.put(telemetry_json).await?;

        // 5. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}
