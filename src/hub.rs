// The hub: motor ports, IMU and drivebase in one owned context
//
// Everything the firmware keeps per device lives here and is passed around
// explicitly. The hub is single-writer: one loop owns it and calls into it.

use tracing::{debug, warn};

use crate::drivebase::{Drivebase, DriveState};
use crate::error::{Error, Result};
use crate::fixed::Fix16;
use crate::geometry::Xyz;
use crate::imu::{ImuDriver, ImuEngine, ImuEvent, ImuSettings};
use crate::motor::{Actuation, MotorChannel, MotorPorts, Port};

pub struct Hub<M, D> {
    pub ports: MotorPorts<M>,
    driver: D,
    imu: ImuEngine,
    drivebase: Option<Drivebase>,
}

impl<M: MotorChannel, D: ImuDriver> Hub<M, D> {
    pub fn new(ports: MotorPorts<M>, driver: D) -> Self {
        let imu = ImuEngine::new(driver.config());
        let mut hub = Self {
            ports,
            driver,
            imu,
            drivebase: None,
        };
        hub.sync_thresholds();
        hub
    }

    pub fn imu(&self) -> &ImuEngine {
        &self.imu
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn drivebase(&self) -> Option<&Drivebase> {
        self.drivebase.as_ref()
    }

    pub fn drivebase_mut(&mut self) -> Option<&mut Drivebase> {
        self.drivebase.as_mut()
    }

    /// Push the engine's raw-count thresholds to the driver
    pub fn sync_thresholds(&mut self) {
        let (gyro, accel) = self.imu.stationary_thresholds();
        debug!("IMU stationary thresholds: gyro {}, accel {}", gyro, accel);
        self.driver.set_stationary_thresholds(gyro, accel);
    }

    /// Hand the settings loaded from storage to the engine
    pub fn load_settings(&mut self, settings: ImuSettings) {
        self.imu.apply_loaded_settings(settings);
        self.sync_thresholds();
    }

    /// Apply what storage loaded, or defaults if it had nothing usable
    pub fn apply_stored_settings(&mut self, stored: Option<ImuSettings>) {
        let settings = stored.unwrap_or_else(|| {
            let mut settings = ImuSettings::default();
            self.imu.apply_default_settings(&mut settings);
            settings
        });
        self.load_settings(settings);
    }

    pub fn set_imu_settings(&mut self, update: &ImuSettings) -> Result<()> {
        self.imu.set_settings(update)?;
        self.sync_thresholds();
        Ok(())
    }

    /// Settings to persist, if the engine asked for a write since last time
    pub fn take_settings_write(&mut self) -> Option<ImuSettings> {
        if !self.imu.take_write_request() {
            return None;
        }
        self.imu.get_settings().ok().cloned()
    }

    pub fn set_heading(&mut self, heading: f32) {
        self.imu.set_heading(heading);
    }

    pub fn set_base_orientation(&mut self, front: &Xyz, top: &Xyz) -> Result<()> {
        self.imu.set_base_orientation(front, top)
    }

    /// No motion seen by the IMU driver and no motor driven
    pub fn imu_is_stationary(&self) -> bool {
        ImuEngine::is_stationary(self.driver.is_stationary(), self.ports.all_coasting())
    }

    pub fn imu_temperature(&self) -> f32 {
        self.driver.temperature()
    }

    /// Feed every pending driver event to the engine, in order
    pub fn service_imu(&mut self, now_ms: u32) {
        while let Some(event) = self.driver.poll_event() {
            match event {
                ImuEvent::Frame(data) => self.imu.on_raw_frame(&data),
                ImuEvent::Stationary {
                    gyro_sum,
                    accel_sum,
                    num_samples,
                } => {
                    let stationary = self.imu_is_stationary();
                    self.imu.on_stationary_aggregate(
                        &gyro_sum,
                        &accel_sum,
                        num_samples,
                        stationary,
                        now_ms,
                    );
                }
            }
        }
    }

    /// Set up the drivebase, giving back the motors of any previous one
    pub fn drivebase_setup(
        &mut self,
        left: Port,
        right: Port,
        wheel_diameter: Fix16,
        axle_track: Fix16,
    ) -> Result<&mut Drivebase> {
        if let Some(previous) = self.drivebase.take() {
            previous.release(&mut self.ports);
        }
        let drivebase =
            Drivebase::setup(&mut self.ports, left, right, wheel_diameter, axle_track)?;
        Ok(self.drivebase.insert(drivebase))
    }

    pub fn drivebase_release(&mut self) {
        if let Some(drivebase) = self.drivebase.take() {
            drivebase.release(&mut self.ports);
        }
    }

    pub fn drivebase_state(&mut self, time_us: u64) -> Result<DriveState> {
        let drivebase = self.drivebase.as_ref().ok_or(NO_DRIVEBASE)?;
        drivebase.get_state(&mut self.ports, time_us)
    }

    /// Run one drivebase iteration. Without a drivebase there is nothing to do.
    pub fn drivebase_poll(&mut self, time_us: u64) -> Result<()> {
        match self.drivebase.as_mut() {
            Some(drivebase) => drivebase.poll(&mut self.ports, time_us),
            None => Ok(()),
        }
    }

    /// True if a drivebase is set up and still moving its wheels
    pub fn drivebase_is_driving(&self) -> bool {
        self.drivebase
            .as_ref()
            .is_some_and(|drivebase| drivebase.is_driving(&self.ports))
    }

    pub fn drivebase_start(&mut self, speed: i32, rate: i32) -> Result<()> {
        let drivebase = self.drivebase.as_mut().ok_or(NO_DRIVEBASE)?;
        drivebase.start(&mut self.ports, speed, rate)
    }

    pub fn drivebase_stop(&mut self, mode: Actuation) -> Result<()> {
        let drivebase = self.drivebase.as_mut().ok_or(NO_DRIVEBASE)?;
        let result = drivebase.stop(&mut self.ports, mode);
        if let Err(e) = &result {
            warn!("Drivebase stop incomplete: {}", e);
        }
        result
    }
}

const NO_DRIVEBASE: Error = Error::NotAvailable("no drivebase set up");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivebase::DrivebaseState;
    use crate::imu::SimImu;
    use crate::motor::SimMotor;

    struct World {
        left: SimMotor,
        right: SimMotor,
        hub: Hub<SimMotor, SimImu>,
        now_ms: u32,
    }

    impl World {
        fn new(gyro_bias: f32) -> Self {
            let left = SimMotor::new();
            let right = SimMotor::new();
            let mut ports = MotorPorts::new();
            ports.attach(Port::A, left.clone());
            ports.attach(Port::B, right.clone());
            let imu = SimImu::new(left.clone(), right.clone(), 56.0, 114.0)
                .with_gyro_bias(Xyz::new(0.0, 0.0, gyro_bias));
            Self {
                left,
                right,
                hub: Hub::new(ports, imu),
                now_ms: 0,
            }
        }

        fn run(&mut self, ticks: u32) {
            for _ in 0..ticks {
                self.left.step();
                self.right.step();
                self.hub.driver_mut().step();
                self.now_ms += crate::config::LOOP_PERIOD_MS;
                self.hub.service_imu(self.now_ms);
                self.hub
                    .drivebase_poll(self.now_ms as u64 * 1000)
                    .unwrap();
            }
        }

        fn setup_drivebase(&mut self) {
            self.hub
                .drivebase_setup(Port::A, Port::B, Fix16::from_int(56), Fix16::from_int(114))
                .unwrap();
        }
    }

    #[test]
    fn test_still_hub_calibrates() {
        let mut world = World::new(0.35);
        world.hub.load_settings(ImuSettings::default());
        assert!(!world.hub.imu().is_ready(world.now_ms));

        // Two stationary windows
        world.run(60);
        assert!(world.hub.imu_is_stationary());
        assert!(world.hub.imu().is_ready(world.now_ms));
        assert_eq!(world.hub.imu().stationary_count(), 2);
        assert!((world.hub.imu().gyro_bias().z - 0.35).abs() < 0.02);

        // With the bias known, the heading stops drifting
        let before = world.hub.imu().get_heading();
        world.run(50);
        assert!((world.hub.imu().get_heading() - before).abs() < 0.05);
    }

    #[test]
    fn test_driving_blocks_calibration() {
        let mut world = World::new(0.35);
        world.hub.load_settings(ImuSettings::default());
        world.setup_drivebase();
        // Rounds to zero duty: the driver sees no motion, but the motors are driven
        world.hub.drivebase_start(10, 0).unwrap();

        world.run(100);
        assert!(!world.hub.imu_is_stationary());
        assert_eq!(world.hub.imu().stationary_count(), 0);
        assert_eq!(world.hub.imu().gyro_bias().z, 0.0);
    }

    #[test]
    fn test_turning_changes_heading() {
        let mut world = World::new(0.0);
        world.hub.load_settings(ImuSettings::default());
        world.setup_drivebase();
        world.hub.drivebase_start(0, 90).unwrap();
        world.run(50);
        world.hub.drivebase_stop(Actuation::Brake).unwrap();
        world.run(10);

        let heading = world.hub.imu().get_heading();
        assert!(heading > 20.0, "clockwise turn, heading {}", heading);

        let state = world.hub.drivebase_state(0).unwrap();
        let degrees = state.heading / crate::drivebase::COUNTS_PER_DEGREE;
        println!("IMU heading {:.1}, wheel heading {}", heading, degrees);
        assert!((degrees as f32 - heading).abs() < 3.0);
    }

    #[test]
    fn test_drivebase_setup_replaces_previous() {
        let mut world = World::new(0.0);
        world.setup_drivebase();
        world.hub.drivebase_start(100, 0).unwrap();

        // Same motors again: the old drivebase lets go first
        world.setup_drivebase();
        let drivebase = world.hub.drivebase().unwrap();
        assert_eq!(drivebase.state(), DrivebaseState::Passive);
        assert!(world.left.is_coasting());

        world.hub.drivebase_release();
        assert!(!world.hub.ports.get(Port::A).unwrap().is_claimed());
        assert!(matches!(
            world.hub.drivebase_start(100, 0),
            Err(Error::NotAvailable(_))
        ));
        assert!(world.hub.drivebase_poll(0).is_ok());
    }

    #[test]
    fn test_settings_write_requests() {
        let mut world = World::new(0.0);
        assert!(matches!(
            world.hub.set_imu_settings(&ImuSettings::default()),
            Err(Error::NotAvailable(_))
        ));

        world.hub.load_settings(ImuSettings::default());
        assert!(world.hub.take_settings_write().is_none());

        let mut update = ImuSettings::default();
        update.flags = crate::imu::settings::flags::GYRO_STATIONARY_THRESHOLD;
        update.gyro_stationary_threshold = 6.0;
        world.hub.set_imu_settings(&update).unwrap();

        let written = world.hub.take_settings_write().unwrap();
        assert_eq!(written.gyro_stationary_threshold, 6.0);
        assert!(world.hub.take_settings_write().is_none());
        assert_eq!(world.hub.imu().stationary_thresholds().0, 342);
    }

    #[test]
    fn test_temperature() {
        let world = World::new(0.0);
        assert_eq!(world.hub.imu_temperature(), 25.0);
    }
}
