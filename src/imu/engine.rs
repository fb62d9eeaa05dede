// IMU orientation engine
//
// Keeps calibrated angular velocity and acceleration caches that can be read
// at any time, tracks the gyro bias whenever the hub is stationary, and
// integrates a single-axis rotation per hub axis. The rotation is not a 3D
// attitude; it gives a precise 1D heading for robots driving on flat ground
// with the hub mounted at any orientation.
//
// Before storage has loaded the settings the engine runs uncalibrated: the
// calibrated caches are copies of the raw ones.
//
// The engine is single-writer: driver events and setters must come from one
// execution context (the hub loop). Sharing it across threads requires
// wrapping the owning hub in a lock.

use tracing::{debug, info, warn};

use super::ImuConfig;
use super::settings::{ImuSettings, STANDARD_GRAVITY};
use crate::angle::Angle;
use crate::error::{Error, Result};
use crate::geometry::{self, Matrix3, Side, Xyz};

/// The engine is ready if the hub was stationary this recently (ms)
pub const READY_WINDOW_MS: u32 = 10 * 60 * 1000;

/// Stationary episodes after which the bias average stops slowing down
const BIAS_AVERAGE_EPISODES: u32 = 20;

/// Weight of new stationary data once the average is established
const BIAS_AVERAGE_WEIGHT: f32 = 0.05;

#[derive(Debug, Clone, Copy, Default)]
struct SensorCache {
    /// deg/s, hub frame
    angular_velocity_uncalibrated: Xyz,
    /// deg/s, hub frame, bias and scale corrected
    angular_velocity_calibrated: Xyz,
    /// mm/s^2, hub frame
    acceleration_uncalibrated: Xyz,
    /// mm/s^2, hub frame, offset and scale corrected
    acceleration_calibrated: Xyz,
    /// deg, hub frame
    single_axis_rotation: Xyz,
    /// deg/s, seeded from settings and updated while stationary
    gyro_bias: Xyz,
}

#[derive(Debug, Clone, Copy, Default)]
struct StationaryTracker {
    /// Roughly the number of stationary windows seen since calibration
    /// was last fresh
    count: u32,
    last_ms: u32,
    /// Average uncalibrated acceleration of the last window (mm/s^2)
    acceleration: Xyz,
}

pub struct ImuEngine {
    config: ImuConfig,
    gyro_threshold: i16,
    accel_threshold: i16,
    base_orientation: Matrix3,
    heading_offset: f32,
    cache: SensorCache,
    stationary: StationaryTracker,
    settings: Option<ImuSettings>,
    write_requested: bool,
}

impl ImuEngine {
    pub fn new(config: ImuConfig) -> Self {
        let mut engine = Self {
            config,
            gyro_threshold: 1,
            accel_threshold: 1,
            base_orientation: Matrix3::identity(),
            heading_offset: 0.0,
            cache: SensorCache::default(),
            stationary: StationaryTracker::default(),
            settings: None,
            write_requested: false,
        };
        engine.apply_driver_settings(&ImuSettings::default());
        engine
    }

    /// Recompute the driver's raw-count stationary thresholds
    fn apply_driver_settings(&mut self, settings: &ImuSettings) {
        let to_counts = |threshold: f32, scale: f32| {
            ((threshold / scale) as i32).clamp(1, i16::MAX as i32) as i16
        };
        self.gyro_threshold = to_counts(settings.gyro_stationary_threshold, self.config.gyro_scale);
        self.accel_threshold =
            to_counts(settings.accel_stationary_threshold, self.config.accel_scale);
    }

    /// Reset `settings` to defaults. Storage calls this when it holds no
    /// settings or settings from another firmware version.
    pub fn apply_default_settings(&mut self, settings: &mut ImuSettings) {
        *settings = ImuSettings::default();
        self.apply_driver_settings(settings);
    }

    /// Take ownership of the settings loaded from storage
    ///
    /// The stored bias only seeds the estimate; it keeps being refined while
    /// the hub is stationary. Applying the same settings again is harmless.
    pub fn apply_loaded_settings(&mut self, settings: ImuSettings) {
        self.cache.gyro_bias = settings.angular_velocity_bias_start;
        self.apply_driver_settings(&settings);
        info!(
            "IMU settings loaded (flags 0x{:02X}, bias {:?})",
            settings.flags, settings.angular_velocity_bias_start
        );
        self.settings = Some(settings);
    }

    pub fn settings_loaded(&self) -> bool {
        self.settings.is_some()
    }

    /// Driver thresholds in raw counts (gyro, accel)
    pub fn stationary_thresholds(&self) -> (i16, i16) {
        (self.gyro_threshold, self.accel_threshold)
    }

    /// Process one frame of raw gyro (x, y, z) and accelerometer counts
    pub fn on_raw_frame(&mut self, data: &[i16; 6]) {
        let cache = &mut self.cache;

        for i in 0..3 {
            cache.angular_velocity_uncalibrated[i] = data[i] as f32 * self.config.gyro_scale;
            cache.acceleration_uncalibrated[i] = data[i + 3] as f32 * self.config.accel_scale;

            match &self.settings {
                Some(settings) => {
                    let offset = (settings.gravity_pos[i] + settings.gravity_neg[i]) / 2.0;
                    let scale = (settings.gravity_pos[i] - settings.gravity_neg[i]) / 2.0;
                    cache.acceleration_calibrated[i] =
                        (cache.acceleration_uncalibrated[i] - offset) * STANDARD_GRAVITY / scale;
                    let unbiased = cache.angular_velocity_uncalibrated[i] - cache.gyro_bias[i];
                    cache.angular_velocity_calibrated[i] =
                        unbiased * 360.0 / settings.angular_velocity_scale[i];
                }
                None => {
                    cache.acceleration_calibrated[i] = cache.acceleration_uncalibrated[i];
                    cache.angular_velocity_calibrated[i] = cache.angular_velocity_uncalibrated[i];
                }
            }

            // Explicit Euler step with the fixed frame period.
            cache.single_axis_rotation[i] +=
                cache.angular_velocity_calibrated[i] * self.config.sample_time;
        }
    }

    /// Stationary means the driver saw no motion and no motor is driven
    pub fn is_stationary(driver_stationary: bool, motors_coasting: bool) -> bool {
        driver_stationary && motors_coasting
    }

    /// True if the hub has been stationary at least once in the last
    /// ten minutes
    pub fn is_ready(&self, now_ms: u32) -> bool {
        self.stationary.count > 0 && now_ms.wrapping_sub(self.stationary.last_ms) < READY_WINDOW_MS
    }

    /// Process raw sums recorded over a window the driver found stationary
    ///
    /// `stationary` is the hub's own confirmation (see [`Self::is_stationary`]).
    pub fn on_stationary_aggregate(
        &mut self,
        gyro_sum: &[i32; 3],
        accel_sum: &[i32; 3],
        num_samples: u32,
        stationary: bool,
        now_ms: u32,
    ) {
        if !stationary || num_samples == 0 {
            return;
        }

        // Stale calibration: restart the average so new data dominates.
        if !self.is_ready(now_ms) {
            if self.stationary.count > 0 {
                info!("IMU calibration stale, restarting gyro bias average");
            }
            self.stationary.count = 0;
        }

        self.stationary.last_ms = now_ms;
        self.stationary.count += 1;

        let weight = if self.stationary.count >= BIAS_AVERAGE_EPISODES {
            BIAS_AVERAGE_WEIGHT
        } else {
            1.0 / self.stationary.count as f32
        };

        let n = num_samples as f32;
        for i in 0..3 {
            let average_now = gyro_sum[i] as f32 * self.config.gyro_scale / n;
            self.cache.gyro_bias[i] = self.cache.gyro_bias[i] * (1.0 - weight) + weight * average_now;
            self.stationary.acceleration[i] = accel_sum[i] as f32 * self.config.accel_scale / n;
        }

        debug!(
            "Gyro bias updated to {:?} (episode {}, weight {:.3})",
            self.cache.gyro_bias, self.stationary.count, weight
        );
    }

    pub fn gyro_bias(&self) -> Xyz {
        self.cache.gyro_bias
    }

    pub fn stationary_count(&self) -> u32 {
        self.stationary.count
    }

    /// Average acceleration (mm/s^2, hub frame, uncalibrated) of the last
    /// stationary window, used when calibrating gravity per axis
    pub fn stationary_acceleration(&self) -> Xyz {
        self.stationary.acceleration
    }

    /// Set how the hub is mounted in the robot and zero the heading
    ///
    /// `front` and `top` are the robot-frame directions in which the hub's
    /// front and top sides point.
    pub fn set_base_orientation(&mut self, front: &Xyz, top: &Xyz) -> Result<()> {
        self.base_orientation = geometry::base_orientation(front, top)?;
        self.set_heading(0.0);
        info!("Base orientation set: front {:?}, top {:?}", front, top);
        Ok(())
    }

    pub fn get_settings(&self) -> Result<&ImuSettings> {
        self.settings
            .as_ref()
            .ok_or(Error::NotAvailable("IMU settings not loaded"))
    }

    /// Merge the members of `update` selected by `update.flags`
    ///
    /// Nothing changes if any selected member is invalid. A successful change
    /// raises a write request for storage.
    pub fn set_settings(&mut self, update: &ImuSettings) -> Result<()> {
        let Some(settings) = self.settings.as_mut() else {
            return Err(Error::NotAvailable("IMU settings not loaded"));
        };

        if let Err(e) = update.validate() {
            warn!("Rejected IMU settings update: {}", e);
            return Err(e);
        }

        settings.merge(update);
        let settings = settings.clone();

        if update.flags != 0 {
            info!("IMU settings updated (flags 0x{:02X})", update.flags);
            self.write_requested = true;
        }

        self.apply_driver_settings(&settings);
        Ok(())
    }

    /// Consume a pending storage write request
    pub fn take_write_request(&mut self) -> bool {
        std::mem::take(&mut self.write_requested)
    }

    /// Angular velocity (deg/s) in the robot frame
    pub fn get_angular_velocity(&self, calibrated: bool) -> Xyz {
        let v = if calibrated {
            &self.cache.angular_velocity_calibrated
        } else {
            &self.cache.angular_velocity_uncalibrated
        };
        self.base_orientation * v
    }

    /// Acceleration (mm/s^2) in the robot frame
    pub fn get_acceleration(&self, calibrated: bool) -> Xyz {
        let v = if calibrated {
            &self.cache.acceleration_calibrated
        } else {
            &self.cache.acceleration_uncalibrated
        };
        self.base_orientation * v
    }

    /// Rotation (deg) about a robot-frame axis. Only meaningful for
    /// one-dimensional rotations.
    pub fn get_single_axis_rotation(&self, axis: &Xyz) -> Result<f32> {
        let rotation = self.base_orientation * self.cache.single_axis_rotation;
        geometry::project(axis, &rotation)
    }

    /// Side of the robot frame that points up
    pub fn get_up_side(&self, calibrated: bool) -> Side {
        Side::from_vector(&self.get_acceleration(calibrated))
    }

    /// Heading in degrees, clockwise positive
    pub fn get_heading(&self) -> f32 {
        let rotation = self.base_orientation * self.cache.single_axis_rotation;
        -rotation.z - self.heading_offset
    }

    /// Only moves the user offset; the integrator keeps running.
    pub fn set_heading(&mut self, heading: f32) {
        self.heading_offset = self.get_heading() + self.heading_offset - heading;
    }

    /// Heading and heading rate in control units
    ///
    /// The drivebase measures heading in `steps_per_degree` steps. Whole
    /// rotations of 360 000 steps are split off in floating point before
    /// truncating, so large headings keep their resolution.
    pub fn get_heading_scaled(&self, steps_per_degree: i32) -> (Angle, i32) {
        let heading = self.get_heading();
        let degrees_per_rotation = 360_000.0 / steps_per_degree as f32;

        let rotations = (heading / degrees_per_rotation) as i32;
        let truncated = heading - rotations as f32 * degrees_per_rotation;
        let angle = Angle {
            rotations,
            millidegrees: (truncated * steps_per_degree as f32) as i32,
        };

        let rate = (-self.get_angular_velocity(true).z * steps_per_degree as f32) as i32;
        (angle, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::settings::flags;

    const CONFIG: ImuConfig = ImuConfig {
        gyro_scale: 0.0175,
        accel_scale: 2.4,
        sample_time: 0.002,
    };

    fn gyro_counts(deg_per_s: f32) -> i16 {
        (deg_per_s / CONFIG.gyro_scale).round() as i16
    }

    fn loaded_engine() -> ImuEngine {
        let mut engine = ImuEngine::new(CONFIG);
        engine.apply_loaded_settings(ImuSettings::default());
        engine
    }

    /// Spin about the hub z axis at `rate` deg/s for `seconds`
    fn spin_z(engine: &mut ImuEngine, rate: f32, seconds: f32) {
        let frames = (seconds / CONFIG.sample_time).round() as usize;
        let frame = [0, 0, gyro_counts(rate), 0, 0, 4086];
        for _ in 0..frames {
            engine.on_raw_frame(&frame);
        }
    }

    #[test]
    fn test_uncalibrated_passthrough() {
        let mut engine = ImuEngine::new(CONFIG);
        engine.on_raw_frame(&[100, -200, 300, 10, 20, 4000]);
        assert_eq!(engine.get_angular_velocity(true), engine.get_angular_velocity(false));
        assert_eq!(engine.get_acceleration(true), engine.get_acceleration(false));
        assert!((engine.get_angular_velocity(false).y + 3.5).abs() < 1e-4);
        assert!(matches!(engine.get_settings(), Err(Error::NotAvailable(_))));
    }

    #[test]
    fn test_calibration_applied() {
        let mut settings = ImuSettings::default();
        settings.angular_velocity_bias_start = Xyz::new(0.0, 0.0, 0.35);
        settings.angular_velocity_scale = Xyz::new(360.0, 360.0, 350.0);
        settings.gravity_pos.z = 9900.0;
        settings.gravity_neg.z = -9700.0;

        let mut engine = ImuEngine::new(CONFIG);
        engine.apply_loaded_settings(settings);
        engine.on_raw_frame(&[0, 0, 20, 0, 0, 4125]);

        let w = engine.get_angular_velocity(true);
        let expected = (20.0 * CONFIG.gyro_scale - 0.35) * 360.0 / 350.0;
        assert!((w.z - expected).abs() < 1e-5);

        // Offset 100, half range 9800.
        let a = engine.get_acceleration(true);
        let expected = (4125.0 * CONFIG.accel_scale - 100.0) * STANDARD_GRAVITY / 9800.0;
        assert!((a.z - expected).abs() < 1e-2);
    }

    #[test]
    fn test_heading_integrates_clockwise_positive() {
        let mut engine = loaded_engine();
        // Counter-clockwise about z is negative heading.
        spin_z(&mut engine, 45.0, 2.0);
        let heading = engine.get_heading();
        println!("Heading after 2s at 45 deg/s CCW: {}", heading);
        assert!((heading + 90.0).abs() < 0.5);

        let rotation = engine
            .get_single_axis_rotation(&Xyz::new(0.0, 0.0, 1.0))
            .unwrap();
        assert!((rotation + heading).abs() < 1e-4);
        assert!(engine.get_single_axis_rotation(&Xyz::default()).is_err());
    }

    #[test]
    fn test_set_heading_keeps_integrator() {
        let mut engine = loaded_engine();
        spin_z(&mut engine, -30.0, 1.0);
        let rotation = engine.get_single_axis_rotation(&Xyz::new(0.0, 0.0, 1.0)).unwrap();

        engine.set_heading(10.0);
        assert!((engine.get_heading() - 10.0).abs() < 1e-4);
        assert_eq!(
            engine.get_single_axis_rotation(&Xyz::new(0.0, 0.0, 1.0)).unwrap(),
            rotation
        );

        spin_z(&mut engine, -30.0, 1.0);
        assert!((engine.get_heading() - 40.0).abs() < 0.5);
    }

    #[test]
    fn test_base_orientation_zeroes_heading() {
        let axes = [
            (Xyz::new(1.0, 0.0, 0.0), Xyz::new(0.0, 0.0, 1.0)),
            (Xyz::new(0.0, 0.0, 1.0), Xyz::new(-1.0, 0.0, 0.0)),
            (Xyz::new(0.0, -1.0, 0.0), Xyz::new(1.0, 0.0, 0.0)),
            (Xyz::new(0.0, 1.0, 0.0), Xyz::new(0.0, 0.0, -1.0)),
        ];
        let mut engine = loaded_engine();
        for (front, top) in axes {
            spin_z(&mut engine, 20.0, 0.5);
            engine.set_base_orientation(&front, &top).unwrap();
            assert!(engine.get_heading().abs() < 1e-4);
        }

        let x = Xyz::new(1.0, 0.0, 0.0);
        assert!(matches!(
            engine.set_base_orientation(&x, &x),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_vectors_follow_base_orientation() {
        let mut engine = loaded_engine();
        // Hub standing on its back side: hub top points forward.
        engine
            .set_base_orientation(&Xyz::new(0.0, 0.0, 1.0), &Xyz::new(1.0, 0.0, 0.0))
            .unwrap();
        // Gravity reads along hub +x when the hub front faces up.
        engine.on_raw_frame(&[0, 0, 0, 4086, 0, 0]);
        assert_eq!(engine.get_up_side(true), Side::Top);
        let a = engine.get_acceleration(false);
        assert!((a.z - 4086.0 * CONFIG.accel_scale).abs() < 1e-2);
    }

    #[test]
    fn test_apply_loaded_settings_idempotent() {
        let mut settings = ImuSettings::default();
        settings.angular_velocity_bias_start = Xyz::new(0.1, -0.2, 0.3);
        settings.gyro_stationary_threshold = 2.0;

        let mut engine = ImuEngine::new(CONFIG);
        engine.apply_loaded_settings(settings.clone());
        let first = (engine.gyro_bias(), engine.stationary_thresholds());
        engine.apply_loaded_settings(settings);
        assert_eq!((engine.gyro_bias(), engine.stationary_thresholds()), first);
        assert_eq!(first.1, (114, 1041));
    }

    #[test]
    fn test_default_settings_reset() {
        let mut engine = ImuEngine::new(CONFIG);
        let mut settings = ImuSettings::default();
        settings.flags = flags::GYRO_SCALE;
        settings.gyro_stationary_threshold = 100.0;
        engine.apply_default_settings(&mut settings);
        assert_eq!(settings, ImuSettings::default());
        assert_eq!(engine.stationary_thresholds(), (171, 1041));
    }

    #[test]
    fn test_bias_converges() {
        let mut engine = loaded_engine();
        let offset = [gyro_counts(0.5), gyro_counts(-0.25), gyro_counts(1.0)];
        let n = 100;
        let sum = offset.map(|o| o as i32 * n);

        for k in 0..25u32 {
            engine.on_stationary_aggregate(&sum, &[0, 0, 4086 * n], n as u32, true, k * 1000);
        }

        let bias = engine.gyro_bias();
        let expected = offset.map(|o| o as f32 * CONFIG.gyro_scale);
        for i in 0..3 {
            assert!((bias[i] - expected[i]).abs() < 1e-4);
        }
        assert_eq!(engine.stationary_count(), 25);
        assert!((engine.stationary_acceleration().z - 4086.0 * CONFIG.accel_scale).abs() < 1e-2);

        // Past 20 episodes new data only gets 5% weight.
        let shifted = [0, 0, gyro_counts(2.0) as i32 * n];
        engine.on_stationary_aggregate(&shifted, &[0; 3], n as u32, true, 26_000);
        let z = engine.gyro_bias().z;
        let new = gyro_counts(2.0) as f32 * CONFIG.gyro_scale;
        assert!((z - (0.95 * expected[2] + 0.05 * new)).abs() < 1e-4);
    }

    #[test]
    fn test_moving_aggregate_ignored() {
        let mut engine = loaded_engine();
        engine.on_stationary_aggregate(&[1000, 0, 0], &[0; 3], 10, false, 0);
        assert_eq!(engine.stationary_count(), 0);
        assert_eq!(engine.gyro_bias(), Xyz::default());
        assert!(!engine.is_ready(0));
        assert!(ImuEngine::is_stationary(true, true));
        assert!(!ImuEngine::is_stationary(true, false));
        assert!(!ImuEngine::is_stationary(false, true));
    }

    #[test]
    fn test_readiness_decays() {
        let mut engine = loaded_engine();
        engine.on_stationary_aggregate(&[0; 3], &[0; 3], 10, true, 5_000);
        assert!(engine.is_ready(5_000));
        assert!(engine.is_ready(5_000 + READY_WINDOW_MS - 1));
        assert!(!engine.is_ready(5_000 + READY_WINDOW_MS + 1));
    }

    #[test]
    fn test_stale_calibration_restarts_average() {
        let mut engine = loaded_engine();
        for k in 0..30u32 {
            engine.on_stationary_aggregate(&[0; 3], &[0; 3], 10, true, k);
        }
        assert_eq!(engine.stationary_count(), 30);

        // Much later, one window fully replaces the old estimate.
        let later = 30 + READY_WINDOW_MS + 1;
        engine.on_stationary_aggregate(&[0, 0, 200], &[0; 3], 10, true, later);
        assert_eq!(engine.stationary_count(), 1);
        assert!((engine.gyro_bias().z - 20.0 * CONFIG.gyro_scale).abs() < 1e-5);
    }

    #[test]
    fn test_settings_update_rejected_atomically() {
        let mut engine = loaded_engine();
        let before = engine.get_settings().unwrap().clone();

        let mut update = ImuSettings::default();
        update.flags = flags::GYRO_SCALE | flags::GYRO_STATIONARY_THRESHOLD;
        update.gyro_stationary_threshold = 1.0;
        update.angular_velocity_scale = Xyz::new(360.0, 360.0, 400.0);

        assert!(matches!(
            engine.set_settings(&update),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(engine.get_settings().unwrap(), &before);
        assert!(!engine.take_write_request());
    }

    #[test]
    fn test_settings_update_requests_write() {
        let mut engine = loaded_engine();
        let mut update = ImuSettings::default();
        update.flags = flags::GYRO_STATIONARY_THRESHOLD;
        update.gyro_stationary_threshold = 1.75;

        engine.set_settings(&update).unwrap();
        assert_eq!(engine.stationary_thresholds().0, 100);
        assert_eq!(engine.get_settings().unwrap().flags, flags::GYRO_STATIONARY_THRESHOLD);
        assert!(engine.take_write_request());
        assert!(!engine.take_write_request());

        // Nothing selected, nothing to save.
        update.flags = 0;
        engine.set_settings(&update).unwrap();
        assert!(!engine.take_write_request());
    }

    #[test]
    fn test_settings_require_load() {
        let mut engine = ImuEngine::new(CONFIG);
        assert!(matches!(
            engine.set_settings(&ImuSettings::default()),
            Err(Error::NotAvailable(_))
        ));
    }

    #[test]
    fn test_heading_scaled() {
        let mut engine = loaded_engine();
        engine.set_heading(-725.5);

        // One control step per millidegree: rotations are whole turns.
        let (angle, rate) = engine.get_heading_scaled(1000);
        assert_eq!(angle.rotations, -2);
        assert!((angle.millidegrees + 5_500).abs() <= 2);
        assert_eq!(rate, 0);

        spin_z(&mut engine, -10.0, 0.01);
        let (_, rate) = engine.get_heading_scaled(1000);
        let expected = -engine.get_angular_velocity(true).z * 1000.0;
        assert_eq!(rate, expected as i32);
        assert!(rate > 9_000);
    }
}
