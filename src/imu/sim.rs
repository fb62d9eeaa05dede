// Simulated IMU mounted flat on a differential-drive robot
//
// The yaw rate follows from the two simulated wheels and the robot geometry.
// A constant gyro bias is added, so the engine has something to calibrate
// away. Stationary detection mirrors a hardware driver: a window of raw
// samples that all stay within the thresholds of the window's first sample
// counts as stationary, and its sums are reported.

use std::collections::VecDeque;

use super::settings::STANDARD_GRAVITY;
use super::{ImuConfig, ImuDriver, ImuEvent};
use crate::config::LOOP_PERIOD_MS;
use crate::geometry::Xyz;
use crate::motor::SimMotor;

/// 500 deg/s range: 17.5 mdeg/s per count
pub const GYRO_SCALE: f32 = 0.0175;

/// 8 g range: 0.244 mg per count, in mm/s^2
pub const ACCEL_SCALE: f32 = 0.000244 * STANDARD_GRAVITY;

/// Frame period (s)
pub const SAMPLE_TIME: f32 = 0.002;

/// Frames in one stationary detection window (0.5 s)
const STATIONARY_WINDOW: u32 = 250;

#[derive(Default)]
struct Window {
    reference: Option<[i16; 6]>,
    gyro_sum: [i32; 3],
    accel_sum: [i32; 3],
    count: u32,
}

pub struct SimImu {
    left: SimMotor,
    right: SimMotor,
    /// mm
    wheel_diameter: f32,
    /// mm
    axle_track: f32,
    /// deg/s
    gyro_bias: Xyz,
    /// Rotation imposed from outside, e.g. the robot being picked up (deg/s)
    disturbance: Xyz,
    temperature: f32,
    gyro_threshold: i16,
    accel_threshold: i16,
    window: Window,
    stationary: bool,
    events: VecDeque<ImuEvent>,
}

impl SimImu {
    pub fn new(left: SimMotor, right: SimMotor, wheel_diameter: f32, axle_track: f32) -> Self {
        Self {
            left,
            right,
            wheel_diameter,
            axle_track,
            gyro_bias: Xyz::default(),
            disturbance: Xyz::default(),
            temperature: 25.0,
            gyro_threshold: 1,
            accel_threshold: 1,
            window: Window::default(),
            stationary: false,
            events: VecDeque::new(),
        }
    }

    pub fn with_gyro_bias(mut self, bias: Xyz) -> Self {
        self.gyro_bias = bias;
        self
    }

    pub fn set_disturbance(&mut self, rate: Xyz) {
        self.disturbance = rate;
    }

    /// Robot yaw rate (deg/s, counter-clockwise positive) from wheel speeds
    pub fn yaw_rate(&self) -> f32 {
        let difference = self.right.true_speed() - self.left.true_speed();
        difference * self.wheel_diameter / (2.0 * self.axle_track)
    }

    /// Produce the frames of one loop period
    pub fn step(&mut self) {
        let yaw = self.yaw_rate();
        let rate = self.disturbance + self.gyro_bias + Xyz::z() * yaw;

        let gyro = |v: f32| (v / GYRO_SCALE).round() as i16;
        let frame = [
            gyro(rate.x),
            gyro(rate.y),
            gyro(rate.z),
            0,
            0,
            (STANDARD_GRAVITY / ACCEL_SCALE).round() as i16,
        ];

        let frames = (LOOP_PERIOD_MS as f32 / 1000.0 / SAMPLE_TIME).round() as usize;
        for _ in 0..frames {
            self.events.push_back(ImuEvent::Frame(frame));
            self.detect_stationary(&frame);
        }
    }

    fn detect_stationary(&mut self, frame: &[i16; 6]) {
        let within = |reference: &[i16; 6], i: usize, threshold: i16| {
            (frame[i] as i32 - reference[i] as i32).abs() < threshold as i32
        };
        let still = self.window.reference.is_some_and(|reference| {
            (0..3).all(|i| {
                within(&reference, i, self.gyro_threshold)
                    && within(&reference, i + 3, self.accel_threshold)
            })
        });

        if !still {
            self.stationary = false;
            self.window = Window {
                reference: Some(*frame),
                ..Window::default()
            };
        }

        let window = &mut self.window;
        for i in 0..3 {
            window.gyro_sum[i] += frame[i] as i32;
            window.accel_sum[i] += frame[i + 3] as i32;
        }
        window.count += 1;

        if window.count == STATIONARY_WINDOW {
            self.stationary = true;
            self.events.push_back(ImuEvent::Stationary {
                gyro_sum: window.gyro_sum,
                accel_sum: window.accel_sum,
                num_samples: window.count,
            });
            // Keep the reference so stillness carries into the next window.
            *window = Window {
                reference: window.reference,
                ..Window::default()
            };
        }
    }
}

impl ImuDriver for SimImu {
    fn config(&self) -> ImuConfig {
        ImuConfig {
            gyro_scale: GYRO_SCALE,
            accel_scale: ACCEL_SCALE,
            sample_time: SAMPLE_TIME,
        }
    }

    fn poll_event(&mut self) -> Option<ImuEvent> {
        self.events.pop_front()
    }

    fn is_stationary(&self) -> bool {
        self.stationary
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn set_stationary_thresholds(&mut self, gyro: i16, accel: i16) {
        self.gyro_threshold = gyro;
        self.accel_threshold = accel;
    }
}
