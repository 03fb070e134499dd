//! A small driving simulation: a kinematic car on a circular road.
//!
//! The car starts on the centerline facing counter-clockwise. Each frame it
//! earns reward for distance travelled along the centerline, pays a small
//! time penalty, and the episode ends when it leaves the road or runs out of
//! frames.
//!
//! Observation layout (6 values):
//!
//! | index | value |
//! |-------|-------|
//! | 0 | lateral offset / half width |
//! | 1 | sin(heading error) |
//! | 2 | cos(heading error) |
//! | 3 | speed / max speed |
//! | 4 | steering angle / max steering angle |
//! | 5 | fraction of the current lap completed |

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::actions::Control;
use crate::environment::{Environment, Step};
use crate::error::{RacerError, Result};

pub const OBSERVATION_DIM: usize = 6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub radius: f32,
    pub half_width: f32,
    pub wheelbase: f32,
    pub max_steer_angle: f32,
    pub engine_accel: f32,
    pub brake_decel: f32,
    pub drag: f32,
    pub max_speed: f32,
    /// Seconds per simulation frame
    pub dt: f32,
    pub max_frames: usize,
    pub progress_reward: f32,
    pub time_penalty: f32,
    pub off_track_penalty: f32,
    pub seed: Option<u64>,
}

impl Default for TrackConfig {
    fn default() -> Self {
        TrackConfig {
            radius: 30.0,
            half_width: 4.0,
            wheelbase: 2.5,
            max_steer_angle: 0.5,
            engine_accel: 6.0,
            brake_decel: 12.0,
            drag: 0.1,
            max_speed: 25.0,
            dt: 0.05,
            max_frames: 2_000,
            progress_reward: 1.0,
            time_penalty: 0.1,
            off_track_penalty: 100.0,
            seed: None,
        }
    }
}

impl TrackConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("radius", self.radius),
            ("half_width", self.half_width),
            ("wheelbase", self.wheelbase),
            ("max_steer_angle", self.max_steer_angle),
            ("max_speed", self.max_speed),
            ("dt", self.dt),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(RacerError::config(format!("track.{} must be > 0, got {}", name, value)));
            }
        }
        let non_negative = [
            ("engine_accel", self.engine_accel),
            ("brake_decel", self.brake_decel),
            ("drag", self.drag),
            ("time_penalty", self.time_penalty),
            ("off_track_penalty", self.off_track_penalty),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(RacerError::config(format!("track.{} must be >= 0, got {}", name, value)));
            }
        }
        if self.half_width >= self.radius {
            return Err(RacerError::config("track.half_width must be smaller than track.radius"));
        }
        if self.max_frames == 0 {
            return Err(RacerError::config("track.max_frames must be > 0"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CarState {
    x: f32,
    y: f32,
    heading: f32,
    speed: f32,
    steer_angle: f32,
}

pub struct TrackEnv {
    config: TrackConfig,
    car: CarState,
    /// Centerline angle travelled this episode, in radians
    angle_travelled: f32,
    frames: usize,
    done: bool,
    rng: StdRng,
}

impl TrackEnv {
    pub fn new(config: TrackConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(TrackEnv {
            config,
            car: CarState::default(),
            angle_travelled: 0.0,
            frames: 0,
            // a fresh environment must be reset before stepping
            done: true,
            rng,
        })
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    /// Laps completed this episode, fractional.
    pub fn laps(&self) -> f32 {
        self.angle_travelled / TAU
    }

    fn polar_angle(&self) -> f32 {
        self.car.y.atan2(self.car.x)
    }

    fn lateral_offset(&self) -> f32 {
        self.car.x.hypot(self.car.y) - self.config.radius
    }

    fn heading_error(&self) -> f32 {
        wrap_angle(self.car.heading - (self.polar_angle() + FRAC_PI_2))
    }

    fn observation(&self) -> Array1<f32> {
        let err = self.heading_error();
        array![
            self.lateral_offset() / self.config.half_width,
            err.sin(),
            err.cos(),
            self.car.speed / self.config.max_speed,
            self.car.steer_angle / self.config.max_steer_angle,
            self.laps().rem_euclid(1.0),
        ]
    }
}

impl Environment for TrackEnv {
    fn observation_dim(&self) -> usize {
        OBSERVATION_DIM
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        let offset = self.rng.gen_range(-0.2..=0.2) * self.config.half_width;
        let heading_noise = self.rng.gen_range(-0.1..=0.1);
        let r = self.config.radius + offset;

        self.car = CarState {
            x: r,
            y: 0.0,
            heading: FRAC_PI_2 + heading_noise,
            speed: 0.0,
            steer_angle: 0.0,
        };
        self.angle_travelled = 0.0;
        self.frames = 0;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, control: &Control) -> Result<Step> {
        if self.done {
            return Err(RacerError::environment("step called on a finished episode; reset first"));
        }
        if ![control.steer, control.gas, control.brake].iter().all(|v| v.is_finite()) {
            return Err(RacerError::environment(format!("non-finite control {:?}", control)));
        }

        let cfg = &self.config;
        let steer = control.steer.clamp(-1.0, 1.0);
        let gas = control.gas.clamp(0.0, 1.0);
        let brake = control.brake.clamp(0.0, 1.0);

        let car = &mut self.car;
        car.steer_angle = steer * cfg.max_steer_angle;
        let accel = gas * cfg.engine_accel - brake * cfg.brake_decel - cfg.drag * car.speed;
        car.speed = (car.speed + accel * cfg.dt).clamp(0.0, cfg.max_speed);
        car.heading = wrap_angle(car.heading + car.speed / cfg.wheelbase * car.steer_angle.tan() * cfg.dt);

        let before = self.car.y.atan2(self.car.x);
        self.car.x += self.car.speed * self.car.heading.cos() * cfg.dt;
        self.car.y += self.car.speed * self.car.heading.sin() * cfg.dt;
        let swept = wrap_angle(self.polar_angle() - before);
        self.angle_travelled += swept;
        self.frames += 1;

        let progress = swept * cfg.radius;
        let mut reward = progress * cfg.progress_reward - cfg.time_penalty;
        let off_track = self.lateral_offset().abs() > cfg.half_width;
        if off_track {
            reward -= cfg.off_track_penalty;
        }
        self.done = off_track || self.frames >= cfg.max_frames;

        Ok(Step {
            observation: self.observation(),
            reward,
            done: self.done,
        })
    }
}

/// Wrap an angle into `(-PI, PI]`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> TrackEnv {
        TrackEnv::new(TrackConfig {
            seed: Some(42),
            ..TrackConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reset_observation_is_near_centerline() {
        let mut env = env();
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), OBSERVATION_DIM);
        assert!(obs[0].abs() <= 0.2 + 1e-5);
        assert!(obs[2] > 0.99);
        assert_eq!(obs[3], 0.0);
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut env = env();
        assert!(matches!(
            env.step(&Control::default()),
            Err(RacerError::Environment(_))
        ));
    }

    #[test]
    fn test_driving_forward_earns_progress() {
        let mut env = TrackEnv::new(TrackConfig {
            time_penalty: 0.0,
            seed: Some(42),
            ..TrackConfig::default()
        })
        .unwrap();
        env.reset().unwrap();
        let mut total = 0.0;
        for _ in 0..20 {
            let step = env.step(&Control::new(0.0, 1.0, 0.0)).unwrap();
            total += step.reward;
            assert!(!step.done);
        }
        assert!(total > 0.0);
        assert!(env.laps() > 0.0);
    }

    #[test]
    fn test_leaving_the_road_terminates() {
        let mut env = env();
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..2_000 {
            let step = env.step(&Control::new(-1.0, 1.0, 0.0)).unwrap();
            let done = step.done;
            last = Some(step);
            if done {
                break;
            }
        }
        let last = last.unwrap();
        assert!(last.done);
        assert!(last.reward < -50.0);
    }

    #[test]
    fn test_frame_limit_terminates() {
        let mut env = TrackEnv::new(TrackConfig {
            max_frames: 3,
            seed: Some(1),
            ..TrackConfig::default()
        })
        .unwrap();
        env.reset().unwrap();
        assert!(!env.step(&Control::default()).unwrap().done);
        assert!(!env.step(&Control::default()).unwrap().done);
        assert!(env.step(&Control::default()).unwrap().done);
    }

    #[test]
    fn test_invalid_config() {
        let config = TrackConfig {
            half_width: 40.0,
            ..TrackConfig::default()
        };
        assert!(TrackEnv::new(config).is_err());
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI / 2.0) + FRAC_PI_2).abs() < 1e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-6);
    }
}
