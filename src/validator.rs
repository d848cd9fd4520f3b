//! Auditing commanded motion against the vehicle's dynamic limits.
//!
//! The validator reconstructs speeds, accelerations, jerk, slip angle and yaw rate
//! from the AV's current state and the next commanded pose. Because the next pose is
//! a command rather than an observation, violations describe what the planner asked
//! for, not what the vehicle achieved. Findings are reported, never raised.

use crate::context::{AvState, Pose};
use crate::math::{rotate_clockwise, wrap_angle, Point2d};
use log::warn;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::f64::consts::FRAC_PI_2;
use std::fmt;

/// The dynamic limits of the vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicLimits {
    /// Maximum overall acceleration in m/s<sup>2</sup>.
    pub max_accel: f64,
    /// Maximum overall deceleration in m/s<sup>2</sup>, a positive number.
    pub max_decel: f64,
    /// Maximum overall jerk in m/s<sup>3</sup>.
    pub max_jerk: f64,
    /// Maximum absolute slip angle in radians.
    pub max_slip_angle: f64,
    /// Maximum absolute yaw rate in radians/s.
    pub max_yaw_rate: f64,
}

impl Default for KinematicLimits {
    fn default() -> Self {
        Self {
            max_accel: 2.87,
            max_decel: 7.06,
            max_jerk: 10.0,
            max_slip_angle: 15f64.to_radians(),
            max_yaw_rate: 50f64.to_radians(),
        }
    }
}

/// The kind of limit a commanded motion breached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    AccelExceeded,
    DecelExceeded,
    JerkExceeded,
    SlipAngleExceeded,
    YawRateExceeded,
}

impl ViolationKind {
    fn quantity(self) -> &'static str {
        use ViolationKind::*;
        match self {
            AccelExceeded => "overall acceleration",
            DecelExceeded => "overall deceleration",
            JerkExceeded => "overall jerk",
            SlipAngleExceeded => "absolute slip angle",
            YawRateExceeded => "absolute yaw rate",
        }
    }
}

/// A breached limit, with the measured value and the limit it exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub measured: f64,
    pub limit: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the {} ({}) is higher than the maximum ({})",
            self.kind.quantity(),
            self.measured,
            self.limit
        )
    }
}

/// The violations found for one commanded transition. Empty when the motion is feasible.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: SmallVec<[Violation; 5]>,
}

impl ValidationReport {
    /// Whether no limit was breached.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// The number of breached limits.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Iterates over the violations.
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// Finds the violation of the given kind, if any.
    pub fn get(&self, kind: ViolationKind) -> Option<&Violation> {
        self.violations.iter().find(|v| v.kind == kind)
    }

    fn check(&mut self, kind: ViolationKind, measured: f64, limit: f64) {
        if measured > limit {
            let violation = Violation {
                kind,
                measured,
                limit,
            };
            warn!("{}", violation);
            self.violations.push(violation);
        }
    }
}

/// The motion implied by a commanded transition, in the vehicle's frame at the start of it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KinematicSample {
    pub speed_long: f64,
    pub speed_lat: f64,
    pub accel_long: f64,
    pub accel_lat: f64,
    pub jerk_long: f64,
    pub jerk_lat: f64,
    /// Radians, within [-π/2, π/2].
    pub slip_angle: f64,
    /// Radians/s.
    pub yaw_rate: f64,
}

impl KinematicSample {
    /// The magnitude of the acceleration vector.
    pub fn overall_accel(&self) -> f64 {
        self.accel_long.hypot(self.accel_lat)
    }

    /// The magnitude of the jerk vector.
    pub fn overall_jerk(&self) -> f64 {
        self.jerk_long.hypot(self.jerk_lat)
    }
}

/// Checks commanded transitions against a set of [KinematicLimits].
#[derive(Clone, Debug, Default)]
pub struct KinematicValidator {
    limits: KinematicLimits,
}

impl KinematicValidator {
    /// Creates a validator.
    pub fn new(limits: KinematicLimits) -> Self {
        Self { limits }
    }

    /// The limits being enforced.
    pub fn limits(&self) -> &KinematicLimits {
        &self.limits
    }

    /// Reconstructs the motion needed to move from `previous` to `commanded` in `dt` seconds.
    pub fn derive(previous: &AvState, commanded: &Pose, dt: f64) -> KinematicSample {
        let current = Point2d::new(previous.x, previous.y);
        let next = rotate_clockwise(
            Point2d::new(commanded.x, commanded.y),
            current,
            previous.orientation,
        );

        let speed_long = (next.x - current.x) / dt;
        let speed_lat = (next.y - current.y) / dt;

        let accel_long = (speed_long - previous.speed_long) / dt;
        let accel_lat = (speed_lat - previous.speed_lat) / dt;

        let jerk_long = (accel_long - previous.accel_long) / dt;
        let jerk_lat = (accel_lat - previous.accel_lat) / dt;

        KinematicSample {
            speed_long,
            speed_lat,
            accel_long,
            accel_lat,
            jerk_long,
            jerk_lat,
            slip_angle: slip_angle(speed_long, speed_lat),
            yaw_rate: wrap_angle(commanded.orientation - previous.orientation) / dt,
        }
    }

    /// Checks the transition from `previous` to `commanded` over `dt` seconds.
    pub fn check(&self, previous: &AvState, commanded: &Pose, dt: f64) -> ValidationReport {
        let sample = Self::derive(previous, commanded, dt);
        self.check_sample(&sample)
    }

    /// Checks an already reconstructed motion.
    pub fn check_sample(&self, sample: &KinematicSample) -> ValidationReport {
        use ViolationKind::*;
        let limits = &self.limits;
        let mut report = ValidationReport::default();

        if sample.accel_long >= 0.0 {
            report.check(AccelExceeded, sample.overall_accel(), limits.max_accel);
        } else {
            report.check(DecelExceeded, sample.overall_accel(), limits.max_decel);
        }
        report.check(JerkExceeded, sample.overall_jerk(), limits.max_jerk);
        report.check(
            SlipAngleExceeded,
            sample.slip_angle.abs(),
            limits.max_slip_angle,
        );
        report.check(YawRateExceeded, sample.yaw_rate.abs(), limits.max_yaw_rate);

        report
    }
}

/// The angle between the velocity and the longitudinal axis.
///
/// Reversing is measured against the rear axis, so the result stays within [-π/2, π/2].
fn slip_angle(speed_long: f64, speed_lat: f64) -> f64 {
    if speed_long == 0.0 {
        if speed_lat > 0.0 {
            FRAC_PI_2
        } else if speed_lat < 0.0 {
            -FRAC_PI_2
        } else {
            0.0
        }
    } else {
        (speed_lat / speed_long).atan()
    }
}
