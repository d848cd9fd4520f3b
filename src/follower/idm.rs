use crate::PlanError;
use serde::{Deserialize, Serialize};

/// The smallest net gap used by the IDM interaction term, in m.
/// Keeps the term finite when the vehicles touch or overlap.
const MIN_NET_GAP: f64 = 0.01; // m

/// The parameters of the car-following model and the AV's actuation limits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    /// The minimum gap to maintain to the vehicle ahead, in m.
    pub min_gap: f64,
    /// The desired speed in free traffic, in m/s.
    pub desired_speed: f64,
    /// The comfortable acceleration scaling the IDM law, in m/s<sup>2</sup>.
    pub comfort_accel: f64,
    /// The comfortable deceleration, a positive number in m/s<sup>2</sup>.
    pub comfort_decel: f64,
    /// The desired time gap to the vehicle ahead, in s.
    pub time_headway: f64,
    /// The exponent of the free-road term.
    pub accel_exponent: f64,
    /// The length of the vehicle ahead, in m.
    pub vehicle_length: f64,
    /// The AV's maximum acceleration, in m/s<sup>2</sup>.
    pub max_accel: f64,
    /// The AV's maximum deceleration, a positive number in m/s<sup>2</sup>.
    pub max_decel: f64,
    /// Within this distance of a red or amber light the AV brakes, in m.
    pub conflict_distance: f64,
    /// How far ahead to place the leader when there is none, in m.
    pub free_flow_gap: f64,
    /// The number of RK4 steps per integration horizon.
    pub substeps: usize,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            min_gap: 2.0,
            desired_speed: 50.0,
            comfort_accel: 0.73,
            comfort_decel: 1.67,
            time_headway: 1.5,
            accel_exponent: 4.0,
            vehicle_length: 4.0,
            max_accel: 2.0,
            max_decel: 1.0,
            conflict_distance: 5.0,
            free_flow_gap: 100.0,
            substeps: 10,
        }
    }
}

impl ModelParameters {
    /// Checks that the parameters describe a usable model.
    pub fn validate(&self) -> Result<(), PlanError> {
        let positive = [
            ("desired_speed", self.desired_speed),
            ("comfort_accel", self.comfort_accel),
            ("comfort_decel", self.comfort_decel),
            ("free_flow_gap", self.free_flow_gap),
        ];
        let non_negative = [
            ("min_gap", self.min_gap),
            ("time_headway", self.time_headway),
            ("accel_exponent", self.accel_exponent),
            ("vehicle_length", self.vehicle_length),
            ("max_accel", self.max_accel),
            ("max_decel", self.max_decel),
            ("conflict_distance", self.conflict_distance),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(PlanError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(PlanError::InvalidConfig(format!("{} must not be negative", name)));
            }
        }
        if self.substeps == 0 {
            return Err(PlanError::InvalidConfig("substeps must be at least 1".into()));
        }
        Ok(())
    }

    /// The desired dynamic gap s* to the vehicle ahead.
    ///
    /// # Arguments
    /// * `my_vel` - The velocity of the AV (m/s).
    /// * `appr` - The approach rate, the AV's velocity minus the leader's (m/s).
    pub fn desired_gap(&self, my_vel: f64, appr: f64) -> f64 {
        let factor = 1. / (2. * (self.comfort_accel * self.comfort_decel).sqrt());
        self.min_gap + (my_vel * self.time_headway) + (my_vel * appr * factor)
    }

    /// Computes an acceleration using the intelligent driver model, before actuator limits.
    ///
    /// # Arguments
    /// * `gap` - The distance between the AV's and the leader's reference points (m).
    /// * `my_vel` - The velocity of the AV (m/s).
    /// * `their_vel` - The leader's velocity (m/s).
    pub fn idm(&self, gap: f64, my_vel: f64, their_vel: f64) -> f64 {
        let net_dist = f64::max(gap - self.vehicle_length, MIN_NET_GAP);
        let free = (my_vel.max(0.0) / self.desired_speed).powf(self.accel_exponent);
        let term = self.desired_gap(my_vel, my_vel - their_vel) / net_dist;
        self.comfort_accel * (1. - free - (term * term))
    }

    /// Limits an acceleration to what the AV's actuators can deliver.
    pub fn clamp_accel(&self, acc: f64) -> f64 {
        f64::min(f64::max(acc, -self.max_decel), self.max_accel)
    }

    /// The IDM acceleration on an empty road, after actuator limits.
    pub fn free_flow_accel(&self, my_vel: f64) -> f64 {
        let free = (my_vel.max(0.0) / self.desired_speed).powf(self.accel_exponent);
        self.clamp_accel(self.comfort_accel * (1. - free))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn desired_gap() {
        let params = ModelParameters::default();
        assert_approx_eq!(params.desired_gap(0.0, 0.0), 2.0);
        assert_approx_eq!(params.desired_gap(10.0, 0.0), 17.0);
        let factor = 1.0 / (2.0 * (0.73f64 * 1.67).sqrt());
        assert_approx_eq!(params.desired_gap(10.0, 2.0), 17.0 + 20.0 * factor);
    }

    #[test]
    fn idm_limits() {
        let params = ModelParameters::default();

        // Standing still with the road clear: full comfortable acceleration.
        assert_approx_eq!(params.idm(1e12, 0.0, 0.0), 0.73);

        // At the desired speed with the road clear: no acceleration.
        assert_approx_eq!(params.idm(1e12, 50.0, 50.0), 0.0);

        // Bumper to bumper: strongly negative but finite.
        let acc = params.idm(3.0, 5.0, 0.0);
        assert!(acc.is_finite());
        assert!(acc < -1000.0);
        assert_eq!(params.clamp_accel(acc), -1.0);
        assert_eq!(params.clamp_accel(5.0), 2.0);
    }

    #[test]
    fn validation() {
        assert!(ModelParameters::default().validate().is_ok());
        let params = ModelParameters {
            comfort_decel: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(PlanError::InvalidConfig(_))));
        let params = ModelParameters {
            substeps: 0,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_config() {
        let params: ModelParameters =
            serde_json::from_str(r#"{"max_decel": 3.5, "conflict_distance": 20}"#).unwrap();
        assert_eq!(params.max_decel, 3.5);
        assert_eq!(params.conflict_distance, 20.0);
        assert_eq!(params.min_gap, 2.0);
    }
}
