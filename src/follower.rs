//! The car-following dynamics engine.
//!
//! The AV is modelled on a single longitudinal axis together with the vehicle
//! ahead of it. Each tick integrates the intelligent driver model over a short
//! horizon, overridden by maximum braking when a red or amber light is close.

use crate::context::{AvState, ContextInfo};
use crate::math::{integrate, OdeState, Profile};
use crate::PlanError;
use log::debug;

pub use self::idm::ModelParameters;

mod idm;

/// The AV's response to the upcoming traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightPolicy {
    /// Follow the IDM law at comfortable acceleration.
    Proceed,
    /// Brake at the AV's maximum deceleration.
    Stop,
}

impl LightPolicy {
    /// Chooses the policy for a tick. The AV stops when the light is red or amber
    /// and strictly closer than the conflict distance.
    pub fn for_context(context: &ContextInfo, params: &ModelParameters) -> Self {
        if context.light.requires_stop() && context.distance_to_light < params.conflict_distance {
            LightPolicy::Stop
        } else {
            LightPolicy::Proceed
        }
    }
}

/// The integrated state of the AV and its leader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowerState {
    /// The AV's longitudinal position in m.
    pub x_follow: f64,
    /// The leader's longitudinal position in m.
    pub x_lead: f64,
    /// The AV's speed in m/s.
    pub speed: f64,
}

impl FollowerState {
    /// The distance between the AV and its leader in m.
    pub fn gap(&self) -> f64 {
        self.x_lead - self.x_follow
    }

    fn is_finite(&self) -> bool {
        self.x_follow.is_finite() && self.x_lead.is_finite() && self.speed.is_finite()
    }
}

impl OdeState for FollowerState {
    fn add_scaled(self, scale: f64, rate: Self) -> Self {
        Self {
            x_follow: self.x_follow + scale * rate.x_follow,
            x_lead: self.x_lead + scale * rate.x_lead,
            speed: self.speed + scale * rate.speed,
        }
    }
}

/// The outcome of one engine step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowerStep {
    /// The state at the end of the horizon.
    pub state: FollowerState,
    /// The AV's acceleration at the end of the horizon, in m/s<sup>2</sup>.
    pub accel: f64,
    /// The policy applied over the horizon.
    pub policy: LightPolicy,
}

/// Integrates the car-following model one tick at a time.
#[derive(Clone, Debug)]
pub struct CarFollowingEngine {
    params: ModelParameters,
}

impl CarFollowingEngine {
    /// Creates an engine, rejecting unusable parameters.
    pub fn new(params: ModelParameters) -> Result<Self, PlanError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The model parameters.
    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    /// The initial state for a tick, and the leader's speed.
    ///
    /// Without a leading vehicle, a leader is placed `free_flow_gap` ahead,
    /// travelling at the AV's speed, so that the gap term never binds.
    pub fn initial_state(&self, av: &AvState, context: &ContextInfo) -> (FollowerState, f64) {
        let (x_lead, lead_vel) = match context.leading_vehicle {
            Some(leader) => (leader.x, leader.speed_long),
            None => (av.x + self.params.free_flow_gap, av.speed_long),
        };
        let state = FollowerState {
            x_follow: av.x,
            x_lead,
            speed: av.speed_long,
        };
        (state, lead_vel)
    }

    /// Advances the AV by `dt` seconds.
    ///
    /// Fails with [PlanError::GapViolation] if the AV is level with or ahead of its
    /// leader, and with [PlanError::InvalidContext] if `dt` or the light distance
    /// is unusable.
    pub fn step(
        &self,
        av: &AvState,
        context: &ContextInfo,
        dt: f64,
    ) -> Result<FollowerStep, PlanError> {
        let (state, lead_vel) = self.initial_state(av, context);
        self.step_from(state, lead_vel, context, dt)
    }

    /// Advances an explicit follower state by `dt` seconds with the leader at `lead_vel`.
    pub fn step_from(
        &self,
        state: FollowerState,
        lead_vel: f64,
        context: &ContextInfo,
        dt: f64,
    ) -> Result<FollowerStep, PlanError> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(PlanError::InvalidContext(format!("invalid time step {}", dt)));
        }
        if context.distance_to_light.is_nan() || !lead_vel.is_finite() {
            return Err(PlanError::InvalidContext(
                "non-numeric light distance or leader speed".into(),
            ));
        }
        let gap = state.gap();
        if !(gap > 0.0) || !state.is_finite() {
            return Err(PlanError::GapViolation { gap });
        }

        let policy = LightPolicy::for_context(context, &self.params);
        debug!(
            "light {} at {:.1} m, gap {:.1} m: {:?}",
            context.light, context.distance_to_light, gap, policy
        );

        // The horizon is sampled at its two ends only.
        let times = [0.0, dt];
        let commands = Profile::constant(&times, policy);
        let lead_vels = Profile::constant(&times, lead_vel);

        let rates = |s: FollowerState, t: f64| FollowerState {
            x_follow: s.speed.max(0.0),
            x_lead: *lead_vels.sample(t),
            speed: self.acceleration(&s, *lead_vels.sample(t), *commands.sample(t)),
        };
        let samples = integrate(rates, state, &times, self.params.substeps);
        let mut end = samples.last().copied().unwrap_or(state);

        let accel = self.acceleration(&end, *lead_vels.sample(dt), *commands.sample(dt));
        end.speed = f64::max(end.speed, 0.0);

        if !end.is_finite() || !accel.is_finite() || !(end.gap() > 0.0) {
            return Err(PlanError::GapViolation { gap: end.gap() });
        }

        Ok(FollowerStep {
            state: end,
            accel,
            policy,
        })
    }

    /// The AV's acceleration in a given state.
    fn acceleration(&self, state: &FollowerState, lead_vel: f64, policy: LightPolicy) -> f64 {
        match policy {
            LightPolicy::Stop => -self.params.max_decel,
            LightPolicy::Proceed => {
                let acc = self.params.idm(state.gap(), state.speed, lead_vel);
                self.params.clamp_accel(acc)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::light::LightState;
    use assert_approx_eq::assert_approx_eq;

    fn av(x: f64, speed: f64) -> AvState {
        AvState {
            x,
            speed_long: speed,
            ..Default::default()
        }
    }

    fn engine() -> CarFollowingEngine {
        CarFollowingEngine::new(ModelParameters::default()).unwrap()
    }

    #[test]
    fn free_flow_acceleration() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0).with_leader(1e9, 10.0);
        let step = engine.step(&av(0.0, 10.0), &context, 0.1).unwrap();

        assert_eq!(step.policy, LightPolicy::Proceed);
        let expected = engine.params().free_flow_accel(step.state.speed);
        assert_approx_eq!(step.accel, expected, 1e-9);
        assert_approx_eq!(step.state.speed, 10.0 + 0.1 * expected, 1e-4);
        assert_approx_eq!(step.state.x_follow, 1.0 + 0.5 * 0.01 * expected, 1e-4);
    }

    #[test]
    fn synthesized_leader_barely_binds() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0);
        let step = engine.step(&av(5.0, 10.0), &context, 0.1).unwrap();

        assert_approx_eq!(step.state.x_lead, 105.0 + 1.0, 1e-9);
        let free = engine.params().free_flow_accel(step.state.speed);
        assert!(step.accel < free);
        assert!(step.accel > 0.0);
    }

    #[test]
    fn red_light_brakes_at_max_deceleration() {
        let engine = engine();
        for light in [
            LightState::Red,
            LightState::RedMinor,
            LightState::Amber,
            LightState::AmberMinor,
        ] {
            for leader in [None, Some(12.0), Some(1000.0)] {
                let mut context = ContextInfo::new(light, 3.0);
                if let Some(x) = leader {
                    context = context.with_leader(x, 0.0);
                }
                let step = engine.step(&av(0.0, 8.0), &context, 0.1).unwrap();
                assert_eq!(step.policy, LightPolicy::Stop);
                assert_eq!(step.accel, -1.0);
                assert_approx_eq!(step.state.speed, 7.9, 1e-9);
                assert_approx_eq!(step.state.x_follow, 0.8 - 0.005, 1e-9);
            }
        }
    }

    #[test]
    fn conflict_distance_is_exclusive() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Red, 5.0);
        let step = engine.step(&av(0.0, 8.0), &context, 0.1).unwrap();
        assert_eq!(step.policy, LightPolicy::Proceed);

        let context = ContextInfo::new(LightState::Green, 1.0);
        let step = engine.step(&av(0.0, 8.0), &context, 0.1).unwrap();
        assert_eq!(step.policy, LightPolicy::Proceed);
    }

    #[test]
    fn close_leader_is_clamped() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0).with_leader(2.0, 0.0);
        let step = engine.step(&av(0.0, 5.0), &context, 0.1).unwrap();
        assert_eq!(step.accel, -1.0);
        assert!(step.state.speed < 5.0);
    }

    #[test]
    fn leader_advances() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0).with_leader(40.0, 6.0);
        let step = engine.step(&av(0.0, 6.0), &context, 0.2).unwrap();
        assert_approx_eq!(step.state.x_lead, 41.2, 1e-9);
    }

    #[test]
    fn speed_never_negative() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Red, 1.0);
        let step = engine.step(&av(0.0, 0.05), &context, 0.1).unwrap();
        assert_eq!(step.state.speed, 0.0);
        assert!(step.state.x_follow >= 0.0);
    }

    #[test]
    fn gap_violation() {
        let engine = engine();
        for x in [10.0, 9.0] {
            let context = ContextInfo::new(LightState::Green, 200.0).with_leader(x, 0.0);
            let err = engine.step(&av(10.0, 5.0), &context, 0.1).unwrap_err();
            assert!(err.is_gap_violation());
        }
    }

    #[test]
    fn gap_closed_within_step() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0).with_leader(0.5, 0.0);
        match engine.step(&av(0.0, 10.0), &context, 0.1) {
            Err(PlanError::GapViolation { gap }) => assert!(gap < 0.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_time_step() {
        let engine = engine();
        let context = ContextInfo::new(LightState::Green, 200.0);
        for dt in [0.0, -0.1, f64::NAN] {
            assert!(matches!(
                engine.step(&av(0.0, 5.0), &context, dt),
                Err(PlanError::InvalidContext(_))
            ));
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        let params = ModelParameters {
            desired_speed: -1.0,
            ..Default::default()
        };
        assert!(CarFollowingEngine::new(params).is_err());
    }
}
