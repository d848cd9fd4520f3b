//! The host-facing planner: one call per simulation tick.

use crate::context::{AvState, ContextInfo, Pose, StepInfo};
use crate::follower::{CarFollowingEngine, ModelParameters};
use crate::math::heading_vector;
use crate::trajectory::{AdvanceMode, ReferenceTrajectory, TrajectoryIndex, Waypoint};
use crate::validator::{KinematicLimits, KinematicValidator, ValidationReport};
use crate::PlanError;
use arrayvec::ArrayVec;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

/// The most states a multi-step planning result can hold.
pub const MAX_HORIZON: usize = 20;

/// Where the planner's commands come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    /// Replay a reference trajectory.
    Replay,
    /// Integrate the car-following model.
    #[default]
    Dynamics,
}

/// The planner configuration. Fields missing from a configuration file keep their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub mode: PlanningMode,
    /// How replay mode walks the reference trajectory.
    pub advance: AdvanceMode,
    /// The time between planned states, in s.
    pub time_resolution: f64,
    /// The number of states planned per tick. One gives single-state results.
    pub horizon: usize,
    pub model: ModelParameters,
    pub limits: KinematicLimits,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlanningMode::default(),
            advance: AdvanceMode::default(),
            time_resolution: 0.1,
            horizon: 1,
            model: ModelParameters::default(),
            limits: KinematicLimits::default(),
        }
    }
}

impl PlannerConfig {
    /// Reads a configuration from JSON.
    pub fn from_json_reader(reader: impl Read) -> Result<Self, PlanError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(self.time_resolution > 0.0 && self.time_resolution.is_finite()) {
            return Err(PlanError::InvalidConfig(
                "time_resolution must be positive".into(),
            ));
        }
        if !(1..=MAX_HORIZON).contains(&self.horizon) {
            return Err(PlanError::InvalidConfig(format!(
                "horizon must be between 1 and {}",
                MAX_HORIZON
            )));
        }
        self.model.validate()
    }
}

/// A single planned state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedState {
    pub next_x: f64,
    pub next_y: f64,
    pub next_speed: f64,
    pub next_orientation: f64,
}

impl PlannedState {
    /// The planned pose.
    pub fn pose(&self) -> Pose {
        Pose {
            x: self.next_x,
            y: self.next_y,
            orientation: self.next_orientation,
        }
    }
}

impl From<Waypoint> for PlannedState {
    fn from(waypoint: Waypoint) -> Self {
        Self {
            next_x: waypoint.x,
            next_y: waypoint.y,
            next_speed: waypoint.velocity,
            next_orientation: waypoint.orientation,
        }
    }
}

/// A sequence of planned states, `time_resolution` apart, stored field by field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedHorizon {
    pub next_x: ArrayVec<f64, MAX_HORIZON>,
    pub next_y: ArrayVec<f64, MAX_HORIZON>,
    pub next_speed: ArrayVec<f64, MAX_HORIZON>,
    pub next_orientation: ArrayVec<f64, MAX_HORIZON>,
}

impl PlannedHorizon {
    /// The number of planned states.
    pub fn len(&self) -> usize {
        self.next_x.len()
    }

    /// Whether no states are planned.
    pub fn is_empty(&self) -> bool {
        self.next_x.is_empty()
    }

    /// Gets the planned state at `idx`.
    pub fn get(&self, idx: usize) -> Option<PlannedState> {
        Some(PlannedState {
            next_x: *self.next_x.get(idx)?,
            next_y: *self.next_y.get(idx)?,
            next_speed: *self.next_speed.get(idx)?,
            next_orientation: *self.next_orientation.get(idx)?,
        })
    }

    /// Appends a state. Ignored once [MAX_HORIZON] states are held.
    pub fn push(&mut self, state: PlannedState) {
        if self.next_x.is_full() {
            return;
        }
        self.next_x.push(state.next_x);
        self.next_y.push(state.next_y);
        self.next_speed.push(state.next_speed);
        self.next_orientation.push(state.next_orientation);
    }
}

impl FromIterator<PlannedState> for PlannedHorizon {
    /// Collects at most [MAX_HORIZON] states; the rest are dropped.
    fn from_iter<I: IntoIterator<Item = PlannedState>>(iter: I) -> Self {
        let mut horizon = PlannedHorizon::default();
        for state in iter.into_iter().take(MAX_HORIZON) {
            horizon.push(state);
        }
        horizon
    }
}

/// The planned motion, either one state or a short sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Plan {
    Single(PlannedState),
    Horizon(PlannedHorizon),
}

/// The result handed back to the simulation host each tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    /// Seconds since the Unix epoch when the result was produced.
    pub timestamp: f64,
    /// The time between planned states, in s.
    pub time_resolution: f64,
    #[serde(flatten)]
    pub plan: Plan,
}

impl PlanningResult {
    /// Packages a plan, stamped with the current time.
    pub fn new(time_resolution: f64, plan: Plan) -> Self {
        Self {
            timestamp: now(),
            time_resolution,
            plan,
        }
    }

    /// The first planned state.
    pub fn first(&self) -> Option<PlannedState> {
        match &self.plan {
            Plan::Single(state) => Some(*state),
            Plan::Horizon(horizon) => horizon.get(0),
        }
    }

    /// Serializes the result to JSON.
    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A planner instance, owned by a single host loop.
#[derive(Debug)]
pub struct Planner {
    config: PlannerConfig,
    engine: CarFollowingEngine,
    validator: KinematicValidator,
    trajectory: Option<TrajectoryIndex>,
    /// The most recent result, held when a tick's context is unusable.
    last: Option<PlanningResult>,
}

impl Planner {
    /// Creates a planner. Replay mode needs a reference trajectory.
    pub fn initialize(
        config: PlannerConfig,
        trajectory: Option<ReferenceTrajectory>,
    ) -> Result<Self, PlanError> {
        config.validate()?;
        if config.mode == PlanningMode::Replay && trajectory.is_none() {
            return Err(PlanError::InvalidConfig(
                "replay mode needs a reference trajectory".into(),
            ));
        }
        let trajectory = trajectory.map(|t| TrajectoryIndex::new(t, config.advance));
        info!(
            "planner initialized: {:?} mode, {} state(s) every {} s{}",
            config.mode,
            config.horizon,
            config.time_resolution,
            trajectory
                .as_ref()
                .map(|t| format!(", {} waypoints", t.trajectory().len()))
                .unwrap_or_default()
        );
        Ok(Self {
            engine: CarFollowingEngine::new(config.model)?,
            validator: KinematicValidator::new(config.limits),
            config,
            trajectory,
            last: None,
        })
    }

    /// The configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// The reference trajectory being replayed, if any.
    pub fn trajectory(&self) -> Option<&TrajectoryIndex> {
        self.trajectory.as_ref()
    }

    /// Plans the next tick.
    ///
    /// In dynamics mode this fails with [PlanError::InvalidContext] or
    /// [PlanError::GapViolation]; see [Planner::fallback] for the recovery.
    pub fn step(&mut self, step_info: &StepInfo) -> Result<PlanningResult, PlanError> {
        let av = &step_info.av_info;
        let plan = match self.config.mode {
            PlanningMode::Replay => self.replay(av),
            PlanningMode::Dynamics => {
                let context = ContextInfo::from_step_info(step_info)?;
                self.follow(av, &context)?
            }
        };
        let result = PlanningResult::new(self.config.time_resolution, plan);
        self.last = Some(result.clone());
        Ok(result)
    }

    /// The command to issue when [Planner::step] fails.
    ///
    /// An unusable context holds the previous command, or brakes if there is none.
    /// Any other failure brakes at the AV's maximum deceleration.
    pub fn fallback(&mut self, step_info: &StepInfo, error: &PlanError) -> PlanningResult {
        warn!("planning failed ({}), applying fallback", error);
        if let PlanError::InvalidContext(_) = error {
            if let Some(held) = self.hold() {
                return held;
            }
        }
        let plan = self.braking(&step_info.av_info);
        let result = PlanningResult::new(self.config.time_resolution, plan);
        self.last = Some(result.clone());
        result
    }

    /// Re-issues the previous command with a fresh timestamp, for a tick whose
    /// record could not be read at all. Returns `None` before the first command.
    pub fn hold(&mut self) -> Option<PlanningResult> {
        let held = PlanningResult {
            timestamp: now(),
            ..self.last.clone()?
        };
        self.last = Some(held.clone());
        Some(held)
    }

    /// Plans the next tick, applying the fallback on failure.
    pub fn step_or_fallback(&mut self, step_info: &StepInfo) -> PlanningResult {
        match self.step(step_info) {
            Ok(result) => result,
            Err(err) => self.fallback(step_info, &err),
        }
    }

    /// Checks the first state of `result` against the vehicle's dynamic limits.
    pub fn audit(&self, step_info: &StepInfo, result: &PlanningResult) -> ValidationReport {
        match result.first() {
            Some(state) => self.validator.check(
                &step_info.av_info,
                &state.pose(),
                result.time_resolution,
            ),
            None => ValidationReport::default(),
        }
    }

    /// Serves the next waypoint(s) of the reference trajectory.
    fn replay(&mut self, av: &AvState) -> Plan {
        let horizon = self.config.horizon;
        let index = match self.trajectory.as_mut() {
            Some(index) => index,
            None => return self.braking(av),
        };
        index.advance(av.x, av.y);
        let states: PlannedHorizon = index
            .upcoming(horizon)
            .iter()
            .map(|w| PlannedState::from(*w))
            .collect();
        self.package(states)
    }

    /// Integrates the car-following model, projecting the longitudinal motion
    /// along the AV's heading.
    fn follow(&self, av: &AvState, context: &ContextInfo) -> Result<Plan, PlanError> {
        let dt = self.config.time_resolution;
        let dir = heading_vector(av.orientation);
        let (mut state, lead_vel) = self.engine.initial_state(av, context);
        let mut context = *context;

        let mut states = PlannedHorizon::default();
        for _ in 0..self.config.horizon {
            let prev = state;
            state = self.engine.step_from(state, lead_vel, &context, dt)?.state;
            let travelled = state.x_follow - prev.x_follow;
            context.distance_to_light = f64::max(context.distance_to_light - travelled, 0.0);

            let dist = state.x_follow - av.x;
            states.push(PlannedState {
                next_x: av.x + dist * dir.x,
                next_y: av.y + dist * dir.y,
                next_speed: state.speed,
                next_orientation: av.orientation,
            });
        }

        Ok(self.package(states))
    }

    /// Brakes at the AV's maximum deceleration along its current heading.
    fn braking(&self, av: &AvState) -> Plan {
        let dt = self.config.time_resolution;
        let decel = self.engine.params().max_decel;
        let dir = heading_vector(av.orientation);

        let mut vel = av.speed_long.max(0.0);
        let mut dist = 0.0;
        let states = (0..self.config.horizon).map(|_| {
            let next_vel = f64::max(vel - dt * decel, 0.0);
            dist += 0.5 * (vel + next_vel) * dt;
            vel = next_vel;
            PlannedState {
                next_x: av.x + dist * dir.x,
                next_y: av.y + dist * dir.y,
                next_speed: vel,
                next_orientation: av.orientation,
            }
        });
        self.package(states.collect())
    }

    /// Wraps planned states as a single state or a horizon, as configured.
    fn package(&self, states: PlannedHorizon) -> Plan {
        match states.get(0) {
            Some(state) if self.config.horizon == 1 => Plan::Single(state),
            _ => Plan::Horizon(states),
        }
    }
}
