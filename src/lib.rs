pub use cgmath;
pub use context::{AvState, ContextInfo, LeadingVehicle, Pose, StepInfo};
pub use error::PlanError;
pub use follower::{CarFollowingEngine, FollowerState, FollowerStep, LightPolicy, ModelParameters};
pub use light::LightState;
pub use planner::{
    Plan, PlannedHorizon, PlannedState, Planner, PlannerConfig, PlanningMode, PlanningResult,
    MAX_HORIZON,
};
pub use trajectory::{AdvanceMode, ReferenceTrajectory, TrajectoryCursor, TrajectoryIndex, Waypoint};
pub use validator::{
    KinematicLimits, KinematicSample, KinematicValidator, ValidationReport, Violation,
    ViolationKind,
};

pub mod context;
mod error;
mod follower;
mod light;
pub mod math;
mod planner;
mod trajectory;
mod validator;
