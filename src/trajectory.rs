//! Reference trajectories and the cursor used to replay them.

use crate::math::{wrap_angle, Point2d};
use crate::PlanError;
use cgmath::MetricSpace;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

mod loader;

/// A single point on a reference trajectory.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, within (-π, π].
    pub orientation: f64,
    /// Speed in m/s.
    pub velocity: f64,
}

impl Waypoint {
    /// Creates a waypoint, normalising the orientation into (-π, π].
    pub fn new(x: f64, y: f64, orientation: f64, velocity: f64) -> Self {
        Self {
            x,
            y,
            orientation: wrap_angle(orientation),
            velocity,
        }
    }

    /// The waypoint's position.
    pub fn position(&self) -> Point2d {
        Point2d::new(self.x, self.y)
    }
}

/// An ordered, non-empty sequence of waypoints, fixed once loaded.
#[derive(Clone, Debug)]
pub struct ReferenceTrajectory {
    waypoints: Vec<Waypoint>,
}

impl ReferenceTrajectory {
    /// Creates a trajectory from its waypoints.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, PlanError> {
        if waypoints.is_empty() {
            return Err(PlanError::EmptyTrajectory);
        }
        Ok(Self { waypoints })
    }

    /// The number of waypoints.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always `false`; a trajectory holds at least one waypoint.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The index of the final waypoint.
    pub fn last_index(&self) -> usize {
        self.waypoints.len() - 1
    }

    /// Gets the waypoint at `idx`, clamped to the final waypoint.
    pub fn get(&self, idx: usize) -> Waypoint {
        self.waypoints[usize::min(idx, self.last_index())]
    }

    /// The waypoints in order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Converts every waypoint's position with `f`, e.g. from the file's native
    /// coordinate system into the simulation's.
    pub fn map_positions(mut self, mut f: impl FnMut(Point2d) -> Point2d) -> Self {
        for waypoint in &mut self.waypoints {
            let pos = f(waypoint.position());
            waypoint.x = pos.x;
            waypoint.y = pos.y;
        }
        self
    }

    /// Finds the waypoint closest to `pos`. Ties resolve to the lowest index.
    pub fn nearest(&self, pos: Point2d) -> usize {
        self.waypoints
            .iter()
            .map(|waypoint| waypoint.position().distance2(pos))
            .position_min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0)
    }
}

/// How a [TrajectoryIndex] chooses the next waypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Serve waypoints one after another, ignoring the vehicle's position.
    #[default]
    Monotonic,
    /// Jump to the waypoint nearest the vehicle, but always move forward by at least one.
    Nearest,
}

/// A position in a [ReferenceTrajectory] which never moves backwards
/// and never passes the final waypoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrajectoryCursor {
    index: usize,
}

impl TrajectoryCursor {
    /// A cursor at the first waypoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the waypoint at the cursor, then steps forward by one,
    /// holding at the final waypoint.
    pub fn advance_monotonic(&mut self, trajectory: &ReferenceTrajectory) -> Waypoint {
        let waypoint = trajectory.get(self.index);
        self.index = usize::min(self.index + 1, trajectory.last_index());
        waypoint
    }

    /// Moves the cursor to the waypoint nearest `pos`, or one past the current index
    /// if that is further along, then returns the waypoint at the new cursor.
    ///
    /// A noisy position reading can therefore advance the cursor even when the
    /// vehicle has not moved.
    pub fn advance_nearest(&mut self, trajectory: &ReferenceTrajectory, pos: Point2d) -> Waypoint {
        let nearest = trajectory.nearest(pos);
        let next = usize::max(self.index + 1, nearest);
        if nearest > self.index + 1 {
            debug!("trajectory cursor jumped from {} to {}", self.index, nearest);
        }
        self.index = usize::min(next, trajectory.last_index());
        trajectory.get(self.index)
    }
}

/// A reference trajectory together with the cursor replaying it.
#[derive(Clone, Debug)]
pub struct TrajectoryIndex {
    trajectory: ReferenceTrajectory,
    cursor: TrajectoryCursor,
    mode: AdvanceMode,
    /// The index of the waypoint most recently returned by `advance`.
    served: usize,
}

impl TrajectoryIndex {
    /// Creates an index positioned at the first waypoint.
    pub fn new(trajectory: ReferenceTrajectory, mode: AdvanceMode) -> Self {
        Self {
            trajectory,
            cursor: TrajectoryCursor::new(),
            mode,
            served: 0,
        }
    }

    /// Gets the next waypoint to steer towards, given the vehicle's current position.
    ///
    /// Once the trajectory is exhausted, this keeps returning the final waypoint.
    pub fn advance(&mut self, current_x: f64, current_y: f64) -> Waypoint {
        match self.mode {
            AdvanceMode::Monotonic => {
                self.served = self.cursor.index();
                self.cursor.advance_monotonic(&self.trajectory)
            }
            AdvanceMode::Nearest => {
                let pos = Point2d::new(current_x, current_y);
                let waypoint = self.cursor.advance_nearest(&self.trajectory, pos);
                self.served = self.cursor.index();
                waypoint
            }
        }
    }

    /// The most recently served waypoint and those after it, at most `count` in total.
    pub fn upcoming(&self, count: usize) -> &[Waypoint] {
        let start = self.served;
        let end = usize::min(start + count, self.trajectory.len());
        &self.trajectory.waypoints()[start..end]
    }

    /// The cursor.
    pub fn cursor(&self) -> TrajectoryCursor {
        self.cursor
    }

    /// The advance mode.
    pub fn mode(&self) -> AdvanceMode {
        self.mode
    }

    /// The underlying trajectory.
    pub fn trajectory(&self) -> &ReferenceTrajectory {
        &self.trajectory
    }
}
