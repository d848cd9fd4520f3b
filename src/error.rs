//! Error types for the planner.

/// Errors raised while loading inputs or planning a tick.
///
/// Validator findings are not errors, see [crate::Violation].
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Required context fields are missing or malformed.
    /// The caller should fall back to a safe command, e.g. holding the previous one.
    #[error("invalid context: {0}")]
    InvalidContext(String),
    /// The following gap is non-positive or numerically degenerate.
    /// The caller should apply emergency deceleration.
    #[error("gap violation: following gap of {gap} m")]
    GapViolation { gap: f64 },
    /// A reference trajectory needs at least one waypoint.
    #[error("reference trajectory is empty")]
    EmptyTrajectory,
    /// A reference trajectory record could not be parsed.
    #[error("invalid trajectory record on line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },
    /// The planner configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlanError {
    /// Whether the error is a degenerate following gap.
    pub fn is_gap_violation(&self) -> bool {
        matches!(self, PlanError::GapViolation { .. })
    }
}
