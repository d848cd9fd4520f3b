//! Reading reference trajectories from logged files.
//!
//! Only parsing happens here. Converting the logged positions into the
//! simulation's coordinate system is left to [ReferenceTrajectory::map_positions].

use super::{ReferenceTrajectory, Waypoint};
use crate::PlanError;
use serde::Deserialize;
use std::io::BufRead;

/// One logged vehicle state.
#[derive(Deserialize)]
struct TrajectoryRecord {
    x: f64,
    y: f64,
    orientation: f64,
    #[serde(alias = "velocity")]
    speed_long: f64,
}

/// A JSON line, either a bare record or one keyed by the AV's name.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordLine {
    Keyed {
        #[serde(rename = "CAV")]
        cav: TrajectoryRecord,
    },
    Bare(TrajectoryRecord),
}

impl TrajectoryRecord {
    fn into_waypoint(self) -> Waypoint {
        Waypoint::new(self.x, self.y, self.orientation, self.speed_long)
    }
}

impl ReferenceTrajectory {
    /// Reads a trajectory from CSV rows of `index, x, y, orientation, velocity`.
    ///
    /// A header row on the first line and blank lines are skipped.
    pub fn from_csv_reader(reader: impl BufRead) -> Result<Self, PlanError> {
        let mut waypoints = vec![];
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_csv_row(line) {
                Ok(waypoint) => waypoints.push(waypoint),
                Err(_) if idx == 0 && is_header(line) => continue,
                Err(reason) => {
                    return Err(PlanError::InvalidRecord {
                        line: idx + 1,
                        reason,
                    })
                }
            }
        }
        Self::new(waypoints)
    }

    /// Reads a trajectory from JSON lines, each holding `x`, `y`, `orientation`
    /// and `speed_long` either directly or under a `"CAV"` key.
    pub fn from_json_lines_reader(reader: impl BufRead) -> Result<Self, PlanError> {
        let mut waypoints = vec![];
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = match serde_json::from_str(&line) {
                Ok(RecordLine::Keyed { cav }) => cav,
                Ok(RecordLine::Bare(record)) => record,
                Err(err) => {
                    return Err(PlanError::InvalidRecord {
                        line: idx + 1,
                        reason: err.to_string(),
                    })
                }
            };
            waypoints.push(record.into_waypoint());
        }
        Self::new(waypoints)
    }
}

fn parse_csv_row(line: &str) -> Result<Waypoint, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }
    let field = |i: usize| {
        fields[i]
            .parse::<f64>()
            .map_err(|err| format!("field {} ({:?}): {}", i + 1, fields[i], err))
    };
    Ok(Waypoint::new(field(1)?, field(2)?, field(3)?, field(4)?))
}

/// A header names the columns, so none of the value columns hold a number.
fn is_header(line: &str) -> bool {
    line.split(',')
        .skip(1)
        .take(4)
        .all(|field| field.trim().parse::<f64>().is_err())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn csv() {
        let data = "t,x,y,heading,speed\n0,1.0,2.0,0.5,3.0\n\n1, 2.0, 2.5, 4.0, 3.5\n";
        let trajectory = ReferenceTrajectory::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.get(0), Waypoint::new(1.0, 2.0, 0.5, 3.0));
        assert_approx_eq!(trajectory.get(1).orientation, 4.0 - 2.0 * PI);
        assert_eq!(trajectory.get(1).velocity, 3.5);
    }

    #[test]
    fn csv_bad_row() {
        let data = "0,1.0,2.0,0.5,3.0\n1,2.0,oops,0.5,3.0\n";
        match ReferenceTrajectory::from_csv_reader(data.as_bytes()) {
            Err(PlanError::InvalidRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn csv_corrupt_first_row() {
        let data = "0,1.0,oops,0.5,3.0\n1,2.0,2.5,0.5,3.0\n";
        match ReferenceTrajectory::from_csv_reader(data.as_bytes()) {
            Err(PlanError::InvalidRecord { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected {:?}", other),
        }

        let data = "t,x,y,heading,speed\nt,x,y,heading,speed\n";
        match ReferenceTrajectory::from_csv_reader(data.as_bytes()) {
            Err(PlanError::InvalidRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn csv_empty() {
        assert!(matches!(
            ReferenceTrajectory::from_csv_reader("x,y\n".as_bytes()),
            Err(PlanError::EmptyTrajectory)
        ));
    }

    #[test]
    fn json_lines() {
        let data = concat!(
            r#"{"CAV": {"x": 1.0, "y": 2.0, "orientation": 0.1, "speed_long": 4.0, "speed_lat": 0.0}}"#,
            "\n",
            r#"{"x": 3.0, "y": 4.0, "orientation": 0.2, "speed_long": 5.0}"#,
            "\n"
        );
        let trajectory = ReferenceTrajectory::from_json_lines_reader(data.as_bytes()).unwrap();
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory.get(0).velocity, 4.0);
        assert_eq!(trajectory.get(1).x, 3.0);
    }

    #[test]
    fn json_lines_bad_record() {
        let data = "{\"x\": 1.0, \"y\": 2.0, \"orientation\": 0.1, \"speed_long\": 4.0}\n{\"x\": 1.0}\n";
        match ReferenceTrajectory::from_json_lines_reader(data.as_bytes()) {
            Err(PlanError::InvalidRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
