//! Per-tick inputs supplied by the simulation host.

use crate::light::LightState;
use crate::PlanError;
use serde::de::{DeserializeOwned, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kinematic state of the AV at a tick.
///
/// Speeds and accelerations are expressed in the vehicle's own frame,
/// longitudinal along its heading and lateral to its left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AvState {
    /// World x coordinate in m.
    pub x: f64,
    /// World y coordinate in m.
    pub y: f64,
    /// Heading in radians.
    pub orientation: f64,
    /// Longitudinal speed in m/s.
    pub speed_long: f64,
    /// Lateral speed in m/s.
    #[serde(default)]
    pub speed_lat: f64,
    /// Longitudinal acceleration in m/s^2.
    #[serde(default)]
    pub accel_long: f64,
    /// Lateral acceleration in m/s^2.
    #[serde(default)]
    pub accel_lat: f64,
}

impl AvState {
    /// The AV's pose.
    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            orientation: self.orientation,
        }
    }
}

/// A position and heading in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading in radians.
    pub orientation: f64,
}

/// The vehicle the AV is following.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeadingVehicle {
    /// Position along the AV's direction of travel, in the same frame as [AvState::x].
    pub x: f64,
    /// Longitudinal speed in m/s.
    pub speed_long: f64,
}

/// A read-only snapshot of the AV's surroundings at a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContextInfo {
    /// The state of the next traffic light.
    pub light: LightState,
    /// The distance to the next traffic light's stop line in m.
    pub distance_to_light: f64,
    /// The vehicle ahead, if there is one.
    pub leading_vehicle: Option<LeadingVehicle>,
}

impl ContextInfo {
    /// Creates a context without a leading vehicle.
    pub fn new(light: LightState, distance_to_light: f64) -> Self {
        Self {
            light,
            distance_to_light,
            leading_vehicle: None,
        }
    }

    /// Sets the leading vehicle.
    pub fn with_leader(mut self, x: f64, speed_long: f64) -> Self {
        self.leading_vehicle = Some(LeadingVehicle { x, speed_long });
        self
    }

    /// Extracts the context from a host step record.
    ///
    /// Fails with [PlanError::InvalidContext] if the traffic light information is missing
    /// or malformed, or if the selected leader lacks a position or speed.
    pub fn from_step_info(step_info: &StepInfo) -> Result<Self, PlanError> {
        let tls = &step_info.tls_info;
        let light = tls
            .next_tls_state
            .as_deref()
            .ok_or_else(|| PlanError::InvalidContext("missing or malformed next_tls_state".into()))?
            .parse::<LightState>()
            .map_err(PlanError::InvalidContext)?;
        let distance_to_light = tls
            .distance_to_next_tls
            .filter(|d| !d.is_nan())
            .ok_or_else(|| {
                PlanError::InvalidContext("missing or malformed distance_to_next_tls".into())
            })?;

        let leading_vehicle = match select_leader(&step_info.av_context_info) {
            Some((id, info)) => match (info.x, info.speed_long) {
                (Some(x), Some(speed_long)) if x.is_finite() && speed_long.is_finite() => {
                    Some(LeadingVehicle { x, speed_long })
                }
                _ => {
                    return Err(PlanError::InvalidContext(format!(
                        "leading vehicle {} lacks a position or speed",
                        id
                    )))
                }
            },
            None => None,
        };

        Ok(Self {
            light,
            distance_to_light,
            leading_vehicle,
        })
    }
}

/// A step record as supplied by the simulation host each tick.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StepInfo {
    pub av_info: AvState,
    #[serde(default)]
    pub tls_info: TlsInfo,
    /// The neighbouring vehicles, in the order the host listed them.
    #[serde(default, deserialize_with = "ordered_map")]
    pub av_context_info: Vec<(String, NeighbourInfo)>,
}

impl StepInfo {
    /// Parses a step record from JSON.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The host's traffic light section.
///
/// The state is kept as the raw code and a field of the wrong type reads as absent,
/// so a malformed section is reported as an invalid context rather than a parse failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TlsInfo {
    #[serde(default, deserialize_with = "lenient")]
    pub next_tls_state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub distance_to_next_tls: Option<f64>,
}

/// The state of a neighbouring vehicle.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NeighbourInfo {
    pub x: Option<f64>,
    pub speed_long: Option<f64>,
    #[serde(default)]
    pub leading_info: LeadingInfo,
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct LeadingInfo {
    #[serde(default)]
    pub is_leading_cav: bool,
}

/// Selects the leading vehicle: the first neighbour flagged as leading, in listing order.
pub fn select_leader(neighbours: &[(String, NeighbourInfo)]) -> Option<(&str, &NeighbourInfo)> {
    neighbours
        .iter()
        .find(|(_, info)| info.leading_info.is_leading_cav)
        .map(|(id, info)| (id.as_str(), info))
}

/// Deserializes a value, reading one of the wrong type as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Deserializes a JSON object into a list of entries, preserving the order of its keys.
fn ordered_map<'de, D>(deserializer: D) -> Result<Vec<(String, NeighbourInfo)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedMap;

    impl<'de> Visitor<'de> for OrderedMap {
        type Value = Vec<(String, NeighbourInfo)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of vehicle ids to vehicle states")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(vec![])
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(OrderedMap)
}

#[cfg(test)]
mod test {
    use super::*;

    const STEP: &str = r#"{
        "av_info": {"x": 10.0, "y": 2.0, "orientation": 0.0, "speed_long": 8.0,
                    "speed_lat": 0.0, "accel_long": 0.1, "accel_lat": 0.0},
        "tls_info": {"next_tls_state": "r", "distance_to_next_tls": 42.5},
        "av_context_info": {
            "veh_9": {"x": 50.0, "speed_long": 3.0, "leading_info": {"is_leading_cav": false}},
            "veh_7": {"x": 30.0, "speed_long": 6.0, "leading_info": {"is_leading_cav": true}},
            "veh_1": {"x": 20.0, "speed_long": 5.0, "leading_info": {"is_leading_cav": true}}
        }
    }"#;

    #[test]
    fn parse_step_info() {
        let step = StepInfo::from_json(STEP).unwrap();
        assert_eq!(step.av_info.x, 10.0);
        assert_eq!(step.av_info.accel_long, 0.1);
        let ids: Vec<_> = step.av_context_info.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["veh_9", "veh_7", "veh_1"]);

        let context = ContextInfo::from_step_info(&step).unwrap();
        assert_eq!(context.light, LightState::RedMinor);
        assert_eq!(context.distance_to_light, 42.5);
        assert_eq!(
            context.leading_vehicle,
            Some(LeadingVehicle {
                x: 30.0,
                speed_long: 6.0
            })
        );
    }

    #[test]
    fn first_flagged_leader_wins() {
        let flagged = |flag| NeighbourInfo {
            leading_info: LeadingInfo {
                is_leading_cav: flag,
            },
            ..Default::default()
        };
        let neighbours = vec![
            ("a".to_string(), flagged(false)),
            ("b".to_string(), flagged(true)),
            ("c".to_string(), flagged(true)),
        ];
        assert_eq!(select_leader(&neighbours).map(|(id, _)| id), Some("b"));
        assert!(select_leader(&neighbours[..1]).is_none());
        assert!(select_leader(&[]).is_none());
    }

    #[test]
    fn no_neighbours() {
        let json = r#"{"av_info": {"x": 0, "y": 0, "orientation": 0, "speed_long": 0},
                       "tls_info": {"next_tls_state": "G", "distance_to_next_tls": 100},
                       "av_context_info": null}"#;
        let step = StepInfo::from_json(json).unwrap();
        let context = ContextInfo::from_step_info(&step).unwrap();
        assert!(context.leading_vehicle.is_none());
    }

    #[test]
    fn mistyped_light_fields() {
        let json = r#"{"av_info": {"x": 0, "y": 0, "orientation": 0, "speed_long": 5},
                       "tls_info": {"next_tls_state": 3, "distance_to_next_tls": "far"}}"#;
        let step = StepInfo::from_json(json).unwrap();
        assert!(step.tls_info.next_tls_state.is_none());
        assert!(step.tls_info.distance_to_next_tls.is_none());
        assert!(matches!(
            ContextInfo::from_step_info(&step),
            Err(PlanError::InvalidContext(_))
        ));
    }

    #[test]
    fn invalid_contexts() {
        let mut step = StepInfo::from_json(STEP).unwrap();
        step.tls_info.next_tls_state = Some("X".into());
        assert!(matches!(
            ContextInfo::from_step_info(&step),
            Err(PlanError::InvalidContext(_))
        ));

        let mut step = StepInfo::from_json(STEP).unwrap();
        step.tls_info.distance_to_next_tls = None;
        assert!(matches!(
            ContextInfo::from_step_info(&step),
            Err(PlanError::InvalidContext(_))
        ));

        let mut step = StepInfo::from_json(STEP).unwrap();
        step.av_context_info[1].1.speed_long = None;
        assert!(matches!(
            ContextInfo::from_step_info(&step),
            Err(PlanError::InvalidContext(_))
        ));
    }
}
