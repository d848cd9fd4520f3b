use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The state of the next traffic light movement on the AV's route,
/// using the single-letter signal codes of the simulation host.
///
/// Upper case codes have priority over conflicting movements,
/// lower case codes do not.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum LightState {
    #[serde(rename = "R")]
    Red,
    #[serde(rename = "r")]
    RedMinor,
    #[serde(rename = "Y")]
    Amber,
    #[serde(rename = "y")]
    AmberMinor,
    #[serde(rename = "G")]
    Green,
    #[serde(rename = "g")]
    GreenMinor,
}

impl LightState {
    /// Whether a vehicle approaching the light within the conflict distance must stop.
    pub fn requires_stop(self) -> bool {
        use LightState::*;
        matches!(self, Red | RedMinor | Amber | AmberMinor)
    }

    /// The host's signal code for this state.
    pub fn code(self) -> char {
        use LightState::*;
        match self {
            Red => 'R',
            RedMinor => 'r',
            Amber => 'Y',
            AmberMinor => 'y',
            Green => 'G',
            GreenMinor => 'g',
        }
    }
}

impl FromStr for LightState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use LightState::*;
        match s {
            "R" => Ok(Red),
            "r" => Ok(RedMinor),
            "Y" => Ok(Amber),
            "y" => Ok(AmberMinor),
            "G" => Ok(Green),
            "g" => Ok(GreenMinor),
            other => Err(format!("unknown traffic light state {:?}", other)),
        }
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
