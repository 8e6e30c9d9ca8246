use std::fmt;

use crate::station::StationID;

use super::WireError;

pub const TOPIC_ROOT: &str = "meteo/";
/// what meteod subscribes to unless configured otherwise
pub const SUBSCRIBE_ALL: &str = "meteo/#";

/// Addressing of a bus message.
///
/// Recognized forms (anything may precede the `meteo/` root):
/// - `meteo/<id>` and `meteo/meteo/<id>` - weather readings
/// - `meteo/lightning/<id>` - lightning strikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Weather(StationID),
    Lightning(StationID),
}

impl Topic {
    pub fn parse(topic: &str) -> Result<Self, WireError> {
        let Some(at) = topic.find(TOPIC_ROOT) else {
            return Err(WireError::NotMeteo(topic.to_string()));
        };
        let rest = &topic[at + TOPIC_ROOT.len()..];
        let station_id = |id: &str| match id.parse::<StationID>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(WireError::StationId(topic.to_string())),
        };
        if let Some(id) = rest.strip_prefix("lightning/") {
            Ok(Self::Lightning(station_id(id)?))
        } else if let Some(id) = rest.strip_prefix("meteo/") {
            Ok(Self::Weather(station_id(id)?))
        } else {
            Ok(Self::Weather(station_id(rest)?))
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weather(id) => write!(f, "{TOPIC_ROOT}{id}"),
            Self::Lightning(id) => write!(f, "{TOPIC_ROOT}lightning/{id}"),
        }
    }
}
