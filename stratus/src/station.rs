//! stations, rain gauges and what they record

/// Station ids are positive; `0` is never assigned.
pub type StationID = i64;
/// Rain gauges (ombrometers) have their own id space.
pub type GaugeID = i64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationID,
    pub name: String,
    pub location: String,
    pub description: String,
}

impl Station {
    /// A station that has not been assigned an id yet (the store picks `max + 1`)
    pub fn unassigned(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RainGauge {
    pub id: GaugeID,
    pub name: String,
    pub location: String,
    pub description: String,
}

/// One weather measurement. Pressure is in Pa once it has been stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station: StationID,
    /// unix seconds
    pub timestamp: i64,
    /// degree celsius
    pub temperature: f32,
    /// % rel
    pub humidity: f32,
    /// Pa
    pub pressure: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RainReading {
    pub gauge: GaugeID,
    pub timestamp: i64,
    pub millimeters: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Lightning {
    pub station: StationID,
    pub timestamp: i64,
    /// km
    pub distance: f32,
}

/// Opaque credential that lets a client push readings for `station`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub station: StationID,
}
