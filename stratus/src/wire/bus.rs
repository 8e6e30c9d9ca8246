//! Bus payloads for `meteo/<id>` and `meteo/lightning/<id>`
//!
//! The station id is always taken from the topic. Any field missing from a
//! payload decodes as zero (or the empty name), which is also how the echo of
//! a message published by meteod itself compares equal to what was sent.

use crate::station::{Lightning, Reading, StationID};

use super::WireError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherMessage {
    pub timestamp: i64,
    #[serde(rename = "node")]
    pub station: StationID,
    pub name: String,
    pub t: f32,
    pub hum: f32,
    pub p: f32,
}

// stations publish whatever their firmware produces, numbers may come as floats
#[derive(Deserialize)]
struct RawWeather {
    timestamp: Option<f64>,
    name: Option<String>,
    t: Option<f32>,
    hum: Option<f32>,
    p: Option<f32>,
}

impl WeatherMessage {
    pub fn decode(station: StationID, payload: &[u8]) -> Result<Self, WireError> {
        let raw: RawWeather = serde_json::from_slice(payload)?;
        Ok(Self {
            timestamp: raw.timestamp.map(|ts| ts as i64).unwrap_or(0),
            station,
            name: raw.name.unwrap_or_default(),
            t: raw.t.unwrap_or(0.0),
            hum: raw.hum.unwrap_or(0.0),
            p: raw.p.unwrap_or(0.0),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_reading(reading: &Reading, name: impl Into<String>) -> Self {
        Self {
            timestamp: reading.timestamp,
            station: reading.station,
            name: name.into(),
            t: reading.temperature,
            hum: reading.humidity,
            p: reading.pressure,
        }
    }

    /// the timestamp sent by the station, `None` when it did not send one
    pub fn timestamp(&self) -> Option<i64> {
        super::provided(Some(self.timestamp))
    }

    pub fn to_reading(&self, timestamp: i64) -> Reading {
        Reading {
            station: self.station,
            timestamp,
            temperature: self.t,
            humidity: self.hum,
            pressure: self.p,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightningMessage {
    pub timestamp: i64,
    #[serde(rename = "node")]
    pub station: StationID,
    pub distance: f32,
}

#[derive(Deserialize)]
struct RawLightning {
    timestamp: Option<f64>,
    distance: Option<f32>,
}

impl LightningMessage {
    pub fn decode(station: StationID, payload: &[u8]) -> Result<Self, WireError> {
        let raw: RawLightning = serde_json::from_slice(payload)?;
        Ok(Self {
            timestamp: raw.timestamp.map(|ts| ts as i64).unwrap_or(0),
            station,
            distance: raw.distance.unwrap_or(0.0),
        })
    }

    pub fn timestamp(&self) -> Option<i64> {
        super::provided(Some(self.timestamp))
    }

    pub fn to_lightning(&self, timestamp: i64) -> Lightning {
        Lightning {
            station: self.station,
            timestamp,
            distance: self.distance,
        }
    }
}
