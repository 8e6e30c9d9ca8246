//! Types shared between meteod and anything that talks to it.
//!
//! `station` holds the persisted data model, `wire` holds what travels over
//! HTTP and the message bus (payloads as JSON, topics as `meteo/...` strings).

#[macro_use]
extern crate serde;
#[macro_use]
extern crate thiserror;

pub mod station;
pub mod wire;

pub use station::{
    GaugeID, Lightning, RainGauge, RainReading, Reading, Station, StationID, Token,
};
