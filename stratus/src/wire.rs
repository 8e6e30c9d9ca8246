//! Payloads and addressing used on the HTTP push endpoint and on the message bus.
//!
//! Everything here is JSON. Decoding never panics on unexpected input, it
//! returns a [`WireError`] which transports turn into a 4xx (HTTP) or a
//! dropped message (bus).

pub mod bus;
pub mod push;
pub mod topic;

#[cfg(test)]
mod test;

pub use bus::{LightningMessage, WeatherMessage};
pub use push::{PushPayload, RainPushPayload};
pub use topic::Topic;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("topic {0:?} is not below `meteo/`")]
    NotMeteo(String),
    #[error("topic {0:?} does not end in a valid station id")]
    StationId(String),
}

/// Source timestamps of zero or below mean "not provided"
pub(crate) fn provided(timestamp: Option<i64>) -> Option<i64> {
    timestamp.filter(|ts| *ts > 0)
}
