//! HTTP push payloads (`POST /station/{id}` and `POST /ombrometer/{id}`)
//!
//! Field names are matched case-insensitively by the older gateways, so the
//! capitalized spellings are accepted as aliases.

use super::WireError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default, alias = "Token")]
    pub token: String,
    #[serde(default, alias = "Timestamp")]
    pub timestamp: Option<i64>,
    #[serde(default, alias = "T")]
    pub t: f32,
    #[serde(default, alias = "Hum")]
    pub hum: f32,
    #[serde(default, alias = "P")]
    pub p: f32,
}

impl PushPayload {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// the timestamp given by the sender, if it gave a usable one
    pub fn timestamp(&self) -> Option<i64> {
        super::provided(self.timestamp)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RainPushPayload {
    #[serde(default, alias = "Token")]
    pub token: String,
    #[serde(default, alias = "Timestamp")]
    pub timestamp: Option<i64>,
    #[serde(default, alias = "Millimeters")]
    pub millimeters: f32,
}

impl RainPushPayload {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn timestamp(&self) -> Option<i64> {
        super::provided(self.timestamp)
    }
}
