//! Suppression of our own publications coming back over the bus subscription.

use std::sync::{Arc, Mutex};

use stratus::wire::WeatherMessage;

/// Holds the last message meteod itself published. Cloning shares the snapshot.
#[derive(Debug, Clone, Default)]
pub struct EchoSuppressor {
    last: Arc<Mutex<Option<WeatherMessage>>>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// replace the snapshot, called right before a message is handed to the bus
    pub fn remember(&self, message: WeatherMessage) {
        // a poisoned lock still holds a valid snapshot
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(message);
    }

    /// `true` when `message` equals the last published one in every field
    pub fn is_echo(&self, message: &WeatherMessage) -> bool {
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.as_ref() == Some(message)
    }
}
