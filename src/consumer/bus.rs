use anyhow::Result;
use flume::Sender;
use stratus::wire::{Topic, WeatherMessage};

use crate::{bus::Outbound, echo::EchoSuppressor};

use super::{Record, RecordConsumer};

/// Republishes persisted readings on `meteo/<id>`.
pub struct BusPublisher {
    echo: EchoSuppressor,
    outbound: Sender<Outbound>,
}

impl BusPublisher {
    pub fn new(echo: EchoSuppressor, outbound: Sender<Outbound>) -> Self {
        Self { echo, outbound }
    }
}

#[async_trait]
impl RecordConsumer for BusPublisher {
    async fn handle(&mut self, record: &Record) -> Result<()> {
        let reading = &record.reading;
        let message = WeatherMessage::from_reading(reading, record.station_name.clone());
        let payload = message.encode()?;
        // the subscription sees this message again, remember it before it can arrive
        self.echo.remember(message);
        self.outbound
            .send_async(Outbound {
                topic: Topic::Weather(reading.station).to_string(),
                payload,
            })
            .await?;
        Ok(())
    }
}
