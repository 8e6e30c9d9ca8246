//! MQTT transport: feeds subscribed messages into the router queue and
//! publishes what the [`BusPublisher`](crate::consumer::bus::BusPublisher) hands it.

use std::{fmt, time::Duration};

use anyhow::Result;
use flume::{Receiver, Sender};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use stratus::wire::{LightningMessage, Topic, WeatherMessage, WireError};
use tokio::{select, time::sleep};

use crate::{
    config::Mqtt,
    route::{BusMessage, Inbound},
    shutdown::ShutdownHandle,
};

pub const DEFAULT_PORT: u16 = 1883;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A message waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker address in the form `[user[:password]@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Remote {
    pub fn parse(remote: &str) -> Result<Self> {
        let (credentials, address) = match remote.split_once('@') {
            Some((credentials, address)) => (Some(credentials), address),
            None => (None, remote),
        };
        let (username, password) = match credentials.map(|c| c.split_once(':')) {
            None => (None, None),
            Some(None) => (credentials.map(str::to_string), None),
            Some(Some((user, pass))) => (Some(user.to_string()), Some(pass.to_string())),
        };
        let (host, port) = match address.split_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|e| anyhow!("invalid port {port:?} in MQTT remote: {e}"))?,
            ),
            None => (address, DEFAULT_PORT),
        };
        if host.is_empty() {
            bail!("MQTT remote {remote:?} has no host");
        }
        Ok(Self {
            host: host.to_string(),
            port,
            username: username.filter(|u| !u.is_empty()),
            password: password.filter(|p| !p.is_empty()),
        })
    }

    pub fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        options
    }
}

// never shows the password
impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(username) = &self.username {
            write!(f, "{username}@")?;
        }
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Turns a received publish into a router message. Empty payloads are ignored.
pub fn decode(topic: &str, payload: &[u8]) -> Result<Option<BusMessage>, WireError> {
    if payload.is_empty() {
        return Ok(None);
    }
    Ok(Some(match Topic::parse(topic)? {
        Topic::Weather(station) => BusMessage::Weather(WeatherMessage::decode(station, payload)?),
        Topic::Lightning(station) => {
            BusMessage::Lightning(LightningMessage::decode(station, payload)?)
        }
    }))
}

pub async fn bus_task(
    cfg: Mqtt,
    inbound: Sender<Inbound>,
    outbound: Receiver<Outbound>,
    mut handle: ShutdownHandle,
) -> Result<()> {
    let remote = Remote::parse(&cfg.remote)?;
    info!("Attaching MQTT: {remote} ...");
    let (client, mut eventloop) = AsyncClient::new(remote.options(&cfg.client_id), 64);
    let mut backoff = MIN_BACKOFF;
    loop {
        select! {
            _ = handle.wait_for_shutdown() => {
                break;
            }
            recv = outbound.recv_async() => {
                let Ok(Outbound { topic, payload }) = recv else {
                    debug!("Publish queue closed");
                    break;
                };
                // publishing is best effort, ingestion does not wait on the broker
                if let Err(e) = client.try_publish(topic, QoS::AtMostOnce, false, payload) {
                    warn!("Error publishing to MQTT: {e}");
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff = MIN_BACKOFF;
                    // sessions are clean, subscribe again on every connect
                    if let Err(e) = client.try_subscribe(cfg.topic.as_str(), QoS::AtMostOnce) {
                        error!("Error subscribing to MQTT: {e}");
                    } else {
                        info!("MQTT: {remote} attached (listening to topic '{}')", cfg.topic);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match decode(&publish.topic, &publish.payload) {
                        Ok(Some(msg)) => inbound
                            .send_async(Inbound::Bus(msg))
                            .await
                            .map_err(|_| anyhow!("ingestion queue closed"))?,
                        Ok(None) => {}
                        Err(e) => warn!("MQTT illegal packet on {:?}: {e}", publish.topic),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e} (retrying in {backoff:?})");
                    select! {
                        _ = handle.wait_for_shutdown() => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
    let _ = client.try_disconnect();
    Ok(())
}
