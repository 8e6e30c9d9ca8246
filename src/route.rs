//! The ingestion router: every inbound reading, whatever transport it came
//! over, ends up in [`Router`] and runs to one terminal [`Outcome`].
//!
//! A single [`router_task`] owns the router and is fed through a bounded
//! queue, so HTTP pushes and bus messages see one serialized view of the
//! store and of the last published reading.

use flume::Receiver;
use futures::future::join_all;
use stratus::{
    wire::{LightningMessage, PushPayload, RainPushPayload, WeatherMessage},
    GaugeID, RainReading, Reading,
};
use tokio::{select, sync::oneshot};

use crate::{
    config::{Ingest, Plausibility},
    consumer::{Record, RecordConsumer},
    echo::EchoSuppressor,
    filter::{self, Implausible},
    identity::{Denied, IdentityResolver},
    misc::unix_now,
    push::{PushEngine, PushPolicy},
    shutdown::ShutdownHandle,
    store::{self, EntityStore},
};


#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// identity resolution failed, nothing else was looked at
    Denied(Denied),
    /// accepted but not stored
    Implausible(Implausible),
    /// accepted, too close to the last stored reading to be worth a write
    Dropped,
    Persisted,
    /// our own publication, seen again on the subscription
    Echo,
    /// lightning strike that is already recorded
    Duplicate,
}

impl Outcome {
    /// Whether the sender is told "OK". Only a denial is not.
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Weather(WeatherMessage),
    Lightning(LightningMessage),
}

pub type Reply = oneshot::Sender<store::Result<Outcome>>;

#[derive(Debug)]
pub enum Inbound {
    Push {
        payload: PushPayload,
        reply: Reply,
    },
    Rain {
        gauge: GaugeID,
        payload: RainPushPayload,
        reply: Reply,
    },
    /// bus messages are fire and forget
    Bus(BusMessage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Push,
    Bus,
}

pub struct Router {
    store: EntityStore,
    identity: IdentityResolver,
    push: PushEngine,
    limits: Plausibility,
    echo: EchoSuppressor,
    consumers: Vec<Box<dyn RecordConsumer>>,
    clock: fn() -> i64,
    properly_dropped: bool,
}

impl Router {
    pub fn new(
        store: EntityStore,
        ingest: &Ingest,
        limits: Plausibility,
        echo: EchoSuppressor,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(store.clone()),
            push: PushEngine::new(store.clone(), PushPolicy::from(ingest)),
            store,
            limits,
            echo,
            consumers: vec![],
            clock: unix_now,
            properly_dropped: false,
        }
    }

    /// consumers are handed every reading persisted from a push
    pub fn with_consumer<C: RecordConsumer + 'static>(&mut self, consumer: C) -> &mut Self {
        self.consumers.push(Box::new(consumer));
        self
    }

    /// replace the wall clock (unix seconds)
    pub fn with_clock(&mut self, clock: fn() -> i64) -> &mut Self {
        self.clock = clock;
        self
    }

    /// Process one queued message, replying if the sender waits for it.
    pub async fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Push { payload, reply } => {
                let res = self.push(&payload).await;
                log_failure(&res);
                // the requester may have gone away, which is fine
                let _ = reply.send(res);
            }
            Inbound::Rain {
                gauge,
                payload,
                reply,
            } => {
                let res = self.rain(gauge, &payload).await;
                log_failure(&res);
                let _ = reply.send(res);
            }
            Inbound::Bus(message) => log_failure(&self.bus(&message).await),
        }
    }

    /// A weather reading pushed with a token.
    pub async fn push(&mut self, payload: &PushPayload) -> store::Result<Outcome> {
        let station = match self.identity.resolve_token(&payload.token)? {
            Ok(station) => station,
            Err(denied) => {
                debug!(t = payload.t, hum = payload.hum, p = payload.p, "DENIED: {denied}");
                return Ok(Outcome::Denied(denied));
            }
        };
        let reading = Reading {
            station,
            timestamp: payload.timestamp().unwrap_or_else(self.clock),
            temperature: payload.t,
            humidity: payload.hum,
            pressure: payload.p,
        };
        self.ingest(reading, Origin::Push).await
    }

    /// A rain amount pushed with a token. Rain is not coalesced.
    pub async fn rain(
        &mut self,
        gauge: GaugeID,
        payload: &RainPushPayload,
    ) -> store::Result<Outcome> {
        if let Err(denied) = self.identity.authorize_gauge(&payload.token, gauge)? {
            debug!(gauge, mm = payload.millimeters, "DENIED: {denied}");
            return Ok(Outcome::Denied(denied));
        }
        let reading = RainReading {
            gauge,
            timestamp: payload.timestamp().unwrap_or_else(self.clock),
            millimeters: payload.millimeters,
        };
        if let Err(why) = filter::check_rain(reading.millimeters) {
            info!(gauge, timestamp = reading.timestamp, "UNPLAUSIBLE: {why}");
            return Ok(Outcome::Implausible(why));
        }
        self.store.write_rain(&reading)?;
        info!(
            gauge,
            timestamp = reading.timestamp,
            mm = reading.millimeters,
            "PUSH rain"
        );
        Ok(Outcome::Persisted)
    }

    /// A message from the bus subscription. Unknown stations are created.
    pub async fn bus(&mut self, message: &BusMessage) -> store::Result<Outcome> {
        match message {
            BusMessage::Weather(message) => {
                if self.echo.is_echo(message) {
                    trace!(station = message.station, "ignoring our own publication");
                    return Ok(Outcome::Echo);
                }
                self.identity.provision(message.station, &message.name)?;
                let timestamp = message.timestamp().unwrap_or_else(self.clock);
                self.ingest(message.to_reading(timestamp), Origin::Bus)
                    .await
            }
            BusMessage::Lightning(message) => {
                self.identity.provision(message.station, "")?;
                let strike = message.to_lightning(message.timestamp().unwrap_or_else(self.clock));
                if !self.store.insert_lightning(&strike)? {
                    debug!(
                        station = strike.station,
                        timestamp = strike.timestamp,
                        "lightning already recorded"
                    );
                    return Ok(Outcome::Duplicate);
                }
                info!(
                    station = strike.station,
                    timestamp = strike.timestamp,
                    distance = strike.distance,
                    "Lightning!"
                );
                Ok(Outcome::Persisted)
            }
        }
    }

    // resolved reading -> filtered -> decided -> persisted | dropped
    async fn ingest(&mut self, reading: Reading, origin: Origin) -> store::Result<Outcome> {
        let reading = filter::normalize(reading, &self.limits);
        let Reading {
            station,
            timestamp,
            temperature: t,
            humidity: hum,
            pressure: p,
        } = reading;
        if let Err(why) = filter::check(&reading, &self.limits) {
            info!(station, timestamp, t, hum, p, "UNPLAUSIBLE: {why}");
            return Ok(Outcome::Implausible(why));
        }
        let decision = self.push.should_push(&reading, (self.clock)())?;
        if !decision.push() {
            debug!(station, timestamp, t, hum, p, "RECV");
            return Ok(Outcome::Dropped);
        }
        self.store.write_reading(&reading)?;
        info!(station, timestamp, t, hum, p, ?decision, "PUSH");
        if origin == Origin::Push {
            self.publish(reading).await;
        }
        Ok(Outcome::Persisted)
    }

    // the reading is already stored, failures here only cost the republish
    async fn publish(&mut self, reading: Reading) {
        let station_name = match self.store.get_station(reading.station) {
            Ok(station) => station.map(|s| s.name).unwrap_or_default(),
            Err(e) => {
                error!("Failed to look up station {}: {e}", reading.station);
                return;
            }
        };
        let record = Record {
            reading,
            station_name,
        };
        for res in join_all(self.consumers.iter_mut().map(|c| c.handle(&record))).await {
            if let Err(e) = res {
                error!("Error occured in consumer processing function: {e}");
            }
        }
    }

    /// call this to properly shutdown all consumers attached to this Router.
    ///
    /// this MUST be called, you may NOT just drop Router
    pub async fn close(mut self) {
        for c in self.consumers.drain(..) {
            c.close().await;
        }
        self.properly_dropped = true;
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if !self.properly_dropped {
            error!("Router may NOT be dropped except through `close`");
        }
    }
}

fn log_failure(res: &store::Result<Outcome>) {
    if let Err(e) = res {
        error!("Storage failure, reading dropped: {e}");
    }
}

/// Owns `router` until shutdown or until every sender of `inbound` is gone.
pub async fn router_task(
    mut router: Router,
    inbound: Receiver<Inbound>,
    mut handle: ShutdownHandle,
) -> anyhow::Result<()> {
    loop {
        select! {
            _ = handle.wait_for_shutdown() => {
                break;
            }
            recv = inbound.recv_async() => {
                let Ok(msg) = recv else {
                    debug!("All ingestion senders closed");
                    break;
                };
                router.handle(msg).await;
            }
        }
    }
    router.close().await;
    Ok(())
}
