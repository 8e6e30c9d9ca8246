//! Mapping of inbound readings to station ids.
//!
//! The push endpoint authenticates with a token, which either resolves to an
//! existing station or is denied. The bus trusts the id in the topic and
//! provisions the station on first sight.

use stratus::{GaugeID, StationID};

use crate::store::{self, EntityStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denied {
    #[error("empty token")]
    EmptyToken,
    #[error("unknown token")]
    UnknownToken,
    /// the token maps to an id that is not positive or has no station row
    #[error("token maps to missing station {0}")]
    NoStation(StationID),
    #[error("no rain gauge {0}")]
    NoGauge(GaugeID),
}

#[derive(Clone)]
pub struct IdentityResolver {
    store: EntityStore,
}

impl IdentityResolver {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Storage failures are errors, everything else that does not resolve is a denial.
    pub fn resolve_token(&self, token: &str) -> store::Result<Result<StationID, Denied>> {
        if token.is_empty() {
            return Ok(Err(Denied::EmptyToken));
        }
        let Some(token) = self.store.get_token(token)? else {
            return Ok(Err(Denied::UnknownToken));
        };
        if token.station <= 0 || !self.store.station_exists(token.station)? {
            return Ok(Err(Denied::NoStation(token.station)));
        }
        Ok(Ok(token.station))
    }

    /// A token for any existing station may push to any existing rain gauge.
    pub fn authorize_gauge(
        &self,
        token: &str,
        gauge: GaugeID,
    ) -> store::Result<Result<StationID, Denied>> {
        let station = match self.resolve_token(token)? {
            Ok(station) => station,
            denied => return Ok(denied),
        };
        if self.store.get_gauge(gauge)?.is_none() {
            return Ok(Err(Denied::NoGauge(gauge)));
        }
        Ok(Ok(station))
    }

    /// Make sure station `id` exists, creating it with `name` if not.
    /// Returns `true` when it was created by this call.
    pub fn provision(&self, id: StationID, name: &str) -> store::Result<bool> {
        let created = self.store.ensure_station(id, name)?;
        if created {
            info!("Provisioned new station {id} ({name:?})");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod test {
    use stratus::{RainGauge, Station, Token};

    use super::{Denied, IdentityResolver};
    use crate::store::EntityStore;

    fn setup() -> (EntityStore, IdentityResolver) {
        let store = EntityStore::open_in_memory().unwrap();
        let resolver = IdentityResolver::new(store.clone());
        (store, resolver)
    }

    #[test]
    fn resolves_known_token() {
        let (store, resolver) = setup();
        let id = store.create_station(&Station::unassigned("roof")).unwrap();
        store
            .insert_token(&Token {
                token: "abc".into(),
                station: id,
            })
            .unwrap();
        assert_eq!(resolver.resolve_token("abc").unwrap(), Ok(id));
    }

    #[test]
    fn denials() {
        let (store, resolver) = setup();
        assert_eq!(resolver.resolve_token("").unwrap(), Err(Denied::EmptyToken));
        assert_eq!(
            resolver.resolve_token("nope").unwrap(),
            Err(Denied::UnknownToken)
        );
        for (token, station) in [("zero", 0), ("negative", -4), ("dangling", 77)] {
            store
                .insert_token(&Token {
                    token: token.into(),
                    station,
                })
                .unwrap();
            assert_eq!(
                resolver.resolve_token(token).unwrap(),
                Err(Denied::NoStation(station))
            );
        }
    }

    #[test]
    fn gauge_needs_token_and_gauge() {
        let (store, resolver) = setup();
        let station = store.create_station(&Station::unassigned("roof")).unwrap();
        store
            .insert_token(&Token {
                token: "abc".into(),
                station,
            })
            .unwrap();
        let gauge = store
            .create_gauge(&RainGauge {
                name: "bucket".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(resolver.authorize_gauge("abc", gauge).unwrap(), Ok(station));
        assert_eq!(
            resolver.authorize_gauge("abc", gauge + 1).unwrap(),
            Err(Denied::NoGauge(gauge + 1))
        );
        assert_eq!(
            resolver.authorize_gauge("xyz", gauge).unwrap(),
            Err(Denied::UnknownToken)
        );
    }

    #[test]
    fn denial_messages() {
        assert_eq!(Denied::EmptyToken.to_string(), "empty token");
        assert_eq!(
            Denied::NoStation(9).to_string(),
            "token maps to missing station 9"
        );
        assert_eq!(Denied::NoGauge(2).to_string(), "no rain gauge 2");
    }

    #[test]
    fn provision_once() {
        let (store, resolver) = setup();
        assert!(resolver.provision(12, "garden").unwrap());
        assert!(!resolver.provision(12, "renamed").unwrap());
        assert_eq!(store.get_station(12).unwrap().unwrap().name, "garden");
    }
}
