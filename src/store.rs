//! The entity store: stations, rain gauges, their reading series, lightning
//! strikes and access tokens, persisted in sqlite.
//!
//! All series live in one table per kind, keyed by `(station, timestamp)`, so
//! registering a station is a row insert and never a schema change. The
//! connection sits behind a mutex; every public method takes the lock for the
//! duration of its statements, which also serializes "create on first sight".

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{params, Connection, OptionalExtension, Row};
use stratus::{
    GaugeID, Lightning, RainGauge, RainReading, Reading, Station, StationID, Token,
};


/// row bound used when a query is made with a non-positive limit
pub const DEFAULT_QUERY_BOUND: i64 = 100_000;

// applied in order, `user_version` records how many have run
const MIGRATIONS: &[&str] = &[
    // language=sql
    r#"
    CREATE TABLE stations (
        id          INTEGER PRIMARY KEY,
        name        TEXT NOT NULL DEFAULT '',
        location    TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE readings (
        station     INTEGER NOT NULL REFERENCES stations (id),
        timestamp   INTEGER NOT NULL,
        temperature REAL NOT NULL,
        humidity    REAL NOT NULL,
        pressure    REAL NOT NULL,
        PRIMARY KEY (station, timestamp)
    ) WITHOUT ROWID;
    CREATE TABLE lightnings (
        station     INTEGER NOT NULL REFERENCES stations (id),
        timestamp   INTEGER NOT NULL,
        distance    REAL NOT NULL,
        PRIMARY KEY (station, timestamp)
    ) WITHOUT ROWID;
    CREATE INDEX lightnings_timestamp ON lightnings (timestamp DESC);
    CREATE TABLE tokens (
        token       TEXT PRIMARY KEY,
        station     INTEGER NOT NULL
    );
    CREATE INDEX tokens_station ON tokens (station);
    CREATE TABLE rain_gauges (
        id          INTEGER PRIMARY KEY,
        name        TEXT NOT NULL DEFAULT '',
        location    TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE rain_readings (
        gauge       INTEGER NOT NULL REFERENCES rain_gauges (id),
        timestamp   INTEGER NOT NULL,
        millimeters REAL NOT NULL,
        PRIMARY KEY (gauge, timestamp)
    ) WITHOUT ROWID;
    "#,
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: i64 },
    #[error("{kind} {id} does not exist")]
    NoSuch { kind: &'static str, id: i64 },
    #[error("database lock poisoned (a thread panicked while holding it)")]
    Poisoned,
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Shared handle to the database, cheap to clone.
#[derive(Clone)]
pub struct EntityStore {
    connection: Arc<Mutex<Connection>>,
}

impl EntityStore {
    #[instrument]
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(busy_timeout)?;
        Self::initialize(connection)
    }

    /// A private, empty database (used by tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(connection: Connection) -> Result<Self> {
        connection.pragma_update(None, "foreign_keys", true)?;
        let store = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let mut connection = self.connection()?;
        let user_version: i64 =
            connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = i as i64 + 1;
            if user_version < version {
                info!("Applying database migration #{version}");
                let tx = connection.transaction()?;
                tx.execute_batch(migration)?;
                tx.pragma_update(None, "user_version", version)?;
                tx.commit()?;
            }
        }
        Ok(())
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[cfg(test)]
impl EntityStore {
    /// run arbitrary statements on the shared connection
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }
}

fn next_id(connection: &Connection, table: &str) -> Result<i64> {
    Ok(connection.query_row(
        &format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {table}"),
        [],
        |row| row.get(0),
    )?)
}

fn exists(connection: &Connection, table: &str, id: i64) -> Result<bool> {
    Ok(connection
        .prepare_cached(&format!("SELECT 1 FROM {table} WHERE id = ?1"))?
        .query_row(params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn get_station(row: &Row) -> rusqlite::Result<Station> {
    Ok(Station {
        id: row.get("id")?,
        name: row.get("name")?,
        location: row.get("location")?,
        description: row.get("description")?,
    })
}

fn get_gauge(row: &Row) -> rusqlite::Result<RainGauge> {
    Ok(RainGauge {
        id: row.get("id")?,
        name: row.get("name")?,
        location: row.get("location")?,
        description: row.get("description")?,
    })
}

fn get_reading(row: &Row) -> rusqlite::Result<Reading> {
    Ok(Reading {
        station: row.get("station")?,
        timestamp: row.get("timestamp")?,
        temperature: row.get("temperature")?,
        humidity: row.get("humidity")?,
        pressure: row.get("pressure")?,
    })
}

fn get_rain(row: &Row) -> rusqlite::Result<RainReading> {
    Ok(RainReading {
        gauge: row.get("gauge")?,
        timestamp: row.get("timestamp")?,
        millimeters: row.get("millimeters")?,
    })
}

fn get_lightning(row: &Row) -> rusqlite::Result<Lightning> {
    Ok(Lightning {
        station: row.get("station")?,
        timestamp: row.get("timestamp")?,
        distance: row.get("distance")?,
    })
}

fn get_token(row: &Row) -> rusqlite::Result<Token> {
    Ok(Token {
        token: row.get("token")?,
        station: row.get("station")?,
    })
}

fn query_bounds(limit: i64, offset: i64) -> (i64, i64) {
    let limit = if limit <= 0 { DEFAULT_QUERY_BOUND } else { limit };
    (limit, offset.max(0))
}

/// Stations and their reading series.
impl EntityStore {
    /// Registers `station`, returning the id it was stored under.
    ///
    /// An id of `0` (or below) is replaced by the highest existing id + 1.
    pub fn create_station(&self, station: &Station) -> Result<StationID> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        let id = if station.id > 0 {
            if exists(&tx, "stations", station.id)? {
                return Err(StoreError::Duplicate {
                    kind: "station",
                    id: station.id,
                });
            }
            station.id
        } else {
            next_id(&tx, "stations")?
        };
        tx.prepare_cached(
            "INSERT INTO stations (id, name, location, description) VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![
            id,
            station.name,
            station.location,
            station.description
        ])?;
        tx.commit()?;
        Ok(id)
    }

    /// Creates station `id` named `name` unless it already exists.
    /// Returns whether it was created.
    pub fn ensure_station(&self, id: StationID, name: &str) -> Result<bool> {
        let connection = self.connection()?;
        let created = connection
            .prepare_cached("INSERT OR IGNORE INTO stations (id, name) VALUES (?1, ?2)")?
            .execute(params![id, name])?;
        Ok(created != 0)
    }

    pub fn get_station(&self, id: StationID) -> Result<Option<Station>> {
        Ok(self
            .connection()?
            .prepare_cached("SELECT * FROM stations WHERE id = ?1")?
            .query_row(params![id], get_station)
            .optional()?)
    }

    pub fn station_exists(&self, id: StationID) -> Result<bool> {
        exists(&*self.connection()?, "stations", id)
    }

    pub fn list_stations(&self) -> Result<Vec<Station>> {
        self.connection()?
            .prepare_cached("SELECT * FROM stations ORDER BY id")?
            .query_map([], get_station)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn update_station(&self, station: &Station) -> Result<()> {
        let updated = self
            .connection()?
            .prepare_cached(
                "UPDATE stations SET name = ?2, location = ?3, description = ?4 WHERE id = ?1",
            )?
            .execute(params![
                station.id,
                station.name,
                station.location,
                station.description
            ])?;
        if updated == 0 {
            return Err(StoreError::NoSuch {
                kind: "station",
                id: station.id,
            });
        }
        Ok(())
    }

    /// Upsert: a reading with the same `(station, timestamp)` is replaced.
    pub fn write_reading(&self, reading: &Reading) -> Result<()> {
        self.connection()?
            .prepare_cached(
                r#"
                INSERT OR REPLACE INTO readings (station, timestamp, temperature, humidity, pressure)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?
            .execute(params![
                reading.station,
                reading.timestamp,
                reading.temperature,
                reading.humidity,
                reading.pressure
            ])?;
        Ok(())
    }

    /// The `n` most recent readings, most recent first.
    pub fn last_readings(&self, station: StationID, n: usize) -> Result<Vec<Reading>> {
        self.connection()?
            .prepare_cached(
                "SELECT * FROM readings WHERE station = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )?
            .query_map(params![station, n as i64], get_reading)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn last_reading(&self, station: StationID) -> Result<Option<Reading>> {
        Ok(self.last_readings(station, 1)?.into_iter().next())
    }

    /// Readings with `t_min <= timestamp <= t_max`, oldest first.
    /// A non-positive `limit` means [`DEFAULT_QUERY_BOUND`].
    pub fn query_readings(
        &self,
        station: StationID,
        t_min: i64,
        t_max: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reading>> {
        let (limit, offset) = query_bounds(limit, offset);
        self.connection()?
            .prepare_cached(
                r#"
                SELECT * FROM readings
                WHERE station = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                ORDER BY timestamp ASC
                LIMIT ?4 OFFSET ?5
                "#,
            )?
            .query_map(params![station, t_min, t_max, limit, offset], get_reading)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }
}

/// Rain gauges (ombrometers), a directory of their own.
impl EntityStore {
    pub fn create_gauge(&self, gauge: &RainGauge) -> Result<GaugeID> {
        let mut connection = self.connection()?;
        let tx = connection.transaction()?;
        let id = if gauge.id > 0 {
            if exists(&tx, "rain_gauges", gauge.id)? {
                return Err(StoreError::Duplicate {
                    kind: "rain gauge",
                    id: gauge.id,
                });
            }
            gauge.id
        } else {
            next_id(&tx, "rain_gauges")?
        };
        tx.prepare_cached(
            "INSERT INTO rain_gauges (id, name, location, description) VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![id, gauge.name, gauge.location, gauge.description])?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_gauge(&self, id: GaugeID) -> Result<Option<RainGauge>> {
        Ok(self
            .connection()?
            .prepare_cached("SELECT * FROM rain_gauges WHERE id = ?1")?
            .query_row(params![id], get_gauge)
            .optional()?)
    }

    pub fn list_gauges(&self) -> Result<Vec<RainGauge>> {
        self.connection()?
            .prepare_cached("SELECT * FROM rain_gauges ORDER BY id")?
            .query_map([], get_gauge)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn update_gauge(&self, gauge: &RainGauge) -> Result<()> {
        let updated = self
            .connection()?
            .prepare_cached(
                "UPDATE rain_gauges SET name = ?2, location = ?3, description = ?4 WHERE id = ?1",
            )?
            .execute(params![gauge.id, gauge.name, gauge.location, gauge.description])?;
        if updated == 0 {
            return Err(StoreError::NoSuch {
                kind: "rain gauge",
                id: gauge.id,
            });
        }
        Ok(())
    }

    pub fn write_rain(&self, reading: &RainReading) -> Result<()> {
        self.connection()?
            .prepare_cached(
                "INSERT OR REPLACE INTO rain_readings (gauge, timestamp, millimeters) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![reading.gauge, reading.timestamp, reading.millimeters])?;
        Ok(())
    }

    pub fn last_rain(&self, gauge: GaugeID, n: usize) -> Result<Vec<RainReading>> {
        self.connection()?
            .prepare_cached(
                "SELECT * FROM rain_readings WHERE gauge = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )?
            .query_map(params![gauge, n as i64], get_rain)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn query_rain(
        &self,
        gauge: GaugeID,
        t_min: i64,
        t_max: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RainReading>> {
        let (limit, offset) = query_bounds(limit, offset);
        self.connection()?
            .prepare_cached(
                r#"
                SELECT * FROM rain_readings
                WHERE gauge = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                ORDER BY timestamp ASC
                LIMIT ?4 OFFSET ?5
                "#,
            )?
            .query_map(params![gauge, t_min, t_max, limit, offset], get_rain)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }
}

/// Lightning strikes.
impl EntityStore {
    /// First write wins, returns `false` if a strike with the same
    /// `(station, timestamp)` was already recorded.
    pub fn insert_lightning(&self, lightning: &Lightning) -> Result<bool> {
        let inserted = self
            .connection()?
            .prepare_cached(
                "INSERT OR IGNORE INTO lightnings (station, timestamp, distance) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![
                lightning.station,
                lightning.timestamp,
                lightning.distance
            ])?;
        Ok(inserted != 0)
    }

    /// Most recent first, over all stations.
    pub fn lightnings(&self, limit: i64, offset: i64) -> Result<Vec<Lightning>> {
        let (limit, offset) = query_bounds(limit, offset);
        self.connection()?
            .prepare_cached(
                "SELECT * FROM lightnings ORDER BY timestamp DESC LIMIT ?1 OFFSET ?2",
            )?
            .query_map(params![limit, offset], get_lightning)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }
}

/// Access tokens.
impl EntityStore {
    pub fn get_token(&self, token: &str) -> Result<Option<Token>> {
        Ok(self
            .connection()?
            .prepare_cached("SELECT * FROM tokens WHERE token = ?1")?
            .query_row(params![token], get_token)
            .optional()?)
    }

    pub fn station_tokens(&self, station: StationID) -> Result<Vec<Token>> {
        self.connection()?
            .prepare_cached("SELECT * FROM tokens WHERE station = ?1 ORDER BY token")?
            .query_map(params![station], get_token)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    /// Returns `false` if the token already existed (it is left unchanged).
    pub fn insert_token(&self, token: &Token) -> Result<bool> {
        let inserted = self
            .connection()?
            .prepare_cached("INSERT OR IGNORE INTO tokens (token, station) VALUES (?1, ?2)")?
            .execute(params![token.token, token.station])?;
        Ok(inserted != 0)
    }

    /// Returns whether a token was removed.
    pub fn remove_token(&self, token: &str) -> Result<bool> {
        let removed = self
            .connection()?
            .prepare_cached("DELETE FROM tokens WHERE token = ?1")?
            .execute(params![token])?;
        Ok(removed != 0)
    }
}
