use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use serde::Deserialize;

#[cfg(test)]
#[test]
fn load_example_config() {
    let cfg = from_str(include_str!("../config.example.toml")).unwrap();
    assert_eq!(cfg.webserver.query_limit, 50_000);
    assert_eq!(cfg.ingest.push_delay, 60);
    assert_eq!(
        cfg.mqtt.as_ref().map(|m| m.topic.as_str()),
        Some("meteo/#")
    );
    println!("{cfg:#?}");
}

#[cfg(test)]
#[test]
fn minimal_config_uses_defaults() {
    let cfg = from_str("[directory]\ndata = \"/tmp/meteo\"\n").unwrap();
    assert_eq!(cfg, Config {
        directory: Directories {
            data: PathBuf::from("/tmp/meteo"),
            log: None,
        },
        database: Database::default(),
        webserver: Webserver::default(),
        mqtt: None,
        ingest: Ingest::default(),
        plausibility: Plausibility::default(),
    });
}

pub fn from_str(buf: &str) -> Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(buf, config::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// directories to store various things
    pub directory: Directories,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub webserver: Webserver,
    /// message bus connection, the bus is not used when this is missing
    #[serde(default)]
    pub mqtt: Option<Mqtt>,
    /// push decision and ingestion queue tuning
    #[serde(default)]
    pub ingest: Ingest,
    /// limits outside of which a reading is considered impossible
    #[serde(default)]
    pub plausibility: Plausibility,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Directories {
    /// the directory to store persistant data (the database lives here)
    pub data: PathBuf,
    /// if set, logs are additionally written here (rolled hourly)
    #[serde(default)]
    pub log: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Database {
    /// database file name, inside the data directory
    pub file: PathBuf,
    /// how long a statement may wait on a locked database
    pub busy_timeout_ms: u64,
}

impl Database {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            file: PathBuf::from("meteo.sqlite3"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Webserver {
    pub bind: String,
    pub port: u16,
    /// maximum (and default) number of rows returned by a range query
    pub query_limit: i64,
    /// number of points a plotted series is downsampled to
    pub plot_points: usize,
    /// allow editing station metadata over HTTP
    pub allow_edit: bool,
}

impl Default for Webserver {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8802,
            query_limit: 50_000,
            plot_points: 1825,
            allow_edit: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Mqtt {
    /// `[user[:password]@]host[:port]`
    pub remote: String,
    #[serde(default = "Mqtt::default_topic")]
    pub topic: String,
    #[serde(default = "Mqtt::default_client_id")]
    pub client_id: String,
}

impl Mqtt {
    fn default_topic() -> String {
        stratus::wire::topic::SUBSCRIBE_ALL.into()
    }

    fn default_client_id() -> String {
        "meteod".into()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Ingest {
    /// seconds after which a reading is stored even if nothing changed
    pub push_delay: i64,
    /// capacity of the queue in front of the ingestion router
    pub queue: usize,
    /// degree celsius
    pub temperature_deviation: f32,
    /// % rel
    pub humidity_deviation: f32,
    /// Pa
    pub pressure_deviation: f32,
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            push_delay: 60,
            queue: 256,
            temperature_deviation: 0.5,
            humidity_deviation: 2.0,
            pressure_deviation: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Plausibility {
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub humidity_min: f32,
    pub humidity_max: f32,
    pub pressure_min_hpa: f32,
    pub pressure_max_hpa: f32,
    /// pressures below this are taken to be hPa and scaled to Pa
    pub hpa_threshold: f32,
}

impl Default for Plausibility {
    fn default() -> Self {
        Self {
            temperature_min: -100.0,
            temperature_max: 1000.0,
            humidity_min: 0.0,
            humidity_max: 100.0,
            pressure_min_hpa: 10.0,
            pressure_max_hpa: 2000.0,
            hpa_threshold: 10_000.0,
        }
    }
}
