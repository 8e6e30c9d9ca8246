//! Administrative subcommands, run directly against the configured database.

use std::path::Path;

use anyhow::Result;
use rand::{distributions::Alphanumeric, Rng};
use stratus::{RainGauge, Station, StationID, Token};

use crate::{
    args::{AdminArgs, ArgsParser, Cmd, GaugeCmd, Metadata, RunArgs, StationCmd, TokenCmd},
    config, log,
    misc::RecordsPath,
    store::EntityStore,
    web::csv,
};

const TOKEN_LEN: usize = 32;

pub fn delegate(args: ArgsParser) -> Delegation {
    let ran = match args.cmd {
        Cmd::Run { args: run_args } => return Delegation::RunMain(run_args),
        Cmd::Station { args, cmd } => with_store(&args, |store| station(store, cmd)),
        Cmd::Gauge { args, cmd } => with_store(&args, |store| gauge(store, cmd)),
        Cmd::Token { args, cmd } => with_store(&args, |store| token(store, cmd)),
    };
    Delegation::SubcommandRan(ran)
}

#[derive(Debug)]
pub enum Delegation {
    /// a subcommand was selected an ran, no action is required
    /// the result of this is passed as the first argument
    SubcommandRan(Result<()>),
    /// the caller of this function should take these arguments, and run the main task
    RunMain(RunArgs),
}

/// runs `command` against the configured database and prints what it returns
fn with_store(args: &AdminArgs, command: impl FnOnce(&EntityStore) -> Result<String>) -> Result<()> {
    let _guard = log::init_logging_no_file()?;
    info!("Reading configuration from {:?}", args.config);
    let cfg = load_config(&args.config)?;
    let data_dir = RecordsPath::new(cfg.directory.data.clone());
    data_dir.ensure_exists_blocking()?;
    let store = EntityStore::open(
        &data_dir.path(&cfg.database.file)?,
        cfg.database.busy_timeout(),
    )?;
    print!("{}", command(&store)?);
    Ok(())
}

pub fn load_config(path: &Path) -> Result<config::Config> {
    if !path.exists() {
        bail!("Configuration file {path:?} does not exist!");
    }
    let buf = std::fs::read_to_string(path)?;
    config::from_str(&buf)
}

fn apply(meta: Metadata, name: &mut String, location: &mut String, description: &mut String) {
    if let Some(new) = meta.name {
        *name = new;
    }
    if let Some(new) = meta.location {
        *location = new;
    }
    if let Some(new) = meta.description {
        *description = new;
    }
}

pub fn station(store: &EntityStore, cmd: StationCmd) -> Result<String> {
    match cmd {
        StationCmd::Add { id, meta } => {
            let mut station = Station {
                id: id.unwrap_or(0),
                ..Default::default()
            };
            apply(
                meta,
                &mut station.name,
                &mut station.location,
                &mut station.description,
            );
            let id = store.create_station(&station)?;
            info!("Created station {id} ({:?})", station.name);
            Ok(format!("{id}\n"))
        }
        StationCmd::List => Ok(csv::stations(&store.list_stations()?)),
        StationCmd::Edit { id, meta } => {
            let Some(mut station) = store.get_station(id)? else {
                bail!("station {id} does not exist");
            };
            apply(
                meta,
                &mut station.name,
                &mut station.location,
                &mut station.description,
            );
            store.update_station(&station)?;
            Ok(csv::stations(&[station]))
        }
    }
}

pub fn gauge(store: &EntityStore, cmd: GaugeCmd) -> Result<String> {
    match cmd {
        GaugeCmd::Add { id, meta } => {
            let mut gauge = RainGauge {
                id: id.unwrap_or(0),
                ..Default::default()
            };
            apply(
                meta,
                &mut gauge.name,
                &mut gauge.location,
                &mut gauge.description,
            );
            let id = store.create_gauge(&gauge)?;
            info!("Created rain gauge {id} ({:?})", gauge.name);
            Ok(format!("{id}\n"))
        }
        GaugeCmd::List => Ok(csv::gauges(&store.list_gauges()?)),
        GaugeCmd::Edit { id, meta } => {
            let Some(mut gauge) = store.get_gauge(id)? else {
                bail!("rain gauge {id} does not exist");
            };
            apply(
                meta,
                &mut gauge.name,
                &mut gauge.location,
                &mut gauge.description,
            );
            store.update_gauge(&gauge)?;
            Ok(csv::gauges(&[gauge]))
        }
    }
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn require_station(store: &EntityStore, station: StationID) -> Result<()> {
    if station <= 0 || !store.station_exists(station)? {
        bail!("station {station} does not exist");
    }
    Ok(())
}

pub fn token(store: &EntityStore, cmd: TokenCmd) -> Result<String> {
    match cmd {
        TokenCmd::Add { station, token } => {
            require_station(store, station)?;
            let token = Token {
                token: token.unwrap_or_else(generate_token),
                station,
            };
            if token.token.is_empty() {
                bail!("tokens may not be empty");
            }
            if !store.insert_token(&token)? {
                bail!("token already exists");
            }
            info!("Authorized a new token for station {station}");
            Ok(format!("{}\n", token.token))
        }
        TokenCmd::Remove { token } => {
            if !store.remove_token(&token)? {
                bail!("no such token");
            }
            Ok(String::new())
        }
        TokenCmd::List { station } => {
            require_station(store, station)?;
            Ok(store
                .station_tokens(station)?
                .into_iter()
                .map(|t| t.token + "\n")
                .collect())
        }
    }
}
