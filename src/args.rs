use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use stratus::{GaugeID, StationID};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct ArgsParser {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// run the server
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
    /// manage weather stations
    Station {
        #[command(flatten)]
        args: AdminArgs,
        #[command(subcommand)]
        cmd: StationCmd,
    },
    /// manage rain gauges (ombrometers)
    Gauge {
        #[command(flatten)]
        args: AdminArgs,
        #[command(subcommand)]
        cmd: GaugeCmd,
    },
    /// manage the access tokens stations push with
    Token {
        #[command(flatten)]
        args: AdminArgs,
        #[command(subcommand)]
        cmd: TokenCmd,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(long, short, help = "config filepath")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct AdminArgs {
    #[arg(long, short, help = "config filepath")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct Metadata {
    #[arg(long, help = "display name")]
    pub name: Option<String>,
    #[arg(long, help = "where the device is located")]
    pub location: Option<String>,
    #[arg(long, help = "free form description")]
    pub description: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum StationCmd {
    /// register a new station
    Add {
        #[arg(long, help = "explicit id (default: highest existing id + 1)")]
        id: Option<StationID>,
        #[command(flatten)]
        meta: Metadata,
    },
    /// list known stations
    List,
    /// change the metadata of a station, fields not given are kept
    Edit {
        id: StationID,
        #[command(flatten)]
        meta: Metadata,
    },
}

#[derive(Subcommand, Debug)]
pub enum GaugeCmd {
    /// register a new rain gauge
    Add {
        #[arg(long, help = "explicit id (default: highest existing id + 1)")]
        id: Option<GaugeID>,
        #[command(flatten)]
        meta: Metadata,
    },
    /// list known rain gauges
    List,
    /// change the metadata of a rain gauge, fields not given are kept
    Edit {
        id: GaugeID,
        #[command(flatten)]
        meta: Metadata,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenCmd {
    /// authorize a token to push for a station
    Add {
        station: StationID,
        #[arg(long, help = "use this token instead of generating one")]
        token: Option<String>,
    },
    /// revoke a token
    Remove { token: String },
    /// list the tokens of a station
    List { station: StationID },
}
