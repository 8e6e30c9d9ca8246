//! HTTP surface: the push endpoints feeding the router, and the read side.

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{Datelike, Months, NaiveDate};
use flume::Sender;
use serde::Deserialize;
use stratus::{
    wire::{PushPayload, RainPushPayload, WireError},
    GaugeID, RainGauge, Reading, Station, StationID,
};
use tokio::{net::TcpListener, sync::oneshot, task::spawn_blocking};

use crate::{
    config::Webserver,
    misc::unix_now,
    query::QueryEngine,
    route::{Inbound, Outcome, Reply},
    shutdown::ShutdownHandle,
    store::{EntityStore, StoreError},
};

pub mod csv;

#[cfg(test)]
mod test;

use csv::Export;

/// most readings `/station/{id}` returns
const LAST_READINGS_CAP: i64 = 1000;
const GAUGE_READINGS_DEFAULT: i64 = 100;
const LIGHTNINGS_SHOWN: i64 = 100;
const DAY: i64 = 60 * 60 * 24;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Illegal json received: {0}")]
    Malformed(#[from] WireError),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Administratively prohibited")]
    Forbidden,
    #[error("Ingestion is not running")]
    Unavailable,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Store(_) | Self::Join(_) => {
                error!("Request failed: {self}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Server error\n").into_response();
            }
            Self::Malformed(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, format!("{self}\n")).into_response()
    }
}

type WebResult<T> = Result<T, WebError>;

#[derive(Clone)]
pub struct AppState {
    store: EntityStore,
    query: QueryEngine,
    ingest: Sender<Inbound>,
    cfg: Arc<Webserver>,
}

impl AppState {
    pub fn new(store: EntityStore, ingest: Sender<Inbound>, cfg: Webserver) -> Self {
        Self {
            query: QueryEngine::new(store.clone(), cfg.query_limit),
            store,
            ingest,
            cfg: Arc::new(cfg),
        }
    }

    /// run store reads on the blocking pool
    async fn read<T, F>(&self, f: F) -> WebResult<T>
    where
        F: FnOnce(&EntityStore, &QueryEngine) -> crate::store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (store, query) = (self.store.clone(), self.query.clone());
        Ok(spawn_blocking(move || f(&store, &query)).await??)
    }

    /// queue a message for the router and wait for its verdict
    async fn submit(&self, inbound: impl FnOnce(Reply) -> Inbound) -> WebResult<Outcome> {
        let (reply, response) = oneshot::channel();
        self.ingest
            .send_async(inbound(reply))
            .await
            .map_err(|_| WebError::Unavailable)?;
        Ok(response.await.map_err(|_| WebError::Unavailable)??)
    }

    async fn station(&self, id: StationID) -> WebResult<Station> {
        self.read(move |store, _| store.get_station(id))
            .await?
            .ok_or(WebError::NotFound("Station not found"))
    }

    async fn gauge(&self, id: GaugeID) -> WebResult<RainGauge> {
        self.read(move |store, _| store.get_gauge(id))
            .await?
            .ok_or(WebError::NotFound("Rain gauge not found"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/stations", get(stations))
        .route("/current", get(current))
        .route("/latest", get(current))
        .route("/readings", get(current))
        .route("/current.csv", get(current_csv))
        .route("/query", get(query))
        .route("/lightnings", get(lightnings))
        .route("/station/:id", get(station_readings).post(station_push))
        .route("/station/:id/current", get(station_current))
        .route("/station/:id/current.csv", get(station_current))
        .route("/station/:id/plot", get(station_plot))
        .route("/station/:id/edit", post(station_edit))
        .route("/station/:id/:year", get(export_year))
        .route("/station/:id/:year/:month", get(export_month))
        .route("/station/:id/:year/:month/:day", get(export_day))
        .route("/ombrometers", get(ombrometers))
        .route("/ombrometer/:id", get(ombrometer_readings).post(ombrometer_push))
        .route("/ombrometer/:id/edit", post(ombrometer_edit))
        .with_state(state)
}

pub async fn serve(state: AppState, mut handle: ShutdownHandle) -> Result<()> {
    let addr = format!("{}:{}", state.cfg.bind, state.cfg.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Webserver listening on {addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { handle.wait_for_shutdown().await })
        .await?;
    Ok(())
}

fn attachment(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn require_json(headers: &HeaderMap) -> WebResult<()> {
    let json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if json {
        Ok(())
    } else {
        Err(WebError::BadRequest("Unsupported Content-Type"))
    }
}

fn answer(outcome: Outcome) -> &'static str {
    if outcome.accepted() {
        "OK"
    } else {
        "DENIED"
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "alive": true }))
}

pub async fn version() -> String {
    format!("meteod {}\n", env!("CARGO_PKG_VERSION"))
}

pub async fn stations(State(state): State<AppState>) -> WebResult<String> {
    let stations = state.read(|store, _| store.list_stations()).await?;
    Ok(csv::stations(&stations))
}

async fn latest_of_all(state: &AppState) -> WebResult<Vec<Reading>> {
    state
        .read(|store, _| {
            let mut latest = vec![];
            for station in store.list_stations()? {
                latest.extend(store.last_reading(station.id)?);
            }
            Ok(latest)
        })
        .await
}

pub async fn current(State(state): State<AppState>) -> WebResult<String> {
    Ok(csv::current(&latest_of_all(&state).await?))
}

pub async fn current_csv(State(state): State<AppState>) -> WebResult<Response> {
    let body = csv::current(&latest_of_all(&state).await?);
    Ok(attachment("current.csv", body))
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    /// not a number counts as not given
    pub limit: Option<String>,
}

impl LimitParams {
    fn limit_or(&self, default: i64) -> i64 {
        match self.limit.as_deref().and_then(|l| l.trim().parse().ok()) {
            Some(limit) if (0..=LAST_READINGS_CAP).contains(&limit) => limit,
            _ => default,
        }
    }
}

pub async fn station_readings(
    State(state): State<AppState>,
    Path(id): Path<StationID>,
    Query(params): Query<LimitParams>,
) -> WebResult<String> {
    let station = state.station(id).await?;
    let limit = params.limit_or(LAST_READINGS_CAP);
    let readings = state
        .read(move |store, _| store.last_readings(id, limit as usize))
        .await?;
    Ok(csv::station_series(&station, &readings))
}

/// The station is taken from the token, the id in the path is not checked.
pub async fn station_push(
    State(state): State<AppState>,
    Path(_id): Path<StationID>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<&'static str> {
    require_json(&headers)?;
    let payload = PushPayload::decode(&body)?;
    let outcome = state
        .submit(|reply| Inbound::Push { payload, reply })
        .await?;
    Ok(answer(outcome))
}

pub async fn station_current(
    State(state): State<AppState>,
    Path(id): Path<StationID>,
) -> WebResult<Response> {
    let station = state.station(id).await?;
    let latest = state
        .read(move |store, _| store.last_reading(id))
        .await?;
    let mut body = String::from("# [Unixtimestamp],[deg C],[% rel],[Pa]\n");
    body.extend(latest.iter().map(csv::reading_row));
    Ok(attachment(&format!("current_{:02}.csv", station.id), body))
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub id: Option<StationID>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub tmin: Option<i64>,
    pub tmax: Option<i64>,
}

pub async fn query(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> WebResult<String> {
    let id = params.id.ok_or(WebError::BadRequest("Bad id"))?;
    let station = state.station(id).await?;
    let (tmin, tmax) = (params.tmin.unwrap_or(0), params.tmax.unwrap_or_else(unix_now));
    let (limit, offset) = (params.limit.unwrap_or(0), params.offset.unwrap_or(0));
    let readings = state
        .read(move |_, query| query.query_range(id, tmin, tmax, limit, offset))
        .await?;
    Ok(csv::station_series(&station, &readings))
}

#[derive(Debug, Default, Deserialize)]
pub struct PlotParams {
    pub tmin: Option<i64>,
    pub tmax: Option<i64>,
    pub points: Option<usize>,
}

/// bucket averaged series for charts, the last 24h unless a range is given
pub async fn station_plot(
    State(state): State<AppState>,
    Path(id): Path<StationID>,
    Query(params): Query<PlotParams>,
) -> WebResult<String> {
    let station = state.station(id).await?;
    let tmax = params.tmax.unwrap_or_else(unix_now);
    let tmin = params.tmin.unwrap_or(tmax.saturating_sub(DAY));
    let budget = state.cfg.plot_points;
    let points = params.points.filter(|p| *p > 0).unwrap_or(budget).min(budget);
    let readings = state
        .read(move |_, query| query.plot(id, tmin, tmax, points))
        .await?;
    Ok(csv::station_series(&station, &readings))
}

#[derive(Debug, Default, Deserialize)]
pub struct EditForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub desc: String,
}

pub async fn station_edit(
    State(state): State<AppState>,
    Path(id): Path<StationID>,
    Form(form): Form<EditForm>,
) -> WebResult<Redirect> {
    if !state.cfg.allow_edit {
        return Err(WebError::Forbidden);
    }
    state.station(id).await?;
    let station = Station {
        id,
        name: form.name,
        location: form.location,
        description: form.desc,
    };
    state
        .read(move |store, _| store.update_station(&station))
        .await?;
    info!("Station {id} edited");
    Ok(Redirect::to(&format!("/station/{id}")))
}

fn csv_segment(segment: &str) -> WebResult<&str> {
    segment
        .strip_suffix(".csv")
        .ok_or(WebError::NotFound("Not found"))
}

fn number<T: std::str::FromStr>(segment: &str, what: &'static str) -> WebResult<T> {
    segment.parse().map_err(|_| WebError::BadRequest(what))
}

/// unix seconds covered by `export`, both ends inclusive
fn export_range(export: &Export) -> WebResult<(i64, i64)> {
    let start = NaiveDate::from_ymd_opt(
        export.year,
        export.month.unwrap_or(1),
        export.day.unwrap_or(1),
    );
    let end = start.and_then(|start| match (export.month, export.day) {
        (None, _) => start.with_year(start.year() + 1),
        (Some(_), None) => start.checked_add_months(Months::new(1)),
        (Some(_), Some(_)) => start.succ_opt(),
    });
    let seconds = |date: NaiveDate| date.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp());
    match (start.and_then(seconds), end.and_then(seconds)) {
        (Some(start), Some(end)) => Ok((start, end - 1)),
        _ => Err(WebError::BadRequest("Bad date")),
    }
}

async fn export(state: AppState, export: Export) -> WebResult<Response> {
    let (tmin, tmax) = export_range(&export)?;
    let station = state.station(export.station).await?;
    let id = station.id;
    // exports are not capped by the query limit
    let readings = state
        .read(move |store, _| store.query_readings(id, tmin, tmax, 0, 0))
        .await?;
    Ok(attachment(&export.filename(), export.render(&station, &readings)))
}

pub async fn export_year(
    State(state): State<AppState>,
    Path((station, year)): Path<(StationID, String)>,
) -> WebResult<Response> {
    let year = number(csv_segment(&year)?, "Bad year")?;
    export(
        state,
        Export {
            station,
            year,
            month: None,
            day: None,
        },
    )
    .await
}

pub async fn export_month(
    State(state): State<AppState>,
    Path((station, year, month)): Path<(StationID, String, String)>,
) -> WebResult<Response> {
    let range = Export {
        station,
        year: number(&year, "Bad year")?,
        month: Some(number(csv_segment(&month)?, "Bad month")?),
        day: None,
    };
    export(state, range).await
}

pub async fn export_day(
    State(state): State<AppState>,
    Path((station, year, month, day)): Path<(StationID, String, String, String)>,
) -> WebResult<Response> {
    let range = Export {
        station,
        year: number(&year, "Bad year")?,
        month: Some(number(&month, "Bad month")?),
        day: Some(number(csv_segment(&day)?, "Bad day")?),
    };
    export(state, range).await
}

pub async fn lightnings(State(state): State<AppState>) -> WebResult<String> {
    let (strikes, stations) = state
        .read(|store, _| Ok((store.lightnings(LIGHTNINGS_SHOWN, 0)?, store.list_stations()?)))
        .await?;
    let names: HashMap<StationID, String> =
        stations.into_iter().map(|s| (s.id, s.name)).collect();
    Ok(csv::lightnings(&strikes, unix_now(), |id| {
        names.get(&id).map(String::as_str).unwrap_or("")
    }))
}

pub async fn ombrometers(State(state): State<AppState>) -> WebResult<String> {
    let gauges = state.read(|store, _| store.list_gauges()).await?;
    Ok(csv::gauges(&gauges))
}

pub async fn ombrometer_readings(
    State(state): State<AppState>,
    Path(id): Path<GaugeID>,
    Query(params): Query<LimitParams>,
) -> WebResult<String> {
    let gauge = state.gauge(id).await?;
    let limit = params.limit_or(GAUGE_READINGS_DEFAULT);
    let readings = state
        .read(move |store, _| store.last_rain(id, limit as usize))
        .await?;
    Ok(csv::gauge_series(&gauge, &readings))
}

pub async fn ombrometer_push(
    State(state): State<AppState>,
    Path(gauge): Path<GaugeID>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<&'static str> {
    require_json(&headers)?;
    let payload = RainPushPayload::decode(&body)?;
    let outcome = state
        .submit(|reply| Inbound::Rain {
            gauge,
            payload,
            reply,
        })
        .await?;
    Ok(answer(outcome))
}

pub async fn ombrometer_edit(
    State(state): State<AppState>,
    Path(id): Path<GaugeID>,
    Form(form): Form<EditForm>,
) -> WebResult<Redirect> {
    if !state.cfg.allow_edit {
        return Err(WebError::Forbidden);
    }
    state.gauge(id).await?;
    let gauge = RainGauge {
        id,
        name: form.name,
        location: form.location,
        description: form.desc,
    };
    state
        .read(move |store, _| store.update_gauge(&gauge))
        .await?;
    info!("Rain gauge {id} edited");
    Ok(Redirect::to(&format!("/ombrometer/{id}")))
}
