use std::time::Duration;

use axum::{
    body::{to_bytes, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Form,
};
use stratus::{Lightning, Reading, Station, Token};

use super::{
    csv::{self, Export},
    export_range, AppState, EditForm, LimitParams, PlotParams, RangeParams,
};
use crate::{
    config::{Ingest, Plausibility, Webserver},
    echo::EchoSuppressor,
    route::{router_task, Inbound, Router},
    shutdown::Shutdown,
    store::EntityStore,
};

async fn text(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn reading(station: i64, timestamp: i64, temperature: f32) -> Reading {
    Reading {
        station,
        timestamp,
        temperature,
        humidity: 40.0,
        pressure: 100_000.0,
    }
}

/// station 1 "roof" (token "secret") with three readings
fn setup(cfg: Webserver) -> (AppState, EntityStore, flume::Receiver<Inbound>) {
    let store = EntityStore::open_in_memory().unwrap();
    store
        .create_station(&Station {
            id: 1,
            name: "roof".into(),
            location: "Bern".into(),
            description: "north side".into(),
        })
        .unwrap();
    store
        .insert_token(&Token {
            token: "secret".into(),
            station: 1,
        })
        .unwrap();
    for (ts, t) in [(1_704_067_200, 1.0), (1_704_070_800, 2.0), (1_706_745_600, 3.0)] {
        store.write_reading(&reading(1, ts, t)).unwrap();
    }
    let (tx, rx) = flume::bounded(8);
    (AppState::new(store.clone(), tx, cfg), store, rx)
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

#[test]
fn router_builds() {
    let (state, _, _) = setup(Webserver::default());
    let _ = super::router(state);
}

#[test]
fn export_filenames() {
    let mut export = Export {
        station: 3,
        year: 2024,
        month: None,
        day: None,
    };
    assert_eq!(export.filename(), "station_03-2024.csv");
    export.month = Some(5);
    assert_eq!(export.filename(), "station_03-2024-05.csv");
    export.day = Some(7);
    assert_eq!(export.filename(), "station_03-2024-05-07.csv");
    export.station = 120;
    assert_eq!(export.filename(), "station_120-2024-05-07.csv");
}

#[test]
fn export_ranges() {
    let range = |year, month, day| {
        export_range(&Export {
            station: 1,
            year,
            month,
            day,
        })
    };
    assert_eq!(
        range(2024, None, None).unwrap(),
        (1_704_067_200, 1_735_689_599)
    );
    assert_eq!(
        range(2024, Some(2), None).unwrap(),
        (1_706_745_600, 1_709_251_199)
    );
    assert_eq!(
        range(2024, Some(2), Some(29)).unwrap(),
        (1_709_164_800, 1_709_251_199)
    );
    assert!(range(2023, Some(2), Some(29)).is_err());
    assert!(range(2024, Some(13), None).is_err());
    assert!(range(2024, Some(0), None).is_err());
}

#[test]
fn ago_strings() {
    assert_eq!(csv::ago(5), " 5 seconds ago");
    assert_eq!(csv::ago(60), "60 seconds ago");
    assert_eq!(csv::ago(61), "01:01 ago");
    assert_eq!(csv::ago(3 * 3600 + 2 * 60 + 1), "03:02:01 ago");
    assert_eq!(csv::ago(86_400 + 3600), " 1 days,  1 hours ago");
    assert_eq!(csv::ago(5 * 86_400), "5 days ago");
}

#[tokio::test]
async fn health_and_version() {
    let (status, body) = text(super::health().await.into_response()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"alive":true}"#);
    assert!(super::version().await.starts_with("meteod "));
}

#[tokio::test]
async fn station_listing() {
    let (state, _, _) = setup(Webserver::default());
    let body = super::stations(State(state)).await.unwrap();
    assert_eq!(body, "# Id,Name,Location,Description\n1,roof,Bern,north side\n");
}

#[tokio::test]
async fn last_readings() {
    let (state, _, _) = setup(Webserver::default());
    let body = super::station_readings(
        State(state.clone()),
        Path(1),
        Query(LimitParams {
            limit: Some("2".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        body,
        "## Station 1: 'roof' in Bern, north side\n\
         # Timestamp, Temperature, Humidity, Pressure\n\
         # Seconds, degree C, % rel, Pa\n\
         1706745600,3.00,40.00,100000.00\n\
         1704070800,2.00,40.00,100000.00\n"
    );

    // an unparsable limit is ignored, not rejected
    let Query(params) =
        Query::<LimitParams>::try_from_uri(&Uri::from_static("/station/1?limit=abc")).unwrap();
    let all = super::station_readings(State(state.clone()), Path(1), Query(params))
        .await
        .unwrap();
    assert_eq!(all.lines().filter(|l| !l.starts_with('#')).count(), 3);

    let missing = super::station_readings(State(state), Path(9), Query(LimitParams::default()))
        .await
        .unwrap_err();
    let (status, body) = text(missing.into_response()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Station not found\n");
}

#[test]
fn limits_fall_back_to_the_default() {
    let limit = |limit: Option<&str>| {
        LimitParams {
            limit: limit.map(String::from),
        }
        .limit_or(100)
    };
    assert_eq!(limit(None), 100);
    assert_eq!(limit(Some("abc")), 100);
    assert_eq!(limit(Some("-3")), 100);
    assert_eq!(limit(Some("5000")), 100);
    assert_eq!(limit(Some(" 7 ")), 7);
    assert_eq!(limit(Some("0")), 0);
}

#[tokio::test]
async fn current_of_every_station() {
    let (state, store, _) = setup(Webserver::default());
    store.ensure_station(2, "empty").unwrap();
    let body = super::current(State(state.clone())).await.unwrap();
    assert_eq!(
        body,
        "# Station, Timestamp, Temperature, Humidity, Pressure\n\
         1,1706745600,3.00,40.00,100000.00\n"
    );

    let response = super::current_csv(State(state)).await.unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"current.csv\""
    );
    assert_eq!(text(response).await.1, body);
}

#[tokio::test]
async fn ranged_query_is_clamped() {
    let (state, _, _) = setup(Webserver {
        query_limit: 2,
        ..Webserver::default()
    });
    let params = |limit, offset| RangeParams {
        id: Some(1),
        limit: Some(limit),
        offset: Some(offset),
        tmin: Some(0),
        tmax: Some(2_000_000_000),
    };
    let clamped = super::query(State(state.clone()), Query(params(-5, -1)))
        .await
        .unwrap();
    let max = super::query(State(state.clone()), Query(params(2, 0)))
        .await
        .unwrap();
    assert_eq!(clamped, max);
    assert_eq!(clamped.lines().filter(|l| !l.starts_with('#')).count(), 2);

    let no_id = super::query(State(state), Query(RangeParams::default()))
        .await
        .unwrap_err();
    assert_eq!(text(no_id.into_response()).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn plotted_series() {
    let (state, _, _) = setup(Webserver {
        plot_points: 2,
        ..Webserver::default()
    });
    let plot = |tmin, tmax, points| {
        super::station_plot(
            State(state.clone()),
            Path(1),
            Query(PlotParams { tmin, tmax, points }),
        )
    };
    let rows = |body: String| {
        body.lines()
            .filter(|l| !l.starts_with('#'))
            .map(String::from)
            .collect::<Vec<_>>()
    };

    // the two January readings share the first window
    let expected = vec![
        "1704736800,1.50,40.00,100000.00".to_string(),
        "1706076000,3.00,40.00,100000.00".to_string(),
    ];
    let body = plot(Some(0), Some(2_000_000_000), None).await.unwrap();
    assert!(body.starts_with("## Station 1: 'roof'"));
    assert_eq!(rows(body), expected);
    // more points than configured are not handed out
    assert_eq!(
        rows(plot(Some(0), Some(2_000_000_000), Some(1000)).await.unwrap()),
        expected
    );
    assert_eq!(
        rows(plot(Some(0), Some(2_000_000_000), Some(1)).await.unwrap()).len(),
        1
    );

    // the last day holds nothing
    assert!(rows(plot(None, None, None).await.unwrap()).is_empty());
    assert!(rows(plot(None, Some(i64::MIN), None).await.unwrap()).is_empty());
    assert!(rows(plot(Some(i64::MIN), Some(i64::MAX), Some(0)).await.unwrap()).len() <= 2);
}

#[tokio::test]
async fn calendar_export() {
    let (state, _, _) = setup(Webserver::default());
    let response = super::export_month(
        State(state.clone()),
        Path((1, "2024".to_string(), "01.csv".to_string())),
    )
    .await
    .unwrap();
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"station_01-2024-01.csv\""
    );
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    let (_, body) = text(response).await;
    assert!(body.starts_with("# Query station roof (id: 1) - north side\n# Location Bern\n"));
    assert!(body.contains("# Month: 1\n# Datapoints: 2\n"));
    assert!(body.ends_with("1704067200,1.00,40.00,100000.00\n1704070800,2.00,40.00,100000.00\n"));

    let bad = super::export_year(State(state), Path((1, "20x4.csv".to_string())))
        .await
        .unwrap_err();
    assert_eq!(text(bad.into_response()).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lightning_listing() {
    let (state, store, _) = setup(Webserver::default());
    store
        .insert_lightning(&Lightning {
            station: 1,
            timestamp: 1_700_000_000,
            distance: 4.5,
        })
        .unwrap();
    let body = super::lightnings(State(state)).await.unwrap();
    let mut lines = body.lines().skip(1);
    let line = lines.next().unwrap();
    assert!(line.starts_with("1,roof,1700000000,4.50,"), "{line}");
    assert!(line.ends_with("days ago"));
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn edit_needs_permission() {
    let form = || {
        Form(EditForm {
            name: "attic".into(),
            location: "Thun".into(),
            desc: String::new(),
        })
    };
    let (state, store, _) = setup(Webserver::default());
    let denied = super::station_edit(State(state), Path(1), form())
        .await
        .unwrap_err();
    let (status, body) = text(denied.into_response()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Administratively prohibited\n");
    assert_eq!(store.get_station(1).unwrap().unwrap().name, "roof");

    let (state, store, _) = setup(Webserver {
        allow_edit: true,
        ..Webserver::default()
    });
    let redirect = super::station_edit(State(state), Path(1), form())
        .await
        .unwrap()
        .into_response();
    assert_eq!(redirect.headers()[header::LOCATION], "/station/1");
    let station = store.get_station(1).unwrap().unwrap();
    assert_eq!((station.name.as_str(), station.location.as_str()), ("attic", "Thun"));
}

#[tokio::test]
async fn push_through_the_router() {
    let (state, store, rx) = setup(Webserver::default());
    let mut shutdown = Shutdown::new();
    let router = Router::new(
        store.clone(),
        &Ingest::default(),
        Plausibility::default(),
        EchoSuppressor::new(),
    );
    let task = tokio::spawn(router_task(router, rx, shutdown.handle()));

    let post = |body: &'static str, headers: HeaderMap| {
        super::station_push(State(state.clone()), Path(1), headers, Bytes::from(body))
    };
    let ok = post(
        r#"{"token": "secret", "timestamp": 1800000000, "t": 21.5, "hum": 40, "p": 1000}"#,
        json_headers(),
    )
    .await
    .unwrap();
    assert_eq!(ok, "OK");
    assert_eq!(
        store.last_reading(1).unwrap().unwrap(),
        Reading {
            station: 1,
            timestamp: 1_800_000_000,
            temperature: 21.5,
            humidity: 40.0,
            pressure: 100_000.0,
        }
    );

    let denied = post(r#"{"token": "guess", "t": 21.5}"#, json_headers())
        .await
        .unwrap();
    assert_eq!(denied, "DENIED");

    let malformed = post(r#"{"token": "#, json_headers()).await.unwrap_err();
    let (status, body) = text(malformed.into_response()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("Illegal json received"));

    let form = post(r#"{"token": "secret"}"#, HeaderMap::new())
        .await
        .unwrap_err();
    assert_eq!(text(form.into_response()).await.0, StatusCode::BAD_REQUEST);

    shutdown.trigger_shutdown();
    tokio::time::timeout(Duration::from_secs(5), shutdown.wait_for_completion())
        .await
        .expect("router task did not stop");
    task.await.unwrap().unwrap();

    // nothing is listening anymore
    let gone = post(r#"{"token": "secret"}"#, json_headers())
        .await
        .unwrap_err();
    assert_eq!(text(gone.into_response()).await.0, StatusCode::SERVICE_UNAVAILABLE);
}
