use crate::station::Reading;

use super::{LightningMessage, PushPayload, Topic, WeatherMessage, WireError};

#[test]
fn topic_forms() {
    assert_eq!(Topic::parse("meteo/3").unwrap(), Topic::Weather(3));
    assert_eq!(Topic::parse("meteo/meteo/12").unwrap(), Topic::Weather(12));
    assert_eq!(
        Topic::parse("meteo/lightning/7").unwrap(),
        Topic::Lightning(7)
    );
    assert_eq!(Topic::parse("home/meteo/4").unwrap(), Topic::Weather(4));
}

#[test]
fn topic_rejects_bad_ids() {
    assert!(matches!(
        Topic::parse("meteo/abc"),
        Err(WireError::StationId(_))
    ));
    assert!(matches!(Topic::parse("meteo/0"), Err(WireError::StationId(_))));
    assert!(matches!(
        Topic::parse("meteo/lightning/-2"),
        Err(WireError::StationId(_))
    ));
    assert!(matches!(
        Topic::parse("weather/1"),
        Err(WireError::NotMeteo(_))
    ));
}

#[test]
fn topic_display_parses_back() {
    for topic in [Topic::Weather(5), Topic::Lightning(9)] {
        assert_eq!(Topic::parse(&topic.to_string()).unwrap(), topic);
    }
    assert_eq!(Topic::Lightning(9).to_string(), "meteo/lightning/9");
}

#[test]
fn push_payload_defaults_and_aliases() {
    let p = PushPayload::decode(br#"{"token":"abc","t":21.5,"hum":40,"p":1013}"#).unwrap();
    assert_eq!(p.token, "abc");
    assert_eq!(p.timestamp(), None);
    assert_eq!(p.t, 21.5);
    assert_eq!(p.p, 1013.0);

    let p = PushPayload::decode(br#"{"Token":"x","Timestamp":1000,"T":1,"Hum":2,"P":3}"#).unwrap();
    assert_eq!(p.token, "x");
    assert_eq!(p.timestamp(), Some(1000));

    let p = PushPayload::decode(br#"{"token":"x","timestamp":0}"#).unwrap();
    assert_eq!(p.timestamp(), None);
}

#[test]
fn push_payload_malformed() {
    assert!(matches!(
        PushPayload::decode(b"{not json"),
        Err(WireError::Json(_))
    ));
    assert!(PushPayload::decode(br#"{"t":"warm"}"#).is_err());
}

#[test]
fn weather_message_missing_fields() {
    let msg = WeatherMessage::decode(4, br#"{"t": 12.5, "name": "roof"}"#).unwrap();
    assert_eq!(msg.station, 4);
    assert_eq!(msg.name, "roof");
    assert_eq!(msg.t, 12.5);
    assert_eq!(msg.hum, 0.0);
    assert_eq!(msg.timestamp(), None);
}

#[test]
fn weather_message_ignores_node_field() {
    let msg = WeatherMessage::decode(4, br#"{"node": 99, "timestamp": 1.7e9}"#).unwrap();
    assert_eq!(msg.station, 4);
    assert_eq!(msg.timestamp, 1_700_000_000);
}

#[test]
fn published_message_is_its_own_echo() {
    let reading = Reading {
        station: 2,
        timestamp: 1_700_000_123,
        temperature: 19.37,
        humidity: 55.1,
        pressure: 98_765.4,
    };
    let sent = WeatherMessage::from_reading(&reading, "garden");
    let payload = sent.encode().unwrap();
    let received = WeatherMessage::decode(2, &payload).unwrap();
    assert_eq!(sent, received);
    assert_eq!(received.to_reading(reading.timestamp), reading);
}

#[test]
fn lightning_message() {
    let msg = LightningMessage::decode(8, br#"{"distance": 12}"#).unwrap();
    assert_eq!(msg.timestamp(), None);
    let strike = msg.to_lightning(55);
    assert_eq!(strike.station, 8);
    assert_eq!(strike.distance, 12.0);
    assert_eq!(strike.timestamp, 55);
}
