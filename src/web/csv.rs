//! Plain text renderings served by the read endpoints.
//!
//! Values are printed with two decimals, header lines start with `#`.

use stratus::{Lightning, RainGauge, RainReading, Reading, Station, StationID};

pub const READING_COLUMNS: &str = "# Timestamp, Temperature, Humidity, Pressure\n";
pub const READING_UNITS: &str = "# Seconds, degree C, % rel, Pa\n";

pub fn stations(stations: &[Station]) -> String {
    let mut out = String::from("# Id,Name,Location,Description\n");
    out.extend(stations.iter().map(|s| {
        format!("{},{},{},{}\n", s.id, s.name, s.location, s.description)
    }));
    out
}

pub fn gauges(gauges: &[RainGauge]) -> String {
    let mut out = String::from("# Id,Name,Location,Description\n");
    out.extend(
        gauges
            .iter()
            .map(|g| format!("{},{},{},{}\n", g.id, g.name, g.location, g.description)),
    );
    out
}

/// latest reading per station
pub fn current(readings: &[Reading]) -> String {
    let mut out = String::from("# Station, Timestamp, Temperature, Humidity, Pressure\n");
    out.extend(readings.iter().map(|r| {
        format!(
            "{},{},{:.2},{:.2},{:.2}\n",
            r.station, r.timestamp, r.temperature, r.humidity, r.pressure
        )
    }));
    out
}

pub fn reading_row(r: &Reading) -> String {
    format!(
        "{},{:.2},{:.2},{:.2}\n",
        r.timestamp, r.temperature, r.humidity, r.pressure
    )
}

/// station description followed by its readings
pub fn station_series(station: &Station, readings: &[Reading]) -> String {
    let mut out = format!(
        "## Station {}: '{}' in {}, {}\n{READING_COLUMNS}{READING_UNITS}",
        station.id, station.name, station.location, station.description
    );
    out.extend(readings.iter().map(reading_row));
    out
}

pub fn gauge_series(gauge: &RainGauge, readings: &[RainReading]) -> String {
    let mut out = format!(
        "## Rain gauge {}: '{}' in {}, {}\n# Timestamp, Millimeters\n",
        gauge.id, gauge.name, gauge.location, gauge.description
    );
    out.extend(
        readings
            .iter()
            .map(|r| format!("{},{:.2}\n", r.timestamp, r.millimeters)),
    );
    out
}

/// `name` looks up the station name for a strike
pub fn lightnings<'a>(
    strikes: &[Lightning],
    now: i64,
    name: impl Fn(StationID) -> &'a str,
) -> String {
    let mut out = String::from("# Station, Name, Timestamp, Distance, Ago\n");
    out.extend(strikes.iter().map(|l| {
        format!(
            "{},{},{},{:.2},{}\n",
            l.station,
            name(l.station),
            l.timestamp,
            l.distance,
            ago(now - l.timestamp)
        )
    }));
    out
}

/// A calendar range export, `month` and `day` narrow it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Export {
    pub station: StationID,
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl Export {
    /// `station_<id>-<year>[-<month>][-<day>].csv`
    pub fn filename(&self) -> String {
        let mut name = format!("station_{:02}-{:04}", self.station, self.year);
        if let Some(month) = self.month {
            name += &format!("-{month:02}");
        }
        if let Some(day) = self.day {
            name += &format!("-{day:02}");
        }
        name + ".csv"
    }

    pub fn render(&self, station: &Station, readings: &[Reading]) -> String {
        let mut out = format!(
            "# Query station {} (id: {}) - {}\n# Location {}\n# Year: {}\n",
            station.name, station.id, station.description, station.location, self.year
        );
        if let Some(month) = self.month {
            out += &format!("# Month: {month}\n");
        }
        if let Some(day) = self.day {
            out += &format!("# Day: {day}\n");
        }
        out += &format!("# Datapoints: {}\n\n", readings.len());
        out += "# Timestamp,Temperature,Humidity,Pressure\n";
        out += "# [Unixtimestamp],[deg C],[% rel],[Pa]\n\n";
        out.extend(readings.iter().map(reading_row));
        out
    }
}

/// human readable age of something `delta` seconds old
pub fn ago(delta: i64) -> String {
    if delta <= 60 {
        return format!("{delta:2} seconds ago");
    }
    let (minutes, seconds) = (delta / 60, delta % 60);
    if minutes < 60 {
        return format!("{minutes:02}:{seconds:02} ago");
    }
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours < 24 {
        return format!("{hours:02}:{minutes:02}:{seconds:02} ago");
    }
    let (days, hours) = (hours / 24, hours % 24);
    if days < 3 {
        format!("{days:2} days, {hours:2} hours ago")
    } else {
        format!("{days} days ago")
    }
}
