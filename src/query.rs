//! Read side: clamped range queries and bucket-averaged downsampling for plots.

use stratus::{Reading, StationID};

use crate::store::{self, EntityStore};

#[derive(Clone)]
pub struct QueryEngine {
    store: EntityStore,
    max_limit: i64,
}

impl QueryEngine {
    /// `max_limit` is the most rows a single query returns
    pub fn new(store: EntityStore, max_limit: i64) -> Self {
        Self {
            store,
            max_limit: max_limit.max(1),
        }
    }

    /// Negative offsets count as 0. A limit that is not positive, or above the
    /// maximum, is the maximum.
    pub fn clamp(&self, limit: i64, offset: i64) -> (i64, i64) {
        let limit = if limit <= 0 || limit > self.max_limit {
            self.max_limit
        } else {
            limit
        };
        (limit, offset.max(0))
    }

    /// readings of `station` in `[tmin, tmax]`, oldest first
    pub fn query_range(
        &self,
        station: StationID,
        tmin: i64,
        tmax: i64,
        limit: i64,
        offset: i64,
    ) -> store::Result<Vec<Reading>> {
        let (limit, offset) = self.clamp(limit, offset);
        self.store
            .query_readings(station, tmin, tmax, limit, offset)
    }

    /// [`query_range`](Self::query_range) reduced to at most `points` readings
    pub fn plot(
        &self,
        station: StationID,
        tmin: i64,
        tmax: i64,
        points: usize,
    ) -> store::Result<Vec<Reading>> {
        let readings = self.query_range(station, tmin, tmax, self.max_limit, 0)?;
        Ok(downsample(&readings, points))
    }
}

#[derive(Clone, Copy, Default)]
struct Bucket {
    count: u32,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

/// Averages `readings` into at most `buckets` points.
///
/// The covered time span is cut into `buckets` windows of equal width. Each
/// window with members becomes one reading at the window's midpoint holding
/// the members' means; empty windows are skipped. Input that already fits is
/// returned unchanged.
pub fn downsample(readings: &[Reading], buckets: usize) -> Vec<Reading> {
    if readings.len() <= buckets {
        return readings.to_vec();
    }
    if buckets == 0 {
        return vec![];
    }
    let (Some(t0), Some(t1)) = (
        readings.iter().map(|r| r.timestamp).min(),
        readings.iter().map(|r| r.timestamp).max(),
    ) else {
        return vec![];
    };
    let width = (t1 - t0) as f64 / buckets as f64;
    let mut windows = vec![Bucket::default(); buckets];
    for reading in readings {
        let index = if width > 0.0 {
            (((reading.timestamp - t0) as f64 / width) as usize).min(buckets - 1)
        } else {
            0
        };
        let window = &mut windows[index];
        window.count += 1;
        window.temperature += f64::from(reading.temperature);
        window.humidity += f64::from(reading.humidity);
        window.pressure += f64::from(reading.pressure);
    }
    let station = readings[0].station;
    windows
        .iter()
        .enumerate()
        .filter(|(_, w)| w.count > 0)
        .map(|(i, w)| {
            let n = f64::from(w.count);
            Reading {
                station,
                timestamp: t0 + ((i as f64 + 0.5) * width).round() as i64,
                temperature: (w.temperature / n) as f32,
                humidity: (w.humidity / n) as f32,
                pressure: (w.pressure / n) as f32,
            }
        })
        .collect()
}
