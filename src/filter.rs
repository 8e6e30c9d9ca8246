//! Plausibility filter: rejects readings no real sensor can produce.
//!
//! Pressure has to be normalized to Pa (see [`normalize`]) before the check.

use stratus::Reading;

use crate::config::Plausibility as Limits;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Implausible {
    #[error("temperature {0} degC out of range")]
    Temperature(f32),
    #[error("humidity {0} % out of range")]
    Humidity(f32),
    #[error("pressure {0} hPa out of range")]
    Pressure(f32),
    #[error("rain amount {0} mm out of range")]
    Rain(f32),
}

/// Scales a pressure that looks like hPa (mbar) to Pa.
///
/// Anything below `hpa_threshold` is taken to be hPa. This misreads a genuine
/// Pa value below the threshold (~100 hPa, well above the stratosphere).
pub fn normalize_pressure(pressure: f32, hpa_threshold: f32) -> f32 {
    if pressure < hpa_threshold {
        pressure * 100.0
    } else {
        pressure
    }
}

pub fn normalize(reading: Reading, limits: &Limits) -> Reading {
    Reading {
        pressure: normalize_pressure(reading.pressure, limits.hpa_threshold),
        ..reading
    }
}

/// A pressure of exactly zero means "not measured" and passes.
pub fn check(reading: &Reading, limits: &Limits) -> Result<(), Implausible> {
    if !(limits.temperature_min..=limits.temperature_max).contains(&reading.temperature) {
        return Err(Implausible::Temperature(reading.temperature));
    }
    if !(limits.humidity_min..=limits.humidity_max).contains(&reading.humidity) {
        return Err(Implausible::Humidity(reading.humidity));
    }
    let hpa = reading.pressure / 100.0;
    if hpa != 0.0 && !(limits.pressure_min_hpa..=limits.pressure_max_hpa).contains(&hpa) {
        // We are not a submarine!
        return Err(Implausible::Pressure(hpa));
    }
    Ok(())
}

pub fn is_plausible(reading: &Reading, limits: &Limits) -> bool {
    check(reading, limits).is_ok()
}

/// Rain amounts are never negative.
pub fn check_rain(millimeters: f32) -> Result<(), Implausible> {
    if millimeters.is_finite() && millimeters >= 0.0 {
        Ok(())
    } else {
        Err(Implausible::Rain(millimeters))
    }
}

pub fn is_plausible_rain(millimeters: f32) -> bool {
    check_rain(millimeters).is_ok()
}

#[cfg(test)]
mod test {
    use stratus::Reading;

    use super::*;

    fn reading(temperature: f32, humidity: f32, pressure: f32) -> Reading {
        Reading {
            station: 1,
            timestamp: 1,
            temperature,
            humidity,
            pressure,
        }
    }

    #[test]
    fn accepts_ordinary_weather() {
        let limits = Limits::default();
        assert!(is_plausible(&reading(21.3, 45.0, 96_500.0), &limits));
        assert!(is_plausible(&reading(-100.0, 0.0, 0.0), &limits));
        assert!(is_plausible(&reading(1000.0, 100.0, 200_000.0), &limits));
        assert!(is_plausible(&reading(0.0, 0.0, 1000.0), &limits));
    }

    #[test]
    fn rejects_out_of_range() {
        let limits = Limits::default();
        for t in [-100.1, 1000.5, f32::NAN] {
            assert!(
                matches!(
                    check(&reading(t, 50.0, 0.0), &limits),
                    Err(Implausible::Temperature(_))
                ),
                "temperature {t}"
            );
        }
        for hum in [-0.1, 100.1, f32::NAN] {
            assert!(!is_plausible(&reading(20.0, hum, 0.0), &limits), "humidity {hum}");
        }
        // 9.99 hPa and 2000.01 hPa
        for p in [999.0, 200_001.0, -5000.0] {
            assert!(matches!(
                check(&reading(20.0, 50.0, p), &limits),
                Err(Implausible::Pressure(_))
            ));
        }
    }

    #[test]
    fn hpa_is_scaled() {
        let limits = Limits::default();
        assert_eq!(normalize_pressure(1013.25, limits.hpa_threshold), 101_325.0);
        assert_eq!(normalize_pressure(9_999.0, limits.hpa_threshold), 999_900.0);
        assert_eq!(normalize_pressure(10_000.0, limits.hpa_threshold), 10_000.0);
        assert_eq!(normalize_pressure(0.0, limits.hpa_threshold), 0.0);

        let normalized = normalize(reading(20.0, 50.0, 950.0), &limits);
        assert_eq!(normalized.pressure, 95_000.0);
        assert!(is_plausible(&normalized, &limits));
    }

    #[test]
    fn custom_limits() {
        let limits = Limits {
            temperature_max: 60.0,
            ..Limits::default()
        };
        assert!(!is_plausible(&reading(61.0, 50.0, 0.0), &limits));
    }

    #[test]
    fn rain() {
        assert!(is_plausible_rain(0.0));
        assert!(is_plausible_rain(12.4));
        assert!(!is_plausible_rain(-0.1));
        assert!(!is_plausible_rain(f32::INFINITY));
    }
}
