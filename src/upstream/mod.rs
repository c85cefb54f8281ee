pub mod cache;
pub mod client;
pub mod gateway;
pub mod key;

use std::collections::BTreeMap;
use std::fmt;

/// Upstream OpenWeatherMap endpoints the gateway consumes. Each kind maps
/// to exactly one HTTP GET; batched lookups are modeled as several logical
/// requests at the aggregate level, never as a kind of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    CurrentWeather,
    Forecast,
    DailyForecast,
    AirQuality,
}

impl EndpointKind {
    pub fn path(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "/data/2.5/weather",
            Self::Forecast => "/data/2.5/forecast",
            Self::DailyForecast => "/data/2.5/forecast/daily",
            Self::AirQuality => "/data/2.5/air_pollution",
        }
    }

    /// Stable short name used in cache keys and log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "weather",
            Self::Forecast => "forecast",
            Self::DailyForecast => "forecast_daily",
            Self::AirQuality => "air_pollution",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One semantically distinct upstream query: an endpoint kind plus its
/// parameter set. Parameters are kept sorted so insertion order can never
/// leak into the derived cache key. The API key is not part of the logical
/// request; the client appends it when the wire request is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRequest {
    pub kind: EndpointKind,
    pub params: BTreeMap<String, String>,
}

impl LogicalRequest {
    pub fn new<I, K, V>(kind: EndpointKind, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind,
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn current_weather(location: &str) -> Self {
        Self::new(
            EndpointKind::CurrentWeather,
            [("q", location), ("units", "metric")],
        )
    }

    pub fn forecast(location: &str) -> Self {
        Self::new(EndpointKind::Forecast, [("q", location), ("units", "metric")])
    }

    pub fn daily_forecast(location: &str, days: u32) -> Self {
        Self::new(
            EndpointKind::DailyForecast,
            [
                ("q", location.to_string()),
                ("cnt", days.to_string()),
                ("units", "metric".to_string()),
            ],
        )
    }

    pub fn air_quality(lat: f64, lon: f64) -> Self {
        Self::new(
            EndpointKind::AirQuality,
            [("lat", lat.to_string()), ("lon", lon.to_string())],
        )
    }
}

impl fmt::Display for LogicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (name, value) in &self.params {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}
