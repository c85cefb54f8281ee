use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::upstream::{
    client::FetchError,
    gateway::{AggregateError, WeatherGateway},
    LogicalRequest,
};

const DEFAULT_LOCATION: &str = "London";
const DEFAULT_FORECAST_DAYS: u32 = 7;
const MAX_FORECAST_DAYS: u32 = 16;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<WeatherGateway>,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DailyForecastQuery {
    pub location: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AirQualityQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub locations: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn fetch_error_response(error: &FetchError) -> ApiError {
    let status = match error {
        FetchError::UpstreamRejected(_) | FetchError::UpstreamUnreachable(_) => {
            StatusCode::BAD_GATEWAY
        }
        FetchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FetchError::RequestConstruction(_) => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

fn aggregate_error_response(error: &AggregateError) -> ApiError {
    let (status, _) = fetch_error_response(&error.source);
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
}

// Upstream documents pass through with the same field renaming the public
// API has always done.
fn shape_current(document: &Value) -> Value {
    json!({
        "location": document["name"],
        "temperature": document["main"]["temp"],
        "description": document["weather"][0]["description"],
        "humidity": document["main"]["humidity"],
        "windSpeed": document["wind"]["speed"],
    })
}

fn shape_forecast(document: &Value) -> Value {
    json!({
        "city": document["city"],
        "forecasts": document["list"],
    })
}

fn parse_locations(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn current_weather(
    State(state): State<AppState>,
    Query(params): Query<LocationQuery>,
) -> Result<Json<Value>, ApiError> {
    let location = params.location.unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let request = LogicalRequest::current_weather(&location);

    match state.gateway.fetch_cached(&request).await {
        Ok(document) => Ok(Json(shape_current(&document))),
        Err(e) => {
            tracing::error!("current weather lookup for {location} failed: {e}");
            Err(fetch_error_response(&e))
        }
    }
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(params): Query<LocationQuery>,
) -> Result<Json<Value>, ApiError> {
    let location = params.location.unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let request = LogicalRequest::forecast(&location);

    match state.gateway.fetch_cached(&request).await {
        Ok(document) => Ok(Json(shape_forecast(&document))),
        Err(e) => {
            tracing::error!("forecast lookup for {location} failed: {e}");
            Err(fetch_error_response(&e))
        }
    }
}

pub async fn daily_forecast(
    State(state): State<AppState>,
    Query(params): Query<DailyForecastQuery>,
) -> Result<Json<Value>, ApiError> {
    let location = params.location.unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let days = params
        .days
        .unwrap_or(DEFAULT_FORECAST_DAYS)
        .min(MAX_FORECAST_DAYS);
    let request = LogicalRequest::daily_forecast(&location, days);

    match state.gateway.fetch_cached(&request).await {
        Ok(document) => Ok(Json(shape_forecast(&document))),
        Err(e) => {
            tracing::error!("daily forecast lookup for {location} failed: {e}");
            Err(fetch_error_response(&e))
        }
    }
}

pub async fn air_quality(
    State(state): State<AppState>,
    Query(params): Query<AirQualityQuery>,
) -> Result<Json<Value>, ApiError> {
    let request = LogicalRequest::air_quality(params.lat, params.lon);

    match state.gateway.fetch_cached(&request).await {
        Ok(document) => Ok(Json(document)),
        Err(e) => {
            tracing::error!(
                "air quality lookup for ({}, {}) failed: {e}",
                params.lat,
                params.lon
            );
            Err(fetch_error_response(&e))
        }
    }
}

/// Combined current + forecast view; both fetches run concurrently and the
/// call fails whole when either side fails.
pub async fn details(
    State(state): State<AppState>,
    Query(params): Query<LocationQuery>,
) -> Result<Json<Value>, ApiError> {
    let location = params.location.unwrap_or_else(|| DEFAULT_LOCATION.to_string());
    let requests = vec![
        LogicalRequest::current_weather(&location),
        LogicalRequest::forecast(&location),
    ];

    match state.gateway.fetch_all(&requests).await {
        Ok(documents) => Ok(Json(json!({
            "current": shape_current(&documents[0]),
            "forecast": shape_forecast(&documents[1]),
        }))),
        Err(e) => {
            tracing::error!("details lookup for {location} failed: {e}");
            Err(aggregate_error_response(&e))
        }
    }
}

/// Current weather for several locations at once. Any single member failure
/// fails the whole batch; there is deliberately no partial-success shape.
pub async fn batch_weather(
    State(state): State<AppState>,
    Query(params): Query<BatchQuery>,
) -> Result<Json<Value>, ApiError> {
    let locations = parse_locations(&params.locations);
    if locations.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "locations must name at least one location".to_string(),
            }),
        ));
    }

    let requests: Vec<LogicalRequest> = locations
        .iter()
        .map(|location| LogicalRequest::current_weather(location))
        .collect();

    match state.gateway.fetch_all(&requests).await {
        Ok(documents) => {
            let results: Vec<Value> = documents.iter().map(shape_current).collect();
            Ok(Json(json!({ "results": results })))
        }
        Err(e) => {
            tracing::error!("batch weather lookup failed: {e}");
            Err(aggregate_error_response(&e))
        }
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/weather", get(current_weather))
        .route("/forecast", get(forecast))
        .route("/forecast/daily", get(daily_forecast))
        .route("/air-quality", get(air_quality))
        .route("/details", get(details))
        .route("/batch", get(batch_weather))
        .with_state(state)
}
