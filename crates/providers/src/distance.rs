//! Service-area distance resolution
//!
//! Three strategies, tried in order by [`ServiceAreaResolver`]:
//! 1. Paid distance-matrix API (road distance, live traffic durations)
//! 2. Free geocoding + routing (Nominatim then OSRM)
//! 3. Straight-line haversine between geocoded points, with duration
//!    estimated at 40 km/h average suburban speed
//!
//! Every provider treats an empty address as a validation error, never as
//! zero distance; a silent zero would wrongly pass the service-area gate.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use leadline_core::{DistanceProvider, DistanceResult, Error, Result};

use crate::retry::{classify_reqwest, classify_status, with_retry, RetryPolicy};

const EARTH_RADIUS_KM: f64 = 6_371.0;
const FALLBACK_SPEED_KMH: f64 = 40.0;

/// Great-circle distance in km.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

fn validate_addresses(origin: &str, destination: &str) -> Result<()> {
    if origin.trim().is_empty() || destination.trim().is_empty() {
        return Err(Error::Validation(
            "origin and destination addresses must be non-empty".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Distance-matrix API
// ---------------------------------------------------------------------------

/// Google-style distance-matrix client. Primary provider when an API key
/// is configured.
pub struct MatrixProvider {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Deserialize)]
struct MatrixResponse {
    rows: Vec<MatrixRow>,
    status: String,
}

#[derive(Deserialize)]
struct MatrixRow {
    elements: Vec<MatrixElement>,
}

#[derive(Deserialize)]
struct MatrixElement {
    status: String,
    #[serde(default)]
    distance: Option<MetricValue>,
    #[serde(default)]
    duration: Option<MetricValue>,
}

#[derive(Deserialize)]
struct MetricValue {
    /// Meters for distance, seconds for duration.
    value: f64,
}

impl MatrixProvider {
    const NAME: &'static str = "distance_matrix";

    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl DistanceProvider for MatrixProvider {
    async fn resolve(&self, origin: &str, destination: &str) -> Result<DistanceResult> {
        validate_addresses(origin, destination)?;

        let url = url::Url::parse_with_params(
            "https://maps.googleapis.com/maps/api/distancematrix/json",
            &[
                ("origins", origin),
                ("destinations", destination),
                ("units", "metric"),
                ("key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| Error::permanent(Self::NAME, e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest(Self::NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Self::NAME, status, &body));
        }

        let parsed: MatrixResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(Self::NAME, format!("malformed response: {e}")))?;

        if parsed.status != "OK" {
            return Err(Error::permanent(
                Self::NAME,
                format!("API status {}", parsed.status),
            ));
        }

        let element = parsed
            .rows
            .first()
            .and_then(|r| r.elements.first())
            .ok_or_else(|| Error::permanent(Self::NAME, "empty matrix response"))?;

        if element.status != "OK" {
            return Err(Error::permanent(
                Self::NAME,
                format!("element status {}", element.status),
            ));
        }

        let (distance, duration) = match (&element.distance, &element.duration) {
            (Some(d), Some(t)) => (d.value, t.value),
            _ => return Err(Error::permanent(Self::NAME, "element missing metrics")),
        };

        Ok(DistanceResult {
            distance_km: distance / 1_000.0,
            duration_minutes: (duration / 60.0).ceil() as u32,
            origin: origin.to_string(),
            destination: destination.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

// ---------------------------------------------------------------------------
// Free geocode + route fallback
// ---------------------------------------------------------------------------

/// Nominatim geocoding plus OSRM routing. When routing fails after both
/// endpoints geocoded, degrades to haversine at 40 km/h.
pub struct GeocodeRouteProvider {
    client: reqwest::Client,
    /// Nominatim requires an identifying user agent.
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
}

impl GeocodeRouteProvider {
    const NAME: &'static str = "geocode_route";

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            user_agent: "leadline/0.1 (lead intake service)".to_string(),
        }
    }

    /// Geocode one address, biased to Australia.
    pub async fn geocode(&self, address: &str) -> Result<(f64, f64)> {
        let url = url::Url::parse_with_params(
            "https://nominatim.openstreetmap.org/search",
            &[
                ("q", address),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", "au"),
            ],
        )
        .map_err(|e| Error::permanent(Self::NAME, e.to_string()))?;

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| classify_reqwest(Self::NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Self::NAME, status, &body));
        }

        let hits: Vec<GeocodeHit> = response
            .json()
            .await
            .map_err(|e| Error::permanent(Self::NAME, format!("malformed geocode: {e}")))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| Error::permanent(Self::NAME, format!("no geocode hit for {address}")))?;

        let lat = hit
            .lat
            .parse::<f64>()
            .map_err(|e| Error::permanent(Self::NAME, format!("bad latitude: {e}")))?;
        let lng = hit
            .lon
            .parse::<f64>()
            .map_err(|e| Error::permanent(Self::NAME, format!("bad longitude: {e}")))?;
        Ok((lat, lng))
    }

    async fn route(&self, from: (f64, f64), to: (f64, f64)) -> Result<(f64, f64)> {
        let url = format!(
            "https://router.project-osrm.org/route/v1/driving/{},{};{},{}?overview=false",
            from.1, from.0, to.1, to.0
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest(Self::NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Self::NAME, status, &body));
        }

        let parsed: OsrmResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent(Self::NAME, format!("malformed route: {e}")))?;

        if parsed.code != "Ok" {
            return Err(Error::permanent(
                Self::NAME,
                format!("routing status {}", parsed.code),
            ));
        }

        parsed
            .routes
            .into_iter()
            .next()
            .map(|r| (r.distance / 1_000.0, r.duration / 60.0))
            .ok_or_else(|| Error::permanent(Self::NAME, "no route found"))
    }
}

#[async_trait]
impl DistanceProvider for GeocodeRouteProvider {
    async fn resolve(&self, origin: &str, destination: &str) -> Result<DistanceResult> {
        validate_addresses(origin, destination)?;

        let from = self.geocode(origin).await?;
        let to = self.geocode(destination).await?;

        let (distance_km, duration_min) = match self.route(from, to).await {
            Ok(route) => route,
            Err(err) => {
                // Both points geocoded; straight-line is good enough for a
                // service-area decision.
                warn!(error = %err, "routing failed, estimating from haversine");
                let km = haversine_km(from.0, from.1, to.0, to.1);
                (km, km / FALLBACK_SPEED_KMH * 60.0)
            }
        };

        debug!(origin, destination, distance_km, "distance resolved");
        Ok(DistanceResult {
            distance_km,
            duration_minutes: duration_min.ceil() as u32,
            origin: origin.to_string(),
            destination: destination.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

// ---------------------------------------------------------------------------
// Resolver chain
// ---------------------------------------------------------------------------

/// Tries each provider in order, collecting per-provider failures. The
/// final error names every attempt so an operator can see which links of
/// the chain are down. Transient failures are retried under the shared
/// backoff policy before the chain moves on; a permanent failure skips
/// straight to the next provider.
pub struct ServiceAreaResolver {
    providers: Vec<Arc<dyn DistanceProvider>>,
    retry: RetryPolicy,
}

impl ServiceAreaResolver {
    pub fn new(providers: Vec<Arc<dyn DistanceProvider>>) -> Self {
        Self::with_policy(providers, RetryPolicy::default())
    }

    pub fn with_policy(providers: Vec<Arc<dyn DistanceProvider>>, retry: RetryPolicy) -> Self {
        Self { providers, retry }
    }

    pub async fn resolve(&self, origin: &str, destination: &str) -> Result<DistanceResult> {
        validate_addresses(origin, destination)?;

        let mut failures = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let attempt = with_retry(self.retry, provider.name(), || {
                provider.resolve(origin, destination)
            })
            .await;
            match attempt {
                Ok(result) => {
                    debug!(provider = provider.name(), km = result.distance_km, "resolved");
                    return Ok(result);
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "distance provider failed");
                    failures.push(format!("{}: {err}", provider.name()));
                }
            }
        }

        Err(Error::permanent(
            "service_area",
            format!("all distance providers failed [{}]", failures.join("; ")),
        ))
    }
}
