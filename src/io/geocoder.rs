//! Address geocoding
//!
//! `Geocoder` resolves a free-text address to a point. The Nominatim
//! client talks to any Nominatim-compatible search endpoint; the static
//! geocoder answers from the `[geocoder.places]` table in config.

use crate::domain::error::{GeofenceError, Result};
use crate::domain::geo::Point;
use crate::infra::config::{normalize_address, Config, GeocoderProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Resolves addresses to coordinates
///
/// `Ok(None)` means the service answered but knows no such place.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Point>>;
}

/// Build the geocoder selected in config
pub fn from_config(config: &Config) -> Result<Arc<dyn Geocoder>> {
    match config.geocoder_provider() {
        GeocoderProvider::Nominatim => Ok(Arc::new(NominatimGeocoder::new(
            config.geocoder_url(),
            config.geocoder_user_agent(),
            Duration::from_millis(config.geocoder_timeout_ms()),
        )?)),
        GeocoderProvider::Static => {
            Ok(Arc::new(StaticGeocoder::new(config.geocoder_places().clone())))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Parse a Nominatim `/search?format=json` response body
fn parse_search_response(body: &str) -> Result<Option<Point>> {
    let results: Vec<SearchResult> = serde_json::from_str(body)
        .map_err(|e| GeofenceError::Geocoding(format!("unexpected response: {e}")))?;

    let Some(first) = results.into_iter().next() else {
        return Ok(None);
    };

    let lat = first.lat.trim().parse::<f64>();
    let lng = first.lon.trim().parse::<f64>();
    let (Ok(lat), Ok(lng)) = (lat, lng) else {
        return Err(GeofenceError::Geocoding(format!(
            "unparsable coordinates: {}, {}",
            first.lat, first.lon
        )));
    };

    let point = Point::new(lat, lng)
        .map_err(|e| GeofenceError::Geocoding(format!("service returned {e}")))?;
    debug!(display_name = ?first.display_name, point = %point, "geocode_match");
    Ok(Some(point))
}

/// HTTP client for Nominatim-compatible search APIs
pub struct NominatimGeocoder {
    client: reqwest::Client,
    search_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        // One client for the whole process (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeofenceError::Geocoding(e.to_string()))?;

        Ok(Self { client, search_url: format!("{}/search", base_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Point>> {
        let start = Instant::now();

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "geocode_request_failed");
                GeofenceError::Geocoding(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status.as_u16(), "geocode_http_error");
            return Err(GeofenceError::Geocoding(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| GeofenceError::Geocoding(e.to_string()))?;
        let result = parse_search_response(&body)?;

        info!(
            found = %result.is_some(),
            latency_ms = %start.elapsed().as_millis(),
            "geocode_complete"
        );
        Ok(result)
    }
}

/// Lookup table geocoder for offline use and tests
pub struct StaticGeocoder {
    places: HashMap<String, Point>,
}

impl StaticGeocoder {
    /// Keys are normalized on the way in
    pub fn new(places: HashMap<String, Point>) -> Self {
        let places = places.into_iter().map(|(k, v)| (normalize_address(&k), v)).collect();
        Self { places }
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Point>> {
        Ok(self.places.get(&normalize_address(address)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"[{"place_id": 1, "lat": "4.7110", "lon": "-74.0721", "display_name": "Bogotá"}]"#;
        let point = parse_search_response(body).unwrap().unwrap();
        assert_eq!(point.lat(), 4.7110);
        assert_eq!(point.lng(), -74.0721);
    }

    #[test]
    fn test_parse_search_response_empty() {
        assert_eq!(parse_search_response("[]").unwrap(), None);
    }

    #[test]
    fn test_parse_search_response_invalid() {
        assert!(matches!(parse_search_response("<html>"), Err(GeofenceError::Geocoding(_))));
        assert!(matches!(
            parse_search_response(r#"[{"lat": "abc", "lon": "1"}]"#),
            Err(GeofenceError::Geocoding(_))
        ));
        assert!(matches!(
            parse_search_response(r#"[{"lat": "95", "lon": "1"}]"#),
            Err(GeofenceError::Geocoding(_))
        ));
    }

    #[tokio::test]
    async fn test_static_geocoder() {
        let mut places = HashMap::new();
        places.insert("Plaza de Bolívar, Bogotá".to_string(), Point::new(4.5981, -74.0761).unwrap());
        let geocoder = StaticGeocoder::new(places);

        let hit = geocoder.geocode("  plaza de  bolívar, BOGOTÁ ").await.unwrap();
        assert_eq!(hit, Some(Point::new(4.5981, -74.0761).unwrap()));
        assert_eq!(geocoder.geocode("Atlantis").await.unwrap(), None);
    }

    #[test]
    fn test_nominatim_search_url() {
        let geocoder =
            NominatimGeocoder::new("https://example.org/", "test", Duration::from_secs(1)).unwrap();
        assert_eq!(geocoder.search_url, "https://example.org/search");
    }
}
