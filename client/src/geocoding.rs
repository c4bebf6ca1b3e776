use std::time::Duration;

use serde::Deserialize;
use trip_diary_lib::coordinate::Coordinate;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("no usable name in response")]
    Unnamed,
}

/// Turns a coordinate into something a person would call the place.
/// Never fails: anything that goes wrong yields the coordinate's fallback name.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, coords: Coordinate) -> String;
}

#[derive(Debug, Default, Deserialize)]
pub struct NominatimAddress {
    pub road: Option<String>,
    pub neighbourhood: Option<String>,
    pub suburb: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NominatimResponse {
    pub display_name: Option<String>,
    pub address: Option<NominatimAddress>,
}

/// "road, neighbourhood, suburb, city" from whichever parts are present,
/// else the full display name.
pub fn place_name(response: &NominatimResponse) -> Option<String> {
    if let Some(address) = &response.address {
        let locality = address.city.as_ref().or(address.town.as_ref()).or(address.village.as_ref());
        let parts: Vec<&str> = [address.road.as_ref(), address.neighbourhood.as_ref(), address.suburb.as_ref(), locality]
            .into_iter()
            .flatten()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect();

        if !parts.is_empty() {
            return Some(parts.join(", "));
        }
    }

    response
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().user_agent(user_agent).timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn lookup(&self, coords: Coordinate) -> Result<String, GeocodeError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "json".to_string()),
                ("lat", coords.lat.to_string()),
                ("lon", coords.lon.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<NominatimResponse>()
            .await?;

        place_name(&response).ok_or(GeocodeError::Unnamed)
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, coords: Coordinate) -> String {
        match self.lookup(coords).await {
            Ok(name) => name,
            Err(err) => {
                tracing::debug!("Reverse lookup of {} failed: {}", coords, err);
                coords.fallback_name()
            }
        }
    }
}

/// For running without network access.
pub struct OfflineGeocoder;

#[async_trait::async_trait]
impl Geocoder for OfflineGeocoder {
    async fn resolve(&self, coords: Coordinate) -> String {
        coords.fallback_name()
    }
}

#[test]
fn place_name_prefers_address_parts() {
    let response: NominatimResponse = serde_json::from_str(
        r#"{
            "display_name": "12, Banegårdspladsen, Midtbyen, Aarhus, Denmark",
            "address": { "road": "Banegårdspladsen", "suburb": "Midtbyen", "town": "Aarhus", "country": "Denmark" }
        }"#,
    )
    .unwrap();

    assert_eq!(place_name(&response).unwrap(), "Banegårdspladsen, Midtbyen, Aarhus");
}

#[test]
fn place_name_falls_back_to_display_name() {
    let response: NominatimResponse =
        serde_json::from_str(r#"{ "display_name": "Somewhere at sea", "address": { "country": "Denmark" } }"#).unwrap();
    assert_eq!(place_name(&response).unwrap(), "Somewhere at sea");

    assert_eq!(place_name(&NominatimResponse::default()), None);
}

#[tokio::test]
async fn offline_geocoder_uses_fallback_name() {
    let coords = Coordinate::new(12.5, -3.25);
    assert_eq!(OfflineGeocoder.resolve(coords).await, "Location near (12.5000, -3.2500)");
}
