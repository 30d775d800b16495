use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::client_ip::is_public_ip;

pub const IP_SKIPPED_MESSAGE: &str = "Local or private IP - no geo lookup";
pub const IP_FAILED_MESSAGE: &str = "Failed to get geo info";
pub const PLACE_FAILED_MESSAGE: &str = "Reverse geocoding failed";

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Geolocation request failed: {0}")]
    Request(String),

    #[error("Geolocation response could not be decoded: {0}")]
    Decode(String),
}

/// Coarse location of an IP address. Fields the service omits are empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IpLocation {
    pub city: String,
    pub region: String,
    pub country: String,
}

/// Place resolved from browser coordinates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Place {
    pub display_name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

/// Outcome of the IP lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IpGeo {
    /// Private or local address, no request made.
    Skipped,
    /// Transport or decode failure.
    Failed,
    /// Service answered with a non-200 status.
    Unavailable,
    Located(IpLocation),
}

impl IpGeo {
    pub fn location(&self) -> Option<&IpLocation> {
        match self {
            Self::Located(location) => Some(location),
            _ => None,
        }
    }
}

impl Serialize for IpGeo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Skipped => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("info", IP_SKIPPED_MESSAGE)?;
                map.end()
            }
            Self::Failed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", IP_FAILED_MESSAGE)?;
                map.end()
            }
            Self::Unavailable => serializer.serialize_map(Some(0))?.end(),
            Self::Located(location) => location.serialize(serializer),
        }
    }
}

/// Outcome of an attempted reverse geocode. "Not attempted" is
/// `Option::<PlaceGeo>::None` at the call site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceGeo {
    Failed,
    /// Service answered with a non-200 status.
    Empty,
    Found(Place),
}

impl PlaceGeo {
    pub fn place(&self) -> Option<&Place> {
        match self {
            Self::Found(place) => Some(place),
            _ => None,
        }
    }
}

impl Serialize for PlaceGeo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Failed => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", PLACE_FAILED_MESSAGE)?;
                map.end()
            }
            Self::Empty => serializer.serialize_map(Some(0))?.end(),
            Self::Found(place) => place.serialize(serializer),
        }
    }
}

/// IP to place lookup. `Ok(None)` means the service answered without usable data.
#[async_trait]
pub trait IpGeolocator: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<Option<IpLocation>, GeoError>;
}

/// Coordinates to place lookup. `Ok(None)` means the service answered without usable data.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<Place>, GeoError>;
}

pub async fn resolve_by_ip(geolocator: &dyn IpGeolocator, ip: &str) -> IpGeo {
    if !is_public_ip(ip) {
        return IpGeo::Skipped;
    }
    match geolocator.lookup(ip).await {
        Ok(Some(location)) => IpGeo::Located(location),
        Ok(None) => IpGeo::Unavailable,
        Err(e) => {
            tracing::warn!("IP geolocation for {ip} failed: {e}");
            IpGeo::Failed
        }
    }
}

pub async fn resolve_by_coordinates(
    geocoder: &dyn ReverseGeocoder,
    lat: f64,
    lon: f64,
) -> PlaceGeo {
    match geocoder.reverse(lat, lon).await {
        Ok(Some(place)) => PlaceGeo::Found(place),
        Ok(None) => PlaceGeo::Empty,
        Err(e) => {
            tracing::warn!("Reverse geocoding of ({lat}, {lon}) failed: {e}");
            PlaceGeo::Failed
        }
    }
}

// --- ipinfo.io implementation ---

pub struct IpInfoClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl IpInfoClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn lookup_url(&self, ip: &str) -> Result<Url, GeoError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| GeoError::Request(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| GeoError::Request(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .push(ip)
            .push("json");
        Ok(url)
    }
}

#[derive(Deserialize)]
struct IpInfoResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[async_trait]
impl IpGeolocator for IpInfoClient {
    async fn lookup(&self, ip: &str) -> Result<Option<IpLocation>, GeoError> {
        let resp = self
            .client
            .get(self.lookup_url(ip)?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GeoError::Request(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Ok(None);
        }

        let body = resp
            .json::<IpInfoResponse>()
            .await
            .map_err(|e| GeoError::Decode(e.to_string()))?;

        Ok(Some(IpLocation {
            city: body.city.unwrap_or_default(),
            region: body.region.unwrap_or_default(),
            country: body.country.unwrap_or_default(),
        }))
    }
}

// --- Nominatim implementation ---

pub struct NominatimClient {
    base_url: String,
    user_agent: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl NominatimClient {
    pub fn new(base_url: String, user_agent: String, timeout: Duration) -> Self {
        Self {
            base_url,
            user_agent,
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Deserialize, Default)]
struct NominatimAddress {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    town: Option<String>,
    #[serde(default)]
    village: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl From<NominatimResponse> for Place {
    fn from(resp: NominatimResponse) -> Self {
        let address = resp.address.unwrap_or_default();
        let city = [address.city, address.town, address.village]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty());

        Self {
            display_name: resp.display_name,
            city,
            region: address.state,
            country: address.country,
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<Place>, GeoError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("format", "json".to_string()),
            ])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| GeoError::Request(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Ok(None);
        }

        let body = resp
            .json::<NominatimResponse>()
            .await
            .map_err(|e| GeoError::Decode(e.to_string()))?;

        Ok(Some(Place::from(body)))
    }
}

// --- Mock implementations for testing ---
