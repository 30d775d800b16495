use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::device::parse_device_name;
use crate::geo::{self, IpGeo, IpGeolocator, PlaceGeo, ReverseGeocoder};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// Client-reported device metadata. Kept as an open JSON object so that
/// fields this service does not know about still reach the text log.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VisitorSubmission(Map<String, Value>);

impl VisitorSubmission {
    /// Lenient body parsing: anything that is not a JSON object is an empty submission.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Self(fields),
            _ => Self::default(),
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn nested(&self, object: &str, key: &str) -> Option<&Value> {
        self.0.get(object).and_then(|v| v.get(key))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.str_field("userAgent")
    }

    pub fn platform(&self) -> Option<&str> {
        self.str_field("platform")
    }

    pub fn language(&self) -> Option<&str> {
        self.str_field("language")
    }

    pub fn device_name(&self) -> Option<&str> {
        self.str_field("deviceName")
    }

    pub fn screen_width(&self) -> Option<i64> {
        self.0.get("screenWidth").and_then(Value::as_i64)
    }

    pub fn screen_height(&self) -> Option<i64> {
        self.0.get("screenHeight").and_then(Value::as_i64)
    }

    pub fn battery_level(&self) -> Option<f64> {
        self.nested("battery", "level").and_then(Value::as_f64)
    }

    pub fn charging(&self) -> Option<bool> {
        self.nested("battery", "charging").and_then(Value::as_bool)
    }

    pub fn lat(&self) -> Option<f64> {
        self.nested("location", "lat").and_then(Value::as_f64)
    }

    pub fn lon(&self) -> Option<f64> {
        self.nested("location", "lon").and_then(Value::as_f64)
    }

    /// Both coordinates, only when each is present and non-zero.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat().filter(|v| *v != 0.0)?;
        let lon = self.lon().filter(|v| *v != 0.0)?;
        Some((lat, lon))
    }

    fn set_device_name(&mut self, name: String) {
        self.0.insert("deviceName".to_string(), Value::String(name));
    }
}

/// Fully enriched visitor entry, written unchanged to both sinks.
#[derive(Clone, Debug, Serialize)]
pub struct VisitorRecord {
    pub timestamp: String,
    pub ip: String,
    pub location: IpGeo,
    pub browser_place: Option<PlaceGeo>,
    pub client_info: VisitorSubmission,
    #[serde(skip)]
    pub date: NaiveDate,
}

impl VisitorRecord {
    pub fn row(&self) -> VisitorRow {
        VisitorRow::from(self)
    }
}

/// Fixed relational projection of a [`VisitorRecord`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisitorRow {
    pub timestamp: String,
    pub ip: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub screen_width: Option<i64>,
    pub screen_height: Option<i64>,
    pub language: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub battery_level: Option<f64>,
    pub charging: Option<bool>,
    pub device_name: Option<String>,
    pub browser_city: Option<String>,
    pub browser_region: Option<String>,
    pub browser_country: Option<String>,
}

impl From<&VisitorRecord> for VisitorRow {
    fn from(record: &VisitorRecord) -> Self {
        let info = &record.client_info;
        let location = record.location.location();
        let place = record.browser_place.as_ref().and_then(PlaceGeo::place);

        Self {
            timestamp: record.timestamp.clone(),
            ip: record.ip.clone(),
            city: location.map(|l| l.city.clone()),
            region: location.map(|l| l.region.clone()),
            country: location.map(|l| l.country.clone()),
            user_agent: info.user_agent().map(str::to_string),
            platform: info.platform().map(str::to_string),
            screen_width: info.screen_width(),
            screen_height: info.screen_height(),
            language: info.language().map(str::to_string),
            lat: info.lat(),
            lon: info.lon(),
            battery_level: info.battery_level(),
            charging: info.charging(),
            device_name: info.device_name().map(str::to_string),
            browser_city: place.and_then(|p| p.city.clone()),
            browser_region: place.and_then(|p| p.region.clone()),
            browser_country: place.and_then(|p| p.country.clone()),
        }
    }
}

/// Enrich a submission into a [`VisitorRecord`]. Both lookups run concurrently.
pub async fn assemble(
    ip: &str,
    mut submission: VisitorSubmission,
    geolocator: &dyn IpGeolocator,
    geocoder: &dyn ReverseGeocoder,
    now: DateTime<Local>,
) -> VisitorRecord {
    let device_name = parse_device_name(submission.user_agent().unwrap_or(""));
    submission.set_device_name(device_name);

    let coordinates = submission.coordinates();
    let place_lookup = async {
        match coordinates {
            Some((lat, lon)) => Some(geo::resolve_by_coordinates(geocoder, lat, lon).await),
            None => None,
        }
    };
    let (location, browser_place) =
        tokio::join!(geo::resolve_by_ip(geolocator, ip), place_lookup);

    VisitorRecord {
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        ip: ip.to_string(),
        location,
        browser_place,
        client_info: submission,
        date: now.date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::geo::tests::{MockIpGeolocator, MockReverseGeocoder};
    use crate::geo::{IpLocation, Place};

    fn submission(value: Value) -> VisitorSubmission {
        VisitorSubmission::from_body(value.to_string().as_bytes())
    }

    fn afternoon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 15, 4, 5).unwrap()
    }

    #[test]
    fn test_from_body_tolerates_non_objects() {
        assert_eq!(VisitorSubmission::from_body(b""), VisitorSubmission::default());
        assert_eq!(VisitorSubmission::from_body(b"null"), VisitorSubmission::default());
        assert_eq!(VisitorSubmission::from_body(b"[1, 2]"), VisitorSubmission::default());
        assert_eq!(VisitorSubmission::from_body(b"{oops"), VisitorSubmission::default());
        let parsed = VisitorSubmission::from_body(br#"{"platform": "X"}"#);
        assert_eq!(parsed.platform(), Some("X"));
    }

    #[test]
    fn test_accessors_tolerate_absence_and_wrong_types() {
        let empty = VisitorSubmission::default();
        assert_eq!(empty.user_agent(), None);
        assert_eq!(empty.battery_level(), None);
        assert_eq!(empty.lat(), None);

        let odd = submission(json!({
            "userAgent": 42,
            "screenWidth": "wide",
            "battery": "full",
            "location": {"lat": "north", "lon": 2.0}
        }));
        assert_eq!(odd.user_agent(), None);
        assert_eq!(odd.screen_width(), None);
        assert_eq!(odd.charging(), None);
        assert_eq!(odd.lat(), None);
        assert_eq!(odd.lon(), Some(2.0));
    }

    #[test]
    fn test_coordinates_need_both_values() {
        assert_eq!(VisitorSubmission::default().coordinates(), None);
        assert_eq!(submission(json!({"location": {"lat": 1.0}})).coordinates(), None);
        assert_eq!(submission(json!({"location": {"lon": 2.0}})).coordinates(), None);
        assert_eq!(
            submission(json!({"location": {"lat": 0.0, "lon": 2.0}})).coordinates(),
            None
        );
        assert_eq!(
            submission(json!({"location": {"lat": 1.0, "lon": 2.0}})).coordinates(),
            Some((1.0, 2.0))
        );
    }

    #[tokio::test]
    async fn test_assemble_full_submission() {
        let geolocator = MockIpGeolocator {
            location: Some(IpLocation {
                city: "Paris".to_string(),
                region: "Ile-de-France".to_string(),
                country: "FR".to_string(),
            }),
            ..Default::default()
        };
        let geocoder = MockReverseGeocoder {
            place: Some(Place {
                display_name: Some("Somewhere".to_string()),
                city: Some("Lyon".to_string()),
                region: None,
                country: Some("France".to_string()),
            }),
            ..Default::default()
        };
        let input = submission(json!({
            "userAgent": "Foo (Bar)",
            "platform": "X",
            "location": {"lat": 1.0, "lon": 2.0},
            "extra": {"kept": true}
        }));

        let record = assemble("8.8.8.8", input, &geolocator, &geocoder, afternoon()).await;

        assert_eq!(record.timestamp, "2024-03-09 03:04:05 PM");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(record.client_info.device_name(), Some("Bar"));
        assert_eq!(
            serde_json::to_value(&record.client_info).unwrap()["extra"],
            json!({"kept": true})
        );
        assert_eq!(record.location.location().unwrap().city, "Paris");
        assert_eq!(
            record.browser_place.as_ref().and_then(PlaceGeo::place).unwrap().city.as_deref(),
            Some("Lyon")
        );
        assert_eq!(geocoder.calls.lock().unwrap().as_slice(), [(1.0, 2.0)]);
    }

    #[tokio::test]
    async fn test_assemble_without_coordinates_skips_reverse_geocode() {
        let geolocator = MockIpGeolocator::default();
        let geocoder = MockReverseGeocoder::default();
        let input = submission(json!({"location": {"lat": 1.0}}));

        let record = assemble("10.0.0.5", input, &geolocator, &geocoder, afternoon()).await;

        assert!(record.browser_place.is_none());
        assert_eq!(record.location, IpGeo::Skipped);
        assert_eq!(record.client_info.device_name(), Some("Unknown"));
        assert!(geocoder.calls.lock().unwrap().is_empty());
        assert!(geolocator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_json_layout() {
        let geolocator = MockIpGeolocator {
            should_fail: true,
            ..Default::default()
        };
        let geocoder = MockReverseGeocoder::default();
        let input = submission(json!({"userAgent": "A (B)", "location": {"lat": 1.0, "lon": 2.0}}));

        let record = assemble("8.8.4.4", input, &geolocator, &geocoder, afternoon()).await;
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(
            value,
            json!({
                "timestamp": "2024-03-09 03:04:05 PM",
                "ip": "8.8.4.4",
                "location": {"error": "Failed to get geo info"},
                "browser_place": {},
                "client_info": {
                    "deviceName": "B",
                    "location": {"lat": 1.0, "lon": 2.0},
                    "userAgent": "A (B)"
                }
            })
        );
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert!(!keys.iter().any(|k| k.as_str() == "date"));
    }

    #[tokio::test]
    async fn test_row_projection() {
        let geolocator = MockIpGeolocator {
            location: Some(IpLocation {
                city: "Paris".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let geocoder = MockReverseGeocoder {
            should_fail: true,
            ..Default::default()
        };
        let input = submission(json!({
            "userAgent": "Foo (Bar)",
            "platform": "X",
            "screenWidth": 1920,
            "screenHeight": 1080,
            "language": "en-US",
            "battery": {"level": 0.5, "charging": true},
            "location": {"lat": 1.0, "lon": 2.0},
            "ignored": "only in the text log"
        }));

        let record = assemble("8.8.8.8", input, &geolocator, &geocoder, afternoon()).await;
        let row = record.row();

        assert_eq!(row.timestamp, record.timestamp);
        assert_eq!(row.city.as_deref(), Some("Paris"));
        assert_eq!(row.region.as_deref(), Some(""));
        assert_eq!(row.screen_width, Some(1920));
        assert_eq!(row.screen_height, Some(1080));
        assert_eq!(row.battery_level, Some(0.5));
        assert_eq!(row.charging, Some(true));
        assert_eq!(row.device_name.as_deref(), Some("Bar"));
        assert_eq!(row.lat, Some(1.0));
        assert_eq!(row.lon, Some(2.0));
        assert_eq!(row.browser_city, None);
        assert_eq!(row.browser_country, None);
    }

    #[tokio::test]
    async fn test_row_keeps_single_coordinate() {
        let input = submission(json!({"location": {"lon": 2.0}}));
        let record = assemble(
            "127.0.0.1",
            input,
            &MockIpGeolocator::default(),
            &MockReverseGeocoder::default(),
            afternoon(),
        )
        .await;
        let row = record.row();
        assert_eq!(row.lat, None);
        assert_eq!(row.lon, Some(2.0));
        assert_eq!(row.city, None);
    }
}
