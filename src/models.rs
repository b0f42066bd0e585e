use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One GPS fix from the vendor's decoded point stream. The `timestamp` is
/// relative to the workout start, in vendor units of 100 ms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "verticalAccuracy", default)]
    pub vertical_accuracy: f64,
    #[serde(default)]
    pub timestamp: i64,
}

/// The store-ready representation of one workout. Built once per workout
/// and immutable afterwards; the same composite Keep identifier always
/// yields the same `id`.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalActivity {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(serialize_with = "store_utc")]
    pub start_date: DateTime<Utc>,
    #[serde(serialize_with = "store_utc")]
    pub end_date: DateTime<Utc>,
    #[serde(serialize_with = "store_naive")]
    pub start_date_local: NaiveDateTime,
    #[serde(serialize_with = "store_naive")]
    pub end_date_local: NaiveDateTime,
    /// Meters, as reported by the vendor.
    pub distance: f64,
    /// Device-reported moving duration, seconds.
    pub moving_time: i64,
    /// Wall-clock seconds between start and end timestamps.
    pub elapsed_time: i64,
    /// Meters per second, distance over moving duration.
    pub average_speed: f64,
    pub average_heartrate: Option<i64>,
    pub map: ActivityMap,
    pub start_latlng: Option<StartPoint>,
    pub location_country: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityMap {
    pub summary_polyline: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StartPoint {
    pub lat: f64,
    pub lon: f64,
}

// The store keeps timestamps as plain "YYYY-MM-DD HH:MM:SS" strings.
const STORE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn store_utc<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(STORE_TIME_FORMAT))
}

fn store_naive<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(STORE_TIME_FORMAT))
}
