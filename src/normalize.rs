use crate::keep_client::WorkoutDetail;
use crate::models::{ActivityMap, CanonicalActivity, PointSample, StartPoint};
use chrono::{DateTime, Duration, Offset, Utc};
use chrono_tz::Tz;
use geo::LineString;
use tracing::warn;

#[derive(Debug)]
pub enum NormalizeError {
    MalformedIdentifier(String),
    ZeroDuration(u64),
    InvalidTimestamp(i64),
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::MalformedIdentifier(id) => {
                write!(f, "workout identifier {id:?} has no numeric middle segment")
            }
            NormalizeError::ZeroDuration(id) => {
                write!(f, "workout {id} reports zero duration, no average speed")
            }
            NormalizeError::InvalidTimestamp(ms) => {
                write!(f, "epoch timestamp {ms} ms is out of range")
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Derive the stable numeric id from a composite Keep identifier, e.g.
/// `5898009e387e28303988f3b7_9223370441312156007_rn` -> the middle segment.
pub fn workout_numeric_id(composite: &str) -> Result<u64, NormalizeError> {
    composite
        .split('_')
        .nth(1)
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| NormalizeError::MalformedIdentifier(composite.to_string()))
}

/// Build the canonical record for one workout. `points` is empty for
/// workouts without GPS data (manual entries, third-party imports).
pub fn normalize_workout(
    detail: &WorkoutDetail,
    points: &[PointSample],
) -> Result<CanonicalActivity, NormalizeError> {
    let keep_id = workout_numeric_id(&detail.id)?;
    if detail.duration <= 0.0 {
        // Zero-duration payloads are rejected rather than producing an
        // infinite or NaN speed; the workout is skipped and logged.
        return Err(NormalizeError::ZeroDuration(keep_id));
    }

    let start_date = utc_from_millis(detail.start_time)?;
    let end_date = utc_from_millis(detail.end_time)?;
    let offset = local_utc_offset(detail.timezone.as_deref());

    let average_heartrate = detail
        .heart_rate
        .as_ref()
        .and_then(|hr| hr.average_heart_rate)
        .map(|bpm| bpm.round() as i64);

    let start_latlng = points.first().map(|p| StartPoint {
        lat: p.latitude,
        lon: p.longitude,
    });

    Ok(CanonicalActivity {
        id: keep_id,
        name: "run from keep".to_string(),
        activity_type: "Run".to_string(),
        start_date,
        end_date,
        start_date_local: (start_date + offset).naive_utc(),
        end_date_local: (end_date + offset).naive_utc(),
        distance: detail.distance,
        moving_time: detail.duration as i64,
        elapsed_time: (detail.end_time - detail.start_time) / 1000,
        average_speed: detail.distance / detail.duration,
        average_heartrate,
        map: ActivityMap {
            summary_polyline: encoded_path(points),
        },
        start_latlng,
        location_country: detail.region.clone().unwrap_or_default(),
    })
}

fn utc_from_millis(ms: i64) -> Result<DateTime<Utc>, NormalizeError> {
    DateTime::from_timestamp_millis(ms).ok_or(NormalizeError::InvalidTimestamp(ms))
}

/// UTC offset of the named timezone as of the current wall clock, not the
/// workout date. Workouts on the other side of a daylight-saving
/// transition from "now" shift by the DST delta.
fn local_utc_offset(tz_name: Option<&str>) -> Duration {
    let tz_name = tz_name.unwrap_or_default();
    match tz_name.parse::<Tz>() {
        Ok(tz) => {
            let offset = Utc::now().with_timezone(&tz).offset().fix();
            Duration::seconds(offset.local_minus_utc().into())
        }
        Err(_) => {
            if !tz_name.is_empty() {
                warn!("unknown timezone {tz_name:?}, keeping local times in UTC");
            }
            Duration::zero()
        }
    }
}

/// Google polyline encoding of the track, empty when there are no points.
fn encoded_path(points: &[PointSample]) -> String {
    if points.is_empty() {
        return String::new();
    }
    // LineString wants (x, y) = (lon, lat) order.
    let line: LineString<f64> = points
        .iter()
        .map(|p| (p.longitude, p.latitude))
        .collect();
    polyline::encode_coordinates(line, 5).unwrap_or_default()
}
