use crate::models::PointSample;
use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::path::{Path, PathBuf};

const GPX_NS: &str = "http://www.topografix.com/GPX/1/1";
const TRACKPOINT_EXTENSION_NS: &str = "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";

/// One vendor timestamp unit is 100 ms of real time.
const POINT_TIME_UNIT_MS: i64 = 100;

#[derive(Debug)]
pub enum TrackWriteError {
    Render(String),
    Io(std::io::Error),
}

impl std::fmt::Display for TrackWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackWriteError::Render(msg) => write!(f, "failed to render GPX: {msg}"),
            TrackWriteError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for TrackWriteError {}

impl From<std::io::Error> for TrackWriteError {
    fn from(err: std::io::Error) -> Self {
        TrackWriteError::Io(err)
    }
}

#[derive(Debug, Clone)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Keep reports no elevation; the point's vertical accuracy rides in
    /// the elevation slot so consumers at least see the fix quality.
    pub elevation: f64,
    pub time: DateTime<Utc>,
}

/// A single track with a single segment holding every point of one
/// workout, in recording order.
#[derive(Debug, Clone)]
pub struct TrackDocument {
    pub name: String,
    pub points: Vec<TrackPoint>,
}

/// Build the track document for one workout. Point absolute times are the
/// workout start plus the relative vendor timestamp scaled to real time;
/// the output always has exactly as many points as the input.
pub fn build_track_document(points: &[PointSample], start_time_ms: i64) -> TrackDocument {
    let points = points
        .iter()
        .map(|p| TrackPoint {
            latitude: p.latitude,
            longitude: p.longitude,
            elevation: p.vertical_accuracy,
            time: DateTime::from_timestamp_millis(start_time_ms + p.timestamp * POINT_TIME_UNIT_MS)
                .unwrap_or_default(),
        })
        .collect();

    TrackDocument {
        name: "run from keep".to_string(),
        points,
    }
}

impl TrackDocument {
    /// Render as GPX 1.1. The Garmin TrackPointExtension namespace is
    /// declared even though no extension fields are written yet; per-point
    /// heart rate will live under it.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut gpx = BytesStart::new("gpx");
        gpx.push_attribute(("version", "1.1"));
        gpx.push_attribute(("creator", "keep-sync"));
        gpx.push_attribute(("xmlns", GPX_NS));
        gpx.push_attribute(("xmlns:gpxtpx", TRACKPOINT_EXTENSION_NS));
        writer.write_event(Event::Start(gpx))?;

        writer.write_event(Event::Start(BytesStart::new("trk")))?;
        write_text_element(&mut writer, "name", &self.name)?;
        writer.write_event(Event::Start(BytesStart::new("trkseg")))?;

        for point in &self.points {
            let lat = point.latitude.to_string();
            let lon = point.longitude.to_string();
            let mut trkpt = BytesStart::new("trkpt");
            trkpt.push_attribute(("lat", lat.as_str()));
            trkpt.push_attribute(("lon", lon.as_str()));
            writer.write_event(Event::Start(trkpt))?;

            write_text_element(&mut writer, "ele", &point.elevation.to_string())?;
            write_text_element(
                &mut writer,
                "time",
                &point.time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            )?;

            writer.write_event(Event::End(BytesEnd::new("trkpt")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("trkseg")))?;
        writer.write_event(Event::End(BytesEnd::new("trk")))?;
        writer.write_event(Event::End(BytesEnd::new("gpx")))?;

        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Write `<numeric id>.gpx` under `gpx_dir`, creating the directory on
/// first use. Existing files are never rewritten or deleted here; the
/// dedup plan decides whether a write happens at all.
pub fn write_track_file(
    gpx_dir: &Path,
    keep_id: u64,
    document: &TrackDocument,
) -> Result<PathBuf, TrackWriteError> {
    fs::create_dir_all(gpx_dir)?;

    let xml = document
        .to_xml()
        .map_err(|e| TrackWriteError::Render(e.to_string()))?;
    let path = gpx_dir.join(format!("{keep_id}.gpx"));
    fs::write(&path, xml)?;

    Ok(path)
}
