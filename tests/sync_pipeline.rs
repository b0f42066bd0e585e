use async_trait::async_trait;
use base64::prelude::*;
use flate2::Compression;
use flate2::write::GzEncoder;
use keep_sync::config::SyncConfig;
use keep_sync::dedupe::ExistingIdIndex;
use keep_sync::keep_client::{
    ClientError, HeartRateSummary, VendorInfo, WorkoutDetail, WorkoutPage, WorkoutSource,
};
use keep_sync::models::PointSample;
use keep_sync::sync::SyncJob;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const START_MS: i64 = 1_577_872_800_000;

fn encode_point_stream(points: &[PointSample]) -> String {
    let json = serde_json::to_vec(points).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).unwrap();
    BASE64_STANDARD.encode(encoder.finish().unwrap())
}

fn track_points() -> Vec<PointSample> {
    vec![
        PointSample {
            latitude: 39.906,
            longitude: 116.391,
            vertical_accuracy: 12.0,
            timestamp: 0,
        },
        PointSample {
            latitude: 39.907,
            longitude: 116.392,
            vertical_accuracy: 11.0,
            timestamp: 10,
        },
        PointSample {
            latitude: 39.908,
            longitude: 116.393,
            vertical_accuracy: 10.0,
            timestamp: 20,
        },
    ]
}

fn gps_detail(composite_id: &str) -> WorkoutDetail {
    WorkoutDetail {
        id: composite_id.to_string(),
        start_time: START_MS,
        end_time: START_MS + 1_000_000,
        duration: 1000.0,
        distance: 5000.0,
        timezone: Some("Asia/Shanghai".to_string()),
        heart_rate: Some(HeartRateSummary {
            average_heart_rate: Some(150.0),
        }),
        vendor: Some(VendorInfo {
            genre: Some("KeepApp".to_string()),
            source: Some("Keep".to_string()),
        }),
        raw_data_url: Some(format!("https://example.com/raw/{composite_id}")),
        region: Some("china".to_string()),
    }
}

/// In-memory vendor: one listing page per entry of `pages`, details and
/// point blobs served from maps, with call counters for assertions.
struct FakeVendor {
    pages: Vec<WorkoutPage>,
    details: HashMap<String, WorkoutDetail>,
    blobs: HashMap<String, String>,
    broken: HashSet<String>,
    page_cursor: AtomicUsize,
    detail_calls: Arc<AtomicUsize>,
}

impl FakeVendor {
    fn new(pages: Vec<WorkoutPage>) -> Self {
        Self {
            pages,
            details: HashMap::new(),
            blobs: HashMap::new(),
            broken: HashSet::new(),
            page_cursor: AtomicUsize::new(0),
            detail_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn single_page(ids: &[&str]) -> Self {
        Self::new(vec![WorkoutPage {
            workout_ids: ids.iter().map(|s| s.to_string()).collect(),
            next_cursor: 0,
        }])
    }

    fn with_gps_workout(mut self, composite_id: &str) -> Self {
        let detail = gps_detail(composite_id);
        let url = detail.raw_data_url.clone().unwrap();
        self.blobs.insert(url, encode_point_stream(&track_points()));
        self.details.insert(composite_id.to_string(), detail);
        self
    }

    fn with_detail(mut self, detail: WorkoutDetail) -> Self {
        self.details.insert(detail.id.clone(), detail);
        self
    }

    fn with_broken_workout(mut self, composite_id: &str) -> Self {
        self.broken.insert(composite_id.to_string());
        self
    }
}

#[async_trait]
impl WorkoutSource for FakeVendor {
    async fn login(&mut self, _mobile: &str, _password: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_page(&self, _last_date: i64) -> Result<WorkoutPage, ClientError> {
        let page = self.page_cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages[page].clone())
    }

    async fn workout_detail(&self, workout_id: &str) -> Result<WorkoutDetail, ClientError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(workout_id) {
            return Err(ClientError::Http(StatusCode::INTERNAL_SERVER_ERROR));
        }
        self.details
            .get(workout_id)
            .cloned()
            .ok_or(ClientError::Http(StatusCode::NOT_FOUND))
    }

    async fn point_stream(&self, url: &str) -> Result<String, ClientError> {
        self.blobs
            .get(url)
            .cloned()
            .ok_or(ClientError::Http(StatusCode::NOT_FOUND))
    }
}

fn test_config(gpx_dir: &Path) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.gpx_dir = gpx_dir.to_path_buf();
    config.page_delay = Duration::ZERO;
    config
}

#[tokio::test]
async fn syncs_only_workouts_unknown_to_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let vendor = FakeVendor::single_page(&["aaa_100_rn", "bbb_102_rn"])
        .with_gps_workout("aaa_100_rn")
        .with_gps_workout("bbb_102_rn");
    let detail_calls = vendor.detail_calls.clone();

    let index = ExistingIdIndex::new(HashSet::from([100, 101]), HashSet::new());
    let mut job = SyncJob::new(vendor, test_config(dir.path()), false);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].id, 102);
    assert_eq!(activities[0].average_speed, 5.0);
    assert!(!activities[0].map.summary_polyline.is_empty());

    // Only the unknown workout was fetched at all.
    assert_eq!(detail_calls.load(Ordering::SeqCst), 1);
    assert_eq!(job.stats().skipped_known, 1);
}

#[tokio::test]
async fn second_sync_of_unchanged_data_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();

    let first = FakeVendor::single_page(&["aaa_100_rn"]).with_gps_workout("aaa_100_rn");
    let index = ExistingIdIndex::new(HashSet::new(), HashSet::new());
    let mut job = SyncJob::new(first, test_config(dir.path()), true);
    let synced = job.run("mobile", "password", &index).await.unwrap();
    assert_eq!(synced.len(), 1);
    assert!(dir.path().join("100.gpx").exists());

    // Same vendor data, index now contains what the first run produced.
    let second = FakeVendor::single_page(&["aaa_100_rn"]).with_gps_workout("aaa_100_rn");
    let detail_calls = second.detail_calls.clone();
    let known: HashSet<u64> = synced.iter().map(|a| a.id).collect();
    let index = ExistingIdIndex::load(known, dir.path());

    let mut job = SyncJob::new(second, test_config(dir.path()), true);
    let resynced = job.run("mobile", "password", &index).await.unwrap();

    assert!(resynced.is_empty());
    assert_eq!(detail_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_bad_workout_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let vendor = FakeVendor::single_page(&["aaa_1_rn", "bbb_2_rn", "ccc_3_rn"])
        .with_gps_workout("aaa_1_rn")
        .with_broken_workout("bbb_2_rn")
        .with_gps_workout("ccc_3_rn");

    let index = ExistingIdIndex::new(HashSet::new(), HashSet::new());
    let mut job = SyncJob::new(vendor, test_config(dir.path()), false);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    let ids: Vec<u64> = activities.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(job.stats().failed, 1);
}

#[tokio::test]
async fn zero_duration_workout_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut stalled = gps_detail("bbb_2_rn");
    stalled.duration = 0.0;
    stalled.vendor = None;
    stalled.raw_data_url = None;

    let vendor = FakeVendor::single_page(&["aaa_1_rn", "bbb_2_rn"])
        .with_gps_workout("aaa_1_rn")
        .with_detail(stalled);

    let index = ExistingIdIndex::new(HashSet::new(), HashSet::new());
    let mut job = SyncJob::new(vendor, test_config(dir.path()), false);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].id, 1);
    assert_eq!(job.stats().failed, 1);
}

#[tokio::test]
async fn existing_track_file_skips_the_write_but_not_the_record() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("100.gpx"), "already here").unwrap();

    let vendor = FakeVendor::single_page(&["aaa_100_rn"]).with_gps_workout("aaa_100_rn");
    let index = ExistingIdIndex::load(HashSet::new(), dir.path());

    let mut job = SyncJob::new(vendor, test_config(dir.path()), true);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    assert_eq!(activities.len(), 1);
    assert_eq!(job.stats().tracks_written, 0);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("100.gpx")).unwrap(),
        "already here"
    );
}

#[tokio::test]
async fn gpx_export_writes_one_file_per_new_workout() {
    let dir = tempfile::tempdir().unwrap();
    let vendor = FakeVendor::single_page(&["aaa_100_rn", "bbb_102_rn"])
        .with_gps_workout("aaa_100_rn")
        .with_gps_workout("bbb_102_rn");

    let index = ExistingIdIndex::new(HashSet::new(), HashSet::new());
    let mut job = SyncJob::new(vendor, test_config(dir.path()), true);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    assert_eq!(activities.len(), 2);
    assert_eq!(job.stats().tracks_written, 2);

    let gpx = std::fs::read_to_string(dir.path().join("100.gpx")).unwrap();
    assert_eq!(gpx.matches("<trkpt").count(), 3);
    assert!(gpx.contains("gpxtpx"));
}

#[tokio::test]
async fn workout_without_gps_source_still_normalizes() {
    let dir = tempfile::tempdir().unwrap();
    let mut manual = gps_detail("aaa_5_rn");
    manual.vendor = Some(VendorInfo {
        genre: Some("ManualEntry".to_string()),
        source: None,
    });

    let vendor = FakeVendor::single_page(&["aaa_5_rn"]).with_detail(manual);
    let index = ExistingIdIndex::new(HashSet::new(), HashSet::new());

    let mut job = SyncJob::new(vendor, test_config(dir.path()), true);
    let activities = job.run("mobile", "password", &index).await.unwrap();

    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].map.summary_polyline, "");
    assert!(activities[0].start_latlng.is_none());
    // No points means no track file either.
    assert_eq!(job.stats().tracks_written, 0);
}
