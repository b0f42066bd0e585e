use crate::config::SyncConfig;
use crate::decode::{DecodeError, decode_point_stream};
use crate::dedupe::{ExistingIdIndex, SyncCandidate, plan_sync};
use crate::keep_client::{ClientError, WorkoutPager, WorkoutSource};
use crate::models::CanonicalActivity;
use crate::normalize::{NormalizeError, normalize_workout};
use crate::track::{build_track_document, write_track_file};
use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

/// Why one workout failed. Carried per item so a bad record never aborts
/// the batch.
#[derive(Debug)]
pub enum WorkoutError {
    Fetch(ClientError),
    Decode(DecodeError),
    Normalize(NormalizeError),
}

impl std::fmt::Display for WorkoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkoutError::Fetch(e) => write!(f, "fetch failed: {e}"),
            WorkoutError::Decode(e) => write!(f, "point stream undecodable: {e}"),
            WorkoutError::Normalize(e) => write!(f, "normalization failed: {e}"),
        }
    }
}

impl std::error::Error for WorkoutError {}

impl From<ClientError> for WorkoutError {
    fn from(err: ClientError) -> Self {
        WorkoutError::Fetch(err)
    }
}

impl From<DecodeError> for WorkoutError {
    fn from(err: DecodeError) -> Self {
        WorkoutError::Decode(err)
    }
}

impl From<NormalizeError> for WorkoutError {
    fn from(err: NormalizeError) -> Self {
        WorkoutError::Normalize(err)
    }
}

#[derive(Debug, Default)]
pub struct SyncStats {
    pub synced: usize,
    pub skipped_known: usize,
    pub tracks_written: usize,
    pub failed: usize,
}

/// Drives the whole batch: login, paginated listing, dedup planning, then
/// one workout at a time through fetch -> decode -> normalize with an
/// optional track write on the side.
pub struct SyncJob<S: WorkoutSource> {
    source: S,
    config: SyncConfig,
    with_gpx: bool,
    stats: SyncStats,
}

impl<S: WorkoutSource> SyncJob<S> {
    pub fn new(source: S, config: SyncConfig, with_gpx: bool) -> Self {
        Self {
            source,
            config,
            with_gpx,
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Run the batch to completion and return every successfully
    /// normalized record for the store handoff. Only a failed login or a
    /// failed initial listing aborts the run.
    pub async fn run(
        &mut self,
        mobile: &str,
        password: &str,
        index: &ExistingIdIndex,
    ) -> Result<Vec<CanonicalActivity>> {
        self.source
            .login(mobile, password)
            .await
            .context("keep login failed")?;

        let workout_ids = self.list_workout_ids().await?;
        let candidates = plan_sync(&workout_ids, index);
        self.stats.skipped_known = workout_ids.len().saturating_sub(candidates.len());
        info!("{} new keep runs to generate", candidates.len());

        let mut activities = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match self.process_workout(candidate).await {
                Ok(activity) => {
                    self.stats.synced += 1;
                    activities.push(activity);
                }
                Err(e) => {
                    error!("giving up on keep workout {}: {e}", candidate.workout_id);
                    self.stats.failed += 1;
                }
            }
        }

        info!(
            "sync finished: {} synced, {} already known, {} gpx written, {} failed",
            self.stats.synced,
            self.stats.skipped_known,
            self.stats.tracks_written,
            self.stats.failed
        );

        Ok(activities)
    }

    async fn list_workout_ids(&self) -> Result<Vec<String>> {
        let mut pager = WorkoutPager::new(&self.source, self.config.page_delay);
        let mut ids = Vec::new();
        let mut first_page = true;

        loop {
            match pager.next_batch().await {
                Ok(Some(batch)) => {
                    ids.extend(batch);
                    first_page = false;
                }
                Ok(None) => break,
                Err(e) if first_page => {
                    return Err(e).context("listing keep workouts failed");
                }
                Err(e) => {
                    // Later pages are best-effort: keep what we have, the
                    // next sync picks up the rest.
                    warn!("workout listing stopped early: {e}");
                    break;
                }
            }
        }

        Ok(ids)
    }

    async fn process_workout(
        &mut self,
        candidate: &SyncCandidate,
    ) -> Result<CanonicalActivity, WorkoutError> {
        info!("parsing keep workout {}", candidate.workout_id);

        let detail = self.source.workout_detail(&candidate.workout_id).await?;

        let points = match detail.point_stream_url() {
            Some(url) => {
                let blob = self.source.point_stream(url).await?;
                decode_point_stream(&blob)?
            }
            None => Vec::new(),
        };

        if self.with_gpx && candidate.needs_track && !points.is_empty() {
            let document = build_track_document(&points, detail.start_time);
            match write_track_file(&self.config.gpx_dir, candidate.keep_id, &document) {
                Ok(path) => {
                    self.stats.tracks_written += 1;
                    debug!("wrote {}", path.display());
                }
                Err(e) => {
                    // The canonical record is still produced; only the
                    // track file is missing and can be retried next run.
                    warn!("gpx write failed for workout {}: {e}", candidate.keep_id);
                }
            }
        }

        Ok(normalize_workout(&detail, &points)?)
    }
}
