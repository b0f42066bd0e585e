use crate::normalize::workout_numeric_id;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// What the store and the track-file directory already know, normalized to
/// numeric ids on both sides. Read-only to the pipeline.
#[derive(Debug, Default)]
pub struct ExistingIdIndex {
    store_ids: HashSet<u64>,
    track_stems: HashSet<u64>,
}

impl ExistingIdIndex {
    pub fn new(store_ids: HashSet<u64>, track_stems: HashSet<u64>) -> Self {
        Self {
            store_ids,
            track_stems,
        }
    }

    /// Index from the store's known ids plus a scan of the GPX directory.
    pub fn load(store_ids: HashSet<u64>, gpx_dir: &Path) -> Self {
        Self::new(store_ids, scan_track_stems(gpx_dir))
    }

    pub fn knows_activity(&self, keep_id: u64) -> bool {
        self.store_ids.contains(&keep_id)
    }

    pub fn has_track_file(&self, keep_id: u64) -> bool {
        self.track_stems.contains(&keep_id)
    }
}

/// Numeric stems of the `.gpx` files already on disk. Files whose stem is
/// not a numeric id are not ours and are ignored.
pub fn scan_track_stems(gpx_dir: &Path) -> HashSet<u64> {
    let mut stems = HashSet::new();

    if let Ok(entries) = fs::read_dir(gpx_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("gpx") {
                continue;
            }
            if let Some(stem) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                stems.insert(stem);
            }
        }
    }

    stems
}

/// One workout that survived deduplication. `needs_track` is decided
/// independently of store membership, so a workout can be re-normalized
/// without its track file being rewritten, and vice versa.
#[derive(Debug, Clone)]
pub struct SyncCandidate {
    pub workout_id: String,
    pub keep_id: u64,
    pub needs_track: bool,
}

/// Filter the vendor's workout ids against the index. A workout is
/// skipped entirely only when the store already has its numeric id;
/// identifiers with no derivable numeric id are logged and dropped
/// without aborting the batch.
pub fn plan_sync(workout_ids: &[String], index: &ExistingIdIndex) -> Vec<SyncCandidate> {
    let mut plan = Vec::new();

    for workout_id in workout_ids {
        let keep_id = match workout_numeric_id(workout_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping unparseable workout id: {e}");
                continue;
            }
        };

        if index.knows_activity(keep_id) {
            continue;
        }

        plan.push(SyncCandidate {
            workout_id: workout_id.clone(),
            keep_id,
            needs_track: !index.has_track_file(keep_id),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn skips_only_ids_already_in_the_store() {
        let index = ExistingIdIndex::new(HashSet::from([100, 101]), HashSet::new());
        let fetched = ids(&["aaa_100_rn", "bbb_102_rn"]);

        let plan = plan_sync(&fetched, &index);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].keep_id, 102);
        assert_eq!(plan[0].workout_id, "bbb_102_rn");
        assert!(plan[0].needs_track);
    }

    #[test]
    fn track_presence_does_not_suppress_normalization() {
        // 102 has a track file on disk but is unknown to the store: it is
        // still fetched and normalized, only the track write is skipped.
        let index = ExistingIdIndex::new(HashSet::from([100]), HashSet::from([102]));
        let plan = plan_sync(&ids(&["aaa_102_rn"]), &index);

        assert_eq!(plan.len(), 1);
        assert!(!plan[0].needs_track);
    }

    #[test]
    fn store_membership_suppresses_the_whole_workout() {
        // Known to the store but missing on disk: skipped entirely, the
        // track file is not backfilled.
        let index = ExistingIdIndex::new(HashSet::from([100]), HashSet::new());
        assert!(plan_sync(&ids(&["aaa_100_rn"]), &index).is_empty());
    }

    #[test]
    fn drops_malformed_identifiers_without_failing() {
        let index = ExistingIdIndex::default();
        let plan = plan_sync(&ids(&["garbage", "aaa_7_rn"]), &index);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].keep_id, 7);
    }

    #[test]
    fn scans_only_numeric_gpx_stems() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("100.gpx"), "x").unwrap();
        std::fs::write(dir.path().join("101.txt"), "x").unwrap();
        std::fs::write(dir.path().join("notes.gpx"), "x").unwrap();

        assert_eq!(scan_track_stems(dir.path()), HashSet::from([100]));
    }

    #[test]
    fn missing_gpx_directory_scans_empty() {
        assert!(scan_track_stems(Path::new("/nonexistent/gpx")).is_empty());
    }
}
