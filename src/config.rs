use std::path::PathBuf;
use std::time::Duration;

/// Everything the pipeline needs to know about the outside world: vendor
/// endpoints, output locations, and the courtesy delay between list pages.
/// Passed into the components that need it instead of living in globals.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub login_url: String,
    pub stats_url: String,
    pub runlog_url: String,
    /// Directory holding one `<numeric id>.gpx` per exported workout.
    pub gpx_dir: PathBuf,
    /// JSON state file backing the activity store.
    pub data_file: PathBuf,
    /// JavaScript module the combined listing is exported to.
    pub export_file: PathBuf,
    /// Fixed delay between successive list-page requests (spider rule).
    pub page_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            login_url: "https://api.gotokeep.com/v1.1/users/login".to_string(),
            stats_url: "https://api.gotokeep.com/pd/v3/stats/detail".to_string(),
            runlog_url: "https://api.gotokeep.com/pd/v3/runninglog".to_string(),
            gpx_dir: PathBuf::from("GPX_OUT"),
            data_file: PathBuf::from("activities.json"),
            export_file: PathBuf::from("activities.js"),
            page_delay: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    pub fn stats_page_url(&self, last_date: i64) -> String {
        format!(
            "{}?dateUnit=all&type=running&lastDate={last_date}",
            self.stats_url
        )
    }

    pub fn detail_url(&self, workout_id: &str) -> String {
        format!("{}/{workout_id}", self.runlog_url)
    }
}
