use crate::models::CanonicalActivity;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// The downstream store boundary: list what it already has, then append
/// new records and re-export the combined, ordered listing.
pub trait ActivityStore {
    fn known_ids(&self) -> Result<HashSet<u64>>;
    fn sync_new(&mut self, new_activities: &[CanonicalActivity]) -> Result<()>;
}

/// File-backed store: a JSON array as persistent state, plus a JavaScript
/// data module re-exported on every sync for the site that renders the
/// run history.
pub struct JsonActivityStore {
    data_file: PathBuf,
    export_file: PathBuf,
}

impl JsonActivityStore {
    pub fn new(data_file: PathBuf, export_file: PathBuf) -> Self {
        Self {
            data_file,
            export_file,
        }
    }

    fn load_listing(&self) -> Result<Vec<Value>> {
        if !self.data_file.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.data_file)
            .with_context(|| format!("reading {}", self.data_file.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.data_file.display()))
    }
}

impl ActivityStore for JsonActivityStore {
    fn known_ids(&self) -> Result<HashSet<u64>> {
        Ok(self
            .load_listing()?
            .iter()
            .filter_map(|activity| activity.get("id").and_then(Value::as_u64))
            .collect())
    }

    fn sync_new(&mut self, new_activities: &[CanonicalActivity]) -> Result<()> {
        let mut listing = self.load_listing()?;
        for activity in new_activities {
            listing.push(serde_json::to_value(activity)?);
        }

        // The exported listing stays ordered by start date; the store's
        // timestamp format sorts correctly as a plain string.
        listing.sort_by(|a, b| start_date_of(a).cmp(start_date_of(b)));

        let json = serde_json::to_string_pretty(&listing)?;

        if let Some(parent) = self.data_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.data_file, &json)
            .with_context(|| format!("writing {}", self.data_file.display()))?;

        if let Some(parent) = self.export_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let export = format!("const activities = {json};\n\nexport {{activities}};\n");
        fs::write(&self.export_file, export)
            .with_context(|| format!("writing {}", self.export_file.display()))?;

        Ok(())
    }
}

fn start_date_of(activity: &Value) -> &str {
    activity
        .get("start_date")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
