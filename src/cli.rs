use crate::config::SyncConfig;
use crate::dedupe::ExistingIdIndex;
use crate::keep_client::KeepClient;
use crate::store::{ActivityStore, JsonActivityStore};
use crate::sync::SyncJob;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "keep-sync",
    about = "Sync Keep running history into the local activity store"
)]
struct Cli {
    /// Keep account mobile number
    #[arg(value_name = "MOBILE", env = "KEEP_MOBILE")]
    mobile: String,

    /// Keep account password
    #[arg(value_name = "PASSWORD", env = "KEEP_PASSWORD")]
    password: String,

    /// Also reconstruct a GPX file for each new workout
    #[arg(long)]
    with_gpx: bool,

    /// Directory for reconstructed GPX files
    #[arg(long)]
    gpx_dir: Option<PathBuf>,

    /// JSON state file backing the activity store
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// JavaScript module the combined listing is exported to
    #[arg(long)]
    export_file: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv). Defaults to INFO.
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

pub async fn cli_main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Cli::parse();
    init_tracing(args.verbose);

    let mut config = SyncConfig::default();
    if let Some(gpx_dir) = args.gpx_dir {
        config.gpx_dir = gpx_dir;
    }
    if let Some(data_file) = args.data_file {
        config.data_file = data_file;
    }
    if let Some(export_file) = args.export_file {
        config.export_file = export_file;
    }

    let mut store = JsonActivityStore::new(config.data_file.clone(), config.export_file.clone());
    let known_ids = store.known_ids().context("loading known activity ids")?;
    let index = ExistingIdIndex::load(known_ids, &config.gpx_dir);

    let client = KeepClient::new(config.clone());
    let mut job = SyncJob::new(client, config.clone(), args.with_gpx);
    let new_activities = job.run(&args.mobile, &args.password, &index).await?;

    store
        .sync_new(&new_activities)
        .context("updating activity store")?;
    info!(
        "activity store updated, export written to {}",
        config.export_file.display()
    );

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // RUST_LOG overrides the flag when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,keep_sync={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
