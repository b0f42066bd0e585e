use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    keep_sync::cli::cli_main().await
}
