//! Saylor Watch: binary entrypoint.
//! Loads configuration, restores persisted overrides, starts one timer per
//! target and runs until Ctrl-C.

use anyhow::Context;
use saylor_watch::{config, telemetry, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();
    if let Some(addr) = telemetry::install_metrics_from_env()? {
        tracing::info!(%addr, "prometheus exporter listening");
    }

    let cfg = config::load_default().context("loading watch config")?;
    let mut ctx = AppContext::build(&cfg).await?;
    if ctx.target_ids().is_empty() {
        anyhow::bail!("no valid watch targets ({} rejected)", ctx.rejected().len());
    }
    tracing::info!(
        targets = ?ctx.target_ids(),
        state_file = %cfg.state_file.display(),
        "watch targets loaded"
    );

    ctx.start();
    ctx.announce_startup().await;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    ctx.shutdown().await;
    Ok(())
}
