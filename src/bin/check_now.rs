//! One manual cycle per target from the command line, without the scheduler.
//!
//! Usage: `check_now [--status] [TARGET_ID]...` (no ids = every target).
//! Prints one JSON line per cycle; exits non-zero if any target failed.
//! With `--status` no cycle runs: each target's status is printed and sent
//! to the chat instead.

use anyhow::Context;
use saylor_watch::{config, telemetry, AppContext, Classification};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = config::load_default().context("loading watch config")?;
    let ctx = AppContext::build(&cfg).await?;

    let (flags, mut ids): (Vec<String>, Vec<String>) =
        std::env::args().skip(1).partition(|a| a.starts_with("--"));
    if ids.is_empty() {
        ids = ctx.target_ids().into_iter().map(String::from).collect();
    }
    if flags.iter().any(|f| f == "--status") {
        return report_status(&ctx, &ids).await;
    }

    let mut failed = false;
    for id in &ids {
        match ctx.check_now(id).await {
            Ok(report) => {
                failed |= report.classification == Classification::Exhausted;
                println!(
                    "{}",
                    json!({
                        "target": report.target_id,
                        "classification": report.classification,
                        "source": report.source,
                        "changeKey": report.record.as_ref().map(|r| r.change_key()),
                        "delivery": report.delivery,
                        "error": report.exhausted.map(|e| e.to_string()),
                    })
                );
            }
            Err(e) => {
                failed = true;
                println!("{}", json!({ "target": id, "error": e.to_string(), "kind": e.kind().as_str() }));
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn report_status(ctx: &AppContext, ids: &[String]) -> anyhow::Result<()> {
    let mut failed = false;
    for id in ids {
        let status = match ctx.status(id).await {
            Ok(s) => s,
            Err(e) => {
                failed = true;
                println!("{}", json!({ "target": id, "error": e.to_string(), "kind": e.kind().as_str() }));
                continue;
            }
        };
        let delivery = ctx.report_status(id).await.ok().flatten();
        println!("{}", json!({ "status": status, "delivery": delivery }));
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
