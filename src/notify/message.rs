//! Telegram HTML message bodies. Everything interpolated is escaped.

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::encode_text;

use crate::extract::{ExtractedRecord, StructuredRecord};
use crate::source_chain::Resolved;
use crate::watch::WatchStatus;

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn opt_ts(at: Option<DateTime<Utc>>) -> String {
    at.map(ts).unwrap_or_else(|| "never".into())
}

fn describe_record(rec: &ExtractedRecord) -> String {
    match rec {
        ExtractedRecord::Fingerprint { hash } => {
            format!("fingerprint <code>{}</code>", hash.short())
        }
        ExtractedRecord::Structured(StructuredRecord {
            date,
            quantity,
            unit_price,
            total,
        }) => format!(
            "date: <b>{}</b>\nquantity: {}\nunit price: {}\ntotal: {}",
            encode_text(date),
            encode_text(quantity),
            encode_text(unit_price),
            encode_text(total),
        ),
    }
}

pub fn change_message(
    target_id: &str,
    endpoint: &str,
    previous: Option<&ExtractedRecord>,
    current: &Resolved,
    at: DateTime<Utc>,
) -> String {
    let mut out = format!(
        "🔔 <b>Change detected</b> on <code>{}</code>\n{}\n\n{}",
        encode_text(target_id),
        encode_text(endpoint),
        describe_record(&current.record),
    );
    if let Some(prev) = previous {
        out.push_str("\n\nprevious:\n");
        out.push_str(&describe_record(prev));
    }
    out.push_str(&format!(
        "\n\nsource: {}\nat: {}",
        encode_text(&current.source),
        ts(at)
    ));
    out
}

pub fn baseline_message(
    target_id: &str,
    endpoint: &str,
    current: &Resolved,
    at: DateTime<Utc>,
) -> String {
    format!(
        "👀 Now watching <code>{}</code>\n{}\n\n{}\n\nsource: {}\nat: {}",
        encode_text(target_id),
        encode_text(endpoint),
        describe_record(&current.record),
        encode_text(&current.source),
        ts(at),
    )
}

pub fn startup_message(statuses: &[WatchStatus]) -> String {
    let mut out = String::from("✅ <b>Watcher started</b>");
    for s in statuses {
        out.push_str(&format!(
            "\n• <code>{}</code> every {}s: {}",
            encode_text(&s.target_id),
            s.interval_secs,
            encode_text(&s.endpoint),
        ));
    }
    out
}

pub fn status_message(s: &WatchStatus) -> String {
    format!(
        "<b>Status</b> <code>{}</code> ({})\nendpoint: {}\nsources: {}\ninterval: {}s\ntracking: {}\nlast check: {}\nlast success: {}\nlast change: {}\nlast source: {}\nstate: <code>{}</code>",
        encode_text(&s.target_id),
        s.kind.as_str(),
        encode_text(&s.endpoint),
        encode_text(&s.sources.join(", ")),
        s.interval_secs,
        if s.tracking { "yes" } else { "no" },
        opt_ts(s.last_checked_at),
        opt_ts(s.last_success_at),
        opt_ts(s.last_changed_at),
        encode_text(s.source_used.as_deref().unwrap_or("-")),
        encode_text(&s.state_location),
    )
}
