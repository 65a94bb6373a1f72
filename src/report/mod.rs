//! Report rendering.
//!
//! Turns per-endpoint stats into a markdown status page. The page ends with
//! the full history as a fenced JSON block so the next run can pick it up
//! again via [`extract_history`].

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::endpoints::Endpoint;
use crate::history::{compute_stats, EndpointStats, History, HistoryError, StatsParams, Status};
use crate::probes::ProbeResult;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Stats plus the static fields the report shows for an endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub name: String,
    pub id: String,
    pub base_url: String,
    #[serde(flatten)]
    pub stats: EndpointStats,
}

impl EndpointSummary {
    pub fn status(&self) -> Status {
        self.stats.status
    }
}

/// Compute stats for every endpoint and sort them for display:
/// critical, then down, then up, then disabled. Ties keep list order.
pub fn summarize(
    endpoints: &[Endpoint],
    history: &History,
    latest: &[ProbeResult],
    params: &StatsParams,
) -> Vec<EndpointSummary> {
    let mut summaries: Vec<_> = endpoints
        .iter()
        .map(|ep| {
            let latest = latest.iter().find(|r| r.endpoint == ep.key());
            EndpointSummary {
                name: ep.name.clone(),
                id: ep.id.clone(),
                base_url: ep.base_url.clone(),
                stats: compute_stats(ep, history, latest, params),
            }
        })
        .collect();
    summaries.sort_by_key(|s| s.status());
    summaries
}

/// Header information for a rendered report.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub title: String,
    pub generated_at: DateTime<FixedOffset>,
    pub timezone_label: String,
    pub keyword: Option<String>,
}

/// Render the full markdown report, history block included.
pub fn render_markdown(
    meta: &ReportMeta,
    summaries: &[EndpointSummary],
    history: &History,
) -> Result<String, HistoryError> {
    let mut md = format!("# {}\n\n", meta.title);
    md.push_str(&format!(
        "Last updated: {} {}\n\n",
        meta.generated_at.format("%Y-%m-%d %H:%M"),
        meta.timezone_label
    ));
    md.push_str(&format!(
        "**Endpoints:** {} | **Search keyword:** {}\n\n",
        summaries.len(),
        meta.keyword.as_deref().unwrap_or("-")
    ));
    md.push_str(&status_counts(summaries));

    md.push_str("| Status | Name | ID | API | Search | OK | Fail | Success rate | Last 7 runs |\n");
    md.push_str("|--------|------|----|-----|--------|---:|-----:|-------------:|-------------|\n");
    for s in summaries {
        md.push_str(&format!(
            "| {} | {} | {} | [Link]({}) | {} | {} | {} | {} | {} |\n",
            s.stats.status.glyph(),
            escape_cell(&s.name),
            escape_cell(&s.id),
            s.base_url,
            s.stats.search_label(),
            s.stats.ok_count,
            s.stats.fail_count,
            s.stats.success_rate,
            s.stats.trend,
        ));
    }

    md.push_str("\n<details>\n<summary>History data (JSON)</summary>\n\n");
    md.push_str(JSON_FENCE);
    md.push('\n');
    md.push_str(&history.to_json_pretty()?);
    md.push('\n');
    md.push_str(FENCE);
    md.push_str("\n</details>\n");
    Ok(md)
}

fn status_counts(summaries: &[EndpointSummary]) -> String {
    let count = |status: Status| summaries.iter().filter(|s| s.status() == status).count();
    format!(
        "{} {} critical · {} {} down · {} {} up · {} {} disabled\n\n",
        Status::Critical.glyph(),
        count(Status::Critical),
        Status::Down.glyph(),
        count(Status::Down),
        Status::Up.glyph(),
        count(Status::Up),
        Status::Disabled.glyph(),
        count(Status::Disabled),
    )
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Find the first fenced JSON block in a rendered report.
pub fn extract_history(markdown: &str) -> Option<&str> {
    let start = markdown.find(JSON_FENCE)?;
    let after_fence = &markdown[start + JSON_FENCE.len()..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find(&format!("\n{FENCE}"))?;
    let json = body[..end].trim_end_matches('\r');
    if json.trim().is_empty() {
        None
    } else {
        Some(json)
    }
}
