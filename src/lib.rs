//! probewatch -- bounded-concurrency HTTP endpoint prober with rolling history.
//!
//! A run loads the endpoint list, probes every endpoint under a concurrency
//! cap, folds the results into the rolling history kept inside the previous
//! report, and renders a fresh report with per-endpoint streaks and trends.

pub mod config;
pub mod endpoints;
pub mod history;
pub mod probes;
pub mod report;
pub mod scheduler;
pub mod storage;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use tracing::{error, info};

use crate::config::Settings;
use crate::endpoints::Endpoint;
use crate::history::{History, RunRecord, StatsParams};
use crate::probes::{ProbeResult, Prober};
use crate::report::{EndpointSummary, ReportMeta};
use crate::scheduler::Scheduler;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub date: NaiveDate,
    pub results: Vec<ProbeResult>,
    pub history: History,
    pub summaries: Vec<EndpointSummary>,
}

impl RunOutcome {
    pub fn has_critical(&self) -> bool {
        self.summaries
            .iter()
            .any(|s| s.status() == history::Status::Critical)
    }
}

/// Probe every endpoint once and fold the run into `history`.
///
/// Results come back in endpoint order. A probe task that dies is recorded as
/// an unreachable endpoint rather than aborting the run.
pub async fn execute_run(
    endpoints: &[Endpoint],
    mut history: History,
    prober: &Prober,
    scheduler: &Scheduler,
    date: NaiveDate,
    max_days: usize,
    params: &StatsParams,
) -> RunOutcome {
    info!(endpoints = endpoints.len(), limit = scheduler.limit(), "probing endpoints");

    let tasks: Vec<_> = endpoints
        .iter()
        .map(|endpoint| move || prober.probe(endpoint))
        .collect();
    let outcomes = scheduler.run(tasks).await;

    let results: Vec<ProbeResult> = outcomes
        .into_iter()
        .zip(endpoints)
        .map(|(outcome, endpoint)| {
            outcome.unwrap_or_else(|failure| {
                error!(endpoint = %endpoint.base_url, %failure, "probe task failed");
                ProbeResult::failed(endpoint)
            })
        })
        .collect();

    history.merge(RunRecord::new(date, results.clone()), max_days);
    let summaries = report::summarize(endpoints, &history, &results, params);

    info!(
        reachable = results.iter().filter(|r| r.reachable).count(),
        total = results.len(),
        runs_in_window = history.len(),
        "run complete"
    );

    RunOutcome {
        date,
        results,
        history,
        summaries,
    }
}

/// One full run: load, probe, merge, render, write.
///
/// Only a missing or broken endpoint list (or bad settings) fails before
/// probing starts.
pub async fn run_check(settings: &Settings) -> Result<RunOutcome> {
    settings.validate().context("invalid settings")?;
    let endpoints = endpoints::load(&settings.paths.endpoints)
        .context("failed to load endpoint list")?;
    let history = storage::load_history(&settings.paths.report);

    let prober = Prober::from_settings(&settings.probe).context("failed to set up prober")?;
    let scheduler = Scheduler::new(settings.scheduler.concurrency)?;
    let params = StatsParams::from(&settings.history);

    let now = Utc::now();
    let outcome = execute_run(
        &endpoints,
        history,
        &prober,
        &scheduler,
        now.date_naive(),
        settings.history.max_days,
        &params,
    )
    .await;

    let meta = report_meta(settings, now);
    let markdown = report::render_markdown(&meta, &outcome.summaries, &outcome.history)?;
    storage::write_report(&settings.paths.report, &markdown)?;

    Ok(outcome)
}

/// Recompute stats from the stored history without probing. The newest
/// stored run stands in for "latest".
pub fn load_status(settings: &Settings) -> Result<Vec<EndpointSummary>> {
    let endpoints = endpoints::load(&settings.paths.endpoints)
        .context("failed to load endpoint list")?;
    let history = storage::load_history(&settings.paths.report);
    let latest = history
        .latest()
        .map(|run| run.results.clone())
        .unwrap_or_default();
    Ok(report::summarize(
        &endpoints,
        &history,
        &latest,
        &StatsParams::from(&settings.history),
    ))
}

fn report_meta(settings: &Settings, now: chrono::DateTime<Utc>) -> ReportMeta {
    let offset = settings
        .report
        .utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    let keyword = settings
        .probe
        .search_enabled
        .then(|| settings.probe.search_keyword.clone());
    ReportMeta {
        title: settings.report.title.clone(),
        generated_at: now.with_timezone(&offset),
        timezone_label: settings.report.timezone_label.clone(),
        keyword,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Status;
    use crate::probes::testing::{ok_json, FakeTransport};
    use crate::probes::{RetryPolicy, SearchOutcome, SearchTest};
    use std::sync::Arc;
    use std::time::Duration;

    fn prober(fake: Arc<FakeTransport>) -> Prober {
        Prober::new(
            fake,
            RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(1),
                timeout: Duration::from_millis(20),
            },
        )
        .with_search(SearchTest {
            keyword: "needle".into(),
            param: "wd".into(),
            list_field: "list".into(),
        })
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 20).unwrap()
    }

    #[tokio::test]
    async fn test_single_run_disabled_and_up() {
        let body = r#"{"list":[{"vod_name":"needle"}]}"#;
        let fake = Arc::new(
            FakeTransport::default()
                .always("http://live.test/api", ok_json(body))
                .always("http://live.test/api?wd=needle", ok_json(body)),
        );
        let endpoints = vec![
            Endpoint::new("Off", "http://off.test/api").disabled(),
            Endpoint::new("Live", "http://live.test/api"),
        ];

        let outcome = execute_run(
            &endpoints,
            History::new(),
            &prober(fake.clone()),
            &Scheduler::new(4).unwrap(),
            today(),
            30,
            &StatsParams::default(),
        )
        .await;

        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.results[0].search, SearchOutcome::Disabled);
        assert_eq!(outcome.results[1].search, SearchOutcome::Match);
        assert_eq!(fake.calls_to("http://off.test/api"), 0);

        let live = &outcome.summaries[0];
        assert_eq!(live.name, "Live");
        assert_eq!(live.status(), Status::Up);
        assert_eq!((live.stats.ok_count, live.stats.fail_count), (1, 0));
        assert_eq!(live.stats.trend.to_string(), "✓");

        let off = &outcome.summaries[1];
        assert_eq!(off.status(), Status::Disabled);
        assert_eq!((off.stats.ok_count, off.stats.fail_count), (0, 0));
        assert!(!outcome.has_critical());
    }

    #[tokio::test]
    async fn test_repeated_failures_turn_critical() {
        let fake = Arc::new(FakeTransport::default());
        let endpoints = vec![Endpoint::new("Gone", "http://gone.test")];
        let scheduler = Scheduler::new(1).unwrap();
        let prober = prober(fake);
        let params = StatsParams::default();

        let mut history = History::new();
        let mut last = None;
        for day in 0..3u64 {
            let date = today() + chrono::Days::new(day);
            let outcome =
                execute_run(&endpoints, history, &prober, &scheduler, date, 30, &params).await;
            history = outcome.history.clone();
            last = Some(outcome);
        }

        let outcome = last.unwrap();
        assert_eq!(outcome.summaries[0].stats.streak, 3);
        assert_eq!(outcome.summaries[0].status(), Status::Critical);
        assert_eq!(outcome.summaries[0].stats.latest_search, Some(SearchOutcome::Error));
        assert!(outcome.has_critical());
    }

    #[test]
    fn test_report_meta_offset_and_keyword() {
        let mut settings = Settings::default();
        settings.report.utc_offset_hours = 8;
        let now = chrono::DateTime::parse_from_rfc3339("2025-01-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let meta = report_meta(&settings, now);
        assert_eq!(meta.generated_at.format("%Y-%m-%d %H:%M").to_string(), "2025-01-02 04:00");
        assert_eq!(meta.keyword.as_deref(), Some("斗罗大陆"));

        settings.probe.search_enabled = false;
        assert_eq!(report_meta(&settings, now).keyword, None);
    }

    #[test]
    fn test_report_meta_huge_offset_falls_back_to_utc() {
        let mut settings = Settings::default();
        settings.report.utc_offset_hours = i32::MAX;
        let now = chrono::DateTime::parse_from_rfc3339("2025-01-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let meta = report_meta(&settings, now);
        assert_eq!(meta.generated_at.offset().local_minus_utc(), 0);
        assert_eq!(meta.generated_at.format("%H:%M").to_string(), "20:00");
    }
}
