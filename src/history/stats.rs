//! Per-endpoint statistics derived from the history window.
//!
//! Everything here is a pure function of `(endpoint, history, latest)`.
//! Stats are recomputed on every run and never persisted.

use serde::{Serialize, Serializer};

use super::{History, RunRecord};
use crate::endpoints::Endpoint;
use crate::probes::{ProbeResult, SearchOutcome};

/// Endpoint status. Declaration order is the report's sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Critical,
    Down,
    Up,
    Disabled,
}

impl Status {
    pub fn glyph(&self) -> &'static str {
        match self {
            Status::Critical => "🚨",
            Status::Down => "❌",
            Status::Up => "✅",
            Status::Disabled => "🚫",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Critical => write!(f, "CRITICAL"),
            Status::Down => write!(f, "DOWN"),
            Status::Up => write!(f, "UP"),
            Status::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Success percentage; `None` when the endpoint has no recorded runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuccessRate(pub Option<f64>);

impl SuccessRate {
    pub fn from_counts(ok: u32, fail: u32) -> Self {
        let total = ok + fail;
        if total == 0 {
            Self(None)
        } else {
            Self(Some(f64::from(ok) / f64::from(total) * 100.0))
        }
    }
}

impl std::fmt::Display for SuccessRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            // Ties round up (1/16 is 6.3%), not to even.
            Some(pct) => write!(f, "{:.1}%", (pct * 10.0).round() / 10.0),
            None => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMark {
    Ok,
    Fail,
    Absent,
}

impl TrendMark {
    fn of(result: Option<&ProbeResult>) -> Self {
        match result {
            Some(r) if r.reachable => TrendMark::Ok,
            Some(_) => TrendMark::Fail,
            None => TrendMark::Absent,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            TrendMark::Ok => '✓',
            TrendMark::Fail => '✗',
            TrendMark::Absent => '-',
        }
    }
}

/// Recent outcomes, oldest first. Serialized as its display string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trend(pub Vec<TrendMark>);

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|m| write!(f, "{}", m.symbol()))
    }
}

impl Serialize for Trend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsParams {
    /// Streak length at which an endpoint becomes critical.
    pub warn_streak: u32,
    pub trend_len: usize,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            warn_streak: 3,
            trend_len: 7,
        }
    }
}

impl From<&crate::config::HistoryConfig> for StatsParams {
    fn from(cfg: &crate::config::HistoryConfig) -> Self {
        Self {
            warn_streak: cfg.warn_streak,
            trend_len: cfg.trend_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub ok_count: u32,
    pub fail_count: u32,
    /// Consecutive failed runs, newest backwards.
    pub streak: u32,
    pub success_rate: SuccessRate,
    pub trend: Trend,
    /// `None` when the endpoint was not part of the latest run.
    pub latest_search: Option<SearchOutcome>,
    pub status: Status,
}

impl EndpointStats {
    /// Search outcome for display; `-` when unknown.
    pub fn search_label(&self) -> String {
        self.latest_search
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// A result recorded for a disabled endpoint is not a probe and counts as
/// absent for every statistic.
fn probed<'a>(run: &'a RunRecord, key: &str) -> Option<&'a ProbeResult> {
    run.result_for(key).filter(|r| r.search != SearchOutcome::Disabled)
}

/// Derive the stats for one endpoint.
///
/// `latest` is the endpoint's result from the run just performed (or the
/// newest stored run when no probing happened). Total: empty history is fine.
pub fn compute_stats(
    endpoint: &Endpoint,
    history: &History,
    latest: Option<&ProbeResult>,
    params: &StatsParams,
) -> EndpointStats {
    let key = endpoint.key();

    let (ok_count, fail_count) = history
        .records()
        .filter_map(|run| probed(run, key))
        .fold((0u32, 0u32), |(ok, fail), r| {
            if r.reachable {
                (ok + 1, fail)
            } else {
                (ok, fail + 1)
            }
        });

    let streak = history
        .records()
        .rev()
        .map(|run| probed(run, key))
        .take_while(|r| matches!(r, Some(r) if !r.reachable))
        .count() as u32;

    let trend = Trend(
        history
            .last_n(params.trend_len)
            .map(|run| TrendMark::of(probed(run, key)))
            .collect(),
    );

    let status = if endpoint.disabled {
        Status::Disabled
    } else if streak >= params.warn_streak {
        Status::Critical
    } else if latest.is_some_and(|r| r.reachable) {
        Status::Up
    } else {
        Status::Down
    };

    EndpointStats {
        ok_count,
        fail_count,
        streak,
        success_rate: SuccessRate::from_counts(ok_count, fail_count),
        trend,
        latest_search: latest.map(|r| r.search),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const URL: &str = "http://stats.test/api";

    fn endpoint() -> Endpoint {
        Endpoint::new("Stats", URL)
    }

    fn result(reachable: bool) -> ProbeResult {
        ProbeResult {
            name: "Stats".into(),
            endpoint: URL.into(),
            reachable,
            search: SearchOutcome::Match,
        }
    }

    /// One record per entry; `None` means the endpoint was absent that day.
    fn history(days: &[Option<bool>]) -> History {
        History::from_records(days.iter().enumerate().map(|(i, d)| {
            let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(i as u64);
            RunRecord::new(date, d.map(result).into_iter().collect())
        }))
    }

    #[test]
    fn test_streak_stops_at_first_success() {
        let h = history(&[Some(false), Some(false), Some(true), Some(false)]);
        let stats = compute_stats(&endpoint(), &h, Some(&result(false)), &StatsParams::default());
        assert_eq!(stats.streak, 1);
        assert_eq!(stats.ok_count, 1);
        assert_eq!(stats.fail_count, 3);
    }

    #[test]
    fn test_streak_stops_at_missing_day() {
        let h = history(&[Some(false), None, Some(false), Some(false)]);
        let stats = compute_stats(&endpoint(), &h, None, &StatsParams::default());
        assert_eq!(stats.streak, 2);
    }

    #[test]
    fn test_success_rate_formatting() {
        assert_eq!(SuccessRate::from_counts(3, 1).to_string(), "75.0%");
        assert_eq!(SuccessRate::from_counts(0, 0).to_string(), "-");
        assert_eq!(SuccessRate::from_counts(1, 2).to_string(), "33.3%");
        assert_eq!(SuccessRate::from_counts(2, 0).to_string(), "100.0%");
    }

    #[test]
    fn test_success_rate_ties_round_up() {
        assert_eq!(SuccessRate::from_counts(1, 15).to_string(), "6.3%");
        assert_eq!(SuccessRate::from_counts(3, 13).to_string(), "18.8%");
        assert_eq!(SuccessRate::from_counts(2, 1).to_string(), "66.7%");
    }

    #[test]
    fn test_missing_days_count_for_nothing() {
        let h = history(&[Some(true), None, Some(true), Some(true), Some(false)]);
        let stats = compute_stats(&endpoint(), &h, Some(&result(false)), &StatsParams::default());
        assert_eq!((stats.ok_count, stats.fail_count), (3, 1));
        assert_eq!(stats.success_rate.to_string(), "75.0%");
    }

    #[test]
    fn test_critical_beats_up() {
        let h = history(&[Some(false); 5]);
        let params = StatsParams {
            warn_streak: 3,
            trend_len: 7,
        };
        let stats = compute_stats(&endpoint(), &h, Some(&result(true)), &params);
        assert_eq!(stats.streak, 5);
        assert_eq!(stats.status, Status::Critical);
    }

    #[test]
    fn test_disabled_beats_critical() {
        let h = history(&[Some(false); 5]);
        let stats = compute_stats(
            &endpoint().disabled(),
            &h,
            Some(&result(false)),
            &StatsParams::default(),
        );
        assert_eq!(stats.status, Status::Disabled);
    }

    #[test]
    fn test_up_and_down_follow_latest() {
        let h = history(&[Some(false), Some(true)]);
        let params = StatsParams::default();
        assert_eq!(
            compute_stats(&endpoint(), &h, Some(&result(true)), &params).status,
            Status::Up
        );
        assert_eq!(
            compute_stats(&endpoint(), &h, Some(&result(false)), &params).status,
            Status::Down
        );
        assert_eq!(compute_stats(&endpoint(), &h, None, &params).status, Status::Down);
    }

    #[test]
    fn test_trend_keeps_last_seven_oldest_first() {
        let days = [
            Some(false),
            Some(false),
            Some(true),
            None,
            Some(false),
            Some(true),
            Some(true),
            None,
            Some(true),
        ];
        let stats = compute_stats(&endpoint(), &history(&days), None, &StatsParams::default());
        assert_eq!(stats.trend.to_string(), "✓-✗✓✓-✓");
        assert_eq!(stats.trend.0.len(), 7);
    }

    #[test]
    fn test_empty_history_is_total() {
        let stats = compute_stats(&endpoint(), &History::new(), None, &StatsParams::default());
        assert_eq!(stats.streak, 0);
        assert_eq!((stats.ok_count, stats.fail_count), (0, 0));
        assert_eq!(stats.success_rate, SuccessRate(None));
        assert_eq!(stats.trend.to_string(), "");
        assert_eq!(stats.search_label(), "-");
        assert_eq!(stats.status, Status::Down);
    }

    #[test]
    fn test_disabled_results_are_not_counted() {
        let mut off = result(false);
        off.search = SearchOutcome::Disabled;
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let h = History::from_records([RunRecord::new(date, vec![off.clone()])]);

        let stats = compute_stats(&endpoint().disabled(), &h, Some(&off), &StatsParams::default());

        assert_eq!((stats.ok_count, stats.fail_count), (0, 0));
        assert_eq!(stats.streak, 0);
        assert_eq!(stats.trend.to_string(), "-");
        assert_eq!(stats.search_label(), "disabled");
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let h = history(&[Some(true), Some(false), None, Some(true)]);
        let latest = result(true);
        let a = compute_stats(&endpoint(), &h, Some(&latest), &StatsParams::default());
        let b = compute_stats(&endpoint(), &h, Some(&latest), &StatsParams::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_status_sort_order() {
        let mut statuses = vec![Status::Disabled, Status::Up, Status::Critical, Status::Down];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![Status::Critical, Status::Down, Status::Up, Status::Disabled]
        );
    }

    #[test]
    fn test_stats_serialize_for_json_output() {
        let h = history(&[Some(true)]);
        let stats = compute_stats(&endpoint(), &h, Some(&result(true)), &StatsParams::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["trend"], "✓");
        assert_eq!(json["status"], "up");
        assert_eq!(json["success_rate"], 100.0);
        assert_eq!(json["latest_search"], "match");
    }
}
