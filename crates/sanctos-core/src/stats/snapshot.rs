use super::rate_bucket::{RateBucket, RATE_SLOTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request category used for volume and rate accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrafficLane {
    DashGet,
    HealthGet,
    IndexerGet,
    IndexerPost,
    RpcPost,
    OtherGet,
    OtherPost,
}

impl TrafficLane {
    pub const ALL: [Self; 7] = [
        Self::DashGet,
        Self::HealthGet,
        Self::IndexerGet,
        Self::IndexerPost,
        Self::RpcPost,
        Self::OtherGet,
        Self::OtherPost,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DashGet => "dashGet",
            Self::HealthGet => "healthGet",
            Self::IndexerGet => "indexerGet",
            Self::IndexerPost => "indexerPost",
            Self::RpcPost => "rpcPost",
            Self::OtherGet => "otherGet",
            Self::OtherPost => "otherPost",
        }
    }

    /// Lane for an HTTP method (upper-case) and request path.
    #[must_use]
    pub fn classify(method: &str, path: &str) -> Self {
        let post = method.eq_ignore_ascii_case("POST");
        let get = method.eq_ignore_ascii_case("GET");
        let head = method.eq_ignore_ascii_case("HEAD");

        if (get || head) && path == "/dash" {
            Self::DashGet
        } else if get && (path == "/health" || path == "/__sanctos_health") {
            Self::HealthGet
        } else if path == "/indexer" || path.starts_with("/indexer/") {
            if post {
                Self::IndexerPost
            } else {
                Self::IndexerGet
            }
        } else if post && path == "/" {
            Self::RpcPost
        } else if post {
            Self::OtherPost
        } else {
            Self::OtherGet
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLane {
    Hit,
    Miss,
    Bypass,
}

/// Outcome of one upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReport {
    pub ok: bool,
    /// Redacted URL.
    pub url: String,
    pub name: String,
    /// HTTP status, 0 for transport failures.
    pub status: u16,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsEvent {
    Traffic { lane: TrafficLane, post: bool },
    Cache { lane: CacheLane, n: u64 },
    Methods { methods: Vec<String> },
    Upstream(UpstreamReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficState {
    pub totals: BTreeMap<String, u64>,
    pub rates: BTreeMap<String, RateBucket>,
}

/// Persisted aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsState {
    pub start_time: u64,
    pub total_requests: u64,
    pub total_post_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_bypass: u64,
    pub last_upstream_ok_at: u64,
    pub last_upstream_url: String,
    pub last_upstream_name: String,
    pub last_upstream_status: u16,
    pub last_upstream_error_at: u64,
    pub last_upstream_error: String,
    pub methods_all_time: BTreeMap<String, u64>,
    pub methods_by_day: BTreeMap<String, BTreeMap<String, u64>>,
    pub traffic: TrafficState,
}

/// UTC calendar day (`YYYY-MM-DD`) for an epoch-millisecond timestamp.
#[must_use]
pub fn day_key(at_ms: u64) -> String {
    i64::try_from(at_ms)
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

impl StatsState {
    #[must_use]
    pub fn new(start_time: u64) -> Self {
        let mut state = Self { start_time, ..Default::default() };
        for lane in TrafficLane::ALL {
            state.traffic.totals.insert(lane.as_str().to_string(), 0);
            state.traffic.rates.insert(lane.as_str().to_string(), RateBucket::default());
        }
        state
    }

    pub fn apply(&mut self, event: StatsEvent, at_ms: u64, retained_days: usize) {
        match event {
            StatsEvent::Traffic { lane, post } => {
                self.total_requests += 1;
                if post {
                    self.total_post_requests += 1;
                }
                let name = lane.as_str().to_string();
                *self.traffic.totals.entry(name.clone()).or_insert(0) += 1;
                self.traffic.rates.entry(name).or_default().bump(at_ms / 1000, 1);
            }
            StatsEvent::Cache { lane, n } => match lane {
                CacheLane::Hit => self.cache_hits += n,
                CacheLane::Miss => self.cache_misses += n,
                CacheLane::Bypass => self.cache_bypass += n,
            },
            StatsEvent::Methods { methods } => {
                let today = self.methods_by_day.entry(day_key(at_ms)).or_default();
                for method in methods.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
                    *today.entry(method.to_string()).or_insert(0) += 1;
                    *self.methods_all_time.entry(method.to_string()).or_insert(0) += 1;
                }
                self.prune_days(retained_days);
            }
            StatsEvent::Upstream(report) => {
                self.last_upstream_url = report.url;
                self.last_upstream_status = report.status;
                if !report.name.is_empty() {
                    self.last_upstream_name = report.name;
                }
                if report.ok {
                    self.last_upstream_ok_at = at_ms;
                    self.last_upstream_error.clear();
                } else {
                    self.last_upstream_error_at = at_ms;
                    self.last_upstream_error = report
                        .error
                        .filter(|e| !e.is_empty())
                        .unwrap_or_else(|| format!("HTTP {}", report.status));
                }
            }
        }
    }

    /// Drops the oldest day buckets until at most `keep` remain.
    pub fn prune_days(&mut self, keep: usize) {
        while self.methods_by_day.len() > keep {
            self.methods_by_day.pop_first();
        }
    }

    #[must_use]
    pub fn snapshot(&self, now_ms: u64) -> StatsSnapshot {
        let now_sec = now_ms / 1000;
        let today = day_key(now_ms);

        let mut traffic = TrafficView::default();
        for lane in TrafficLane::ALL {
            let name = lane.as_str().to_string();
            let bucket = self.traffic.rates.get(&name).cloned().unwrap_or_default();
            let total = self.traffic.totals.get(&name).copied().unwrap_or(0);
            traffic.totals.insert(name.clone(), total);
            traffic.last60.insert(name.clone(), bucket.sum_last_60(now_sec));
            traffic.series60.insert(name, bucket.series_last_60(now_sec));
        }

        StatsSnapshot {
            start_time: self.start_time,
            total_requests: self.total_requests,
            total_post_requests: self.total_post_requests,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            cache_bypass: self.cache_bypass,
            last_upstream_ok_at: self.last_upstream_ok_at,
            last_upstream_url: self.last_upstream_url.clone(),
            last_upstream_name: self.last_upstream_name.clone(),
            last_upstream_status: self.last_upstream_status,
            last_upstream_error_at: self.last_upstream_error_at,
            last_upstream_error: self.last_upstream_error.clone(),
            traffic,
            today_counts: self.methods_by_day.get(&today).cloned().unwrap_or_default(),
            today,
            methods_all_time: self.methods_all_time.clone(),
            methods_by_day: self.methods_by_day.clone(),
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficView {
    pub totals: BTreeMap<String, u64>,
    pub last60: BTreeMap<String, u64>,
    pub series60: BTreeMap<String, Vec<u64>>,
}

/// Read view of the stats state, with derived per-lane rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub start_time: u64,
    pub total_requests: u64,
    pub total_post_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_bypass: u64,
    pub last_upstream_ok_at: u64,
    pub last_upstream_url: String,
    pub last_upstream_name: String,
    pub last_upstream_status: u16,
    pub last_upstream_error_at: u64,
    pub last_upstream_error: String,
    pub traffic: TrafficView,
    pub today: String,
    pub today_counts: BTreeMap<String, u64>,
    #[serde(rename = "allTimeCounts")]
    pub methods_all_time: BTreeMap<String, u64>,
    #[serde(rename = "byDay")]
    pub methods_by_day: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl StatsSnapshot {
    /// Zeroed snapshot returned when the stats actor cannot be reached.
    #[must_use]
    pub fn degraded(now_ms: u64, reason: &str) -> Self {
        let mut traffic = TrafficView::default();
        for lane in TrafficLane::ALL {
            traffic.totals.insert(lane.as_str().to_string(), 0);
            traffic.last60.insert(lane.as_str().to_string(), 0);
            traffic.series60.insert(lane.as_str().to_string(), vec![0; RATE_SLOTS]);
        }
        Self {
            start_time: now_ms,
            last_upstream_error_at: now_ms,
            last_upstream_error: format!("stats_unavailable: {reason}"),
            traffic,
            degraded: true,
            ..Default::default()
        }
    }
}
