use crate::data::SampleSet;
use crate::threshold::Statistic;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Aggregates of one trend metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub count: u64,
    pub sum: f64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub med: Option<f64>,
    pub std_dev: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// Point-in-time copy of everything a collector holds.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub trends: BTreeMap<String, SampleSet>,
    pub counters: BTreeMap<String, u64>,
}

impl Snapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn trend(&self, name: &str) -> Option<&SampleSet> {
        self.trends.get(name)
    }

    /// Aggregate `statistic` over the metric called `name`.
    ///
    /// Trends take precedence over counters sharing a name. Counters only answer `count` and
    /// `sum`. `None` means there is nothing to compare: the metric has no samples, or the
    /// statistic does not apply to it.
    pub fn statistic(&self, name: &str, statistic: Statistic) -> Option<f64> {
        if let Some(trend) = self.trends.get(name).filter(|t| !t.is_empty()) {
            return trend.statistic(statistic);
        }

        let value = *self.counters.get(name)?;
        match statistic {
            Statistic::Count | Statistic::Sum => Some(value as f64),
            _ => None,
        }
    }

    pub fn summaries(&self) -> BTreeMap<String, TrendSummary> {
        self.trends
            .iter()
            .map(|(name, set)| (name.clone(), set.summary()))
            .collect()
    }
}

/// What happened to the iterations of one load profile.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub name: String,
    /// Scheduled starts, only known up front for arrival-rate profiles.
    pub requested: Option<u64>,
    pub started: u64,
    pub dropped: u64,
    pub completed: u64,
    pub aborted: u64,
    pub interrupted: u64,
    pub peak_vus: u64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
}

impl ProfileStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// The metric had no samples, so the threshold could not be judged.
    Skip,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub verdict: Verdict,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    pub trends: BTreeMap<String, TrendSummary>,
    pub counters: BTreeMap<String, u64>,
    pub profiles: Vec<ProfileStats>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
    /// Share of finished iterations (completed or aborted) that failed.
    pub failure_rate: f64,
}

impl RunSummary {
    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds
            .iter()
            .filter(|t| t.verdict == Verdict::Fail)
    }
}

/// `failed / (succeeded + failed)`, zero when nothing finished.
pub fn failure_rate(succeeded: u64, failed: u64) -> f64 {
    let total = succeeded + failed;
    if total == 0 {
        0.
    } else {
        failed as f64 / total as f64
    }
}

fn opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        writeln!(f, "run \"{}\" finished in {}", self.name, humantime::format_duration(elapsed))?;

        writeln!(f)?;
        writeln!(f, "profiles:")?;
        for p in &self.profiles {
            let requested = p
                .requested
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "  {:<24} requested={} started={} dropped={} completed={} aborted={} interrupted={} peak_vus={}",
                p.name, requested, p.started, p.dropped, p.completed, p.aborted, p.interrupted, p.peak_vus
            )?;
        }

        writeln!(f)?;
        writeln!(f, "trends:")?;
        for (name, t) in &self.trends {
            writeln!(
                f,
                "  {:<32} count={} avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
                name,
                t.count,
                opt(t.avg),
                opt(t.min),
                opt(t.med),
                opt(t.max),
                opt(t.p90),
                opt(t.p95),
                opt(t.p99)
            )?;
        }

        writeln!(f)?;
        writeln!(f, "counters:")?;
        for (name, value) in &self.counters {
            writeln!(f, "  {:<32} {}", name, value)?;
        }

        if !self.thresholds.is_empty() {
            writeln!(f)?;
            writeln!(f, "thresholds:")?;
            for t in &self.thresholds {
                let mark = match t.verdict {
                    Verdict::Pass => "ok  ",
                    Verdict::Fail => "FAIL",
                    Verdict::Skip => "skip",
                };
                writeln!(
                    f,
                    "  [{}] {} {} (observed {})",
                    mark,
                    t.metric,
                    t.expression,
                    opt(t.observed)
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "failure rate: {:.2}%", self.failure_rate * 100.)?;
        write!(f, "verdict: {}", if self.passed { "PASS" } else { "FAIL" })
    }
}
