use crate::stats::TrendSummary;
use crate::threshold::Statistic;
use pdatastructs::tdigest::{TDigest, K1};

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Every value recorded for one trend metric over the whole run.
///
/// Exact statistics (avg, min, max, med, sum) are computed from the raw values; percentiles go
/// through a TDigest.
#[derive(Clone, Debug, Default)]
pub struct SampleSet {
    values: Vec<f64>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        if value.is_finite() {
            self.values.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(statistical::mean(&self.values))
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(statistical::median(&self.values))
        }
    }

    pub fn std_dev(&self) -> Option<f64> {
        if self.values.len() < 2 {
            None
        } else {
            Some(statistical::standard_deviation(&self.values, None))
        }
    }

    /// `p` is a percentile in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let (min, max) = (self.min()?, self.max()?);
        if self.values.len() == 1 {
            return Some(min);
        }

        let mut digest = default_tdigest();
        for value in &self.values {
            digest.insert(*value);
        }
        let q = (p / 100.).clamp(0., 1.);
        let estimate = digest.quantile(q);
        if estimate.is_nan() {
            None
        } else {
            Some(estimate.clamp(min, max))
        }
    }

    /// `None` when no value has been recorded, except for `count` and `sum` which are zero.
    pub fn statistic(&self, statistic: Statistic) -> Option<f64> {
        match statistic {
            Statistic::Avg => self.mean(),
            Statistic::Min => self.min(),
            Statistic::Max => self.max(),
            Statistic::Med => self.median(),
            Statistic::Sum => Some(self.sum()),
            Statistic::Count => Some(self.len() as f64),
            Statistic::Percentile(p) => self.percentile(p),
        }
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.len() as u64,
            sum: self.sum(),
            avg: self.mean(),
            min: self.min(),
            max: self.max(),
            med: self.median(),
            std_dev: self.std_dev(),
            p90: self.percentile(90.),
            p95: self.percentile(95.),
            p99: self.percentile(99.),
        }
    }
}

impl Extend<f64> for SampleSet {
    fn extend<T: IntoIterator<Item = f64>>(&mut self, iter: T) {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for SampleSet {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_no_location_statistics() {
        let set = SampleSet::new();
        assert_eq!(set.statistic(Statistic::Avg), None);
        assert_eq!(set.statistic(Statistic::Percentile(95.)), None);
        assert_eq!(set.statistic(Statistic::Count), Some(0.));
        assert_eq!(set.statistic(Statistic::Sum), Some(0.));
    }

    #[test]
    fn exact_statistics() {
        let set: SampleSet = [100., 300., 200., 400.].into_iter().collect();
        assert_eq!(set.mean(), Some(250.));
        assert_eq!(set.min(), Some(100.));
        assert_eq!(set.max(), Some(400.));
        assert_eq!(set.median(), Some(250.));
        assert_eq!(set.sum(), 1000.);
        assert!(set.std_dev().is_some());
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let set: SampleSet = [1., f64::NAN, f64::INFINITY, 3.].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.mean(), Some(2.));
    }

    #[test]
    fn percentiles_stay_within_range() {
        let set: SampleSet = (1..=1000).map(f64::from).collect();
        let p95 = set.percentile(95.).unwrap();
        assert!((900. ..=1000.).contains(&p95), "p95 = {p95}");

        let single: SampleSet = [42.].into_iter().collect();
        assert_eq!(single.percentile(99.), Some(42.));
    }
}
