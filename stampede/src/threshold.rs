use stampede_core::{Snapshot, Threshold, ThresholdResult, Verdict};

/// Judge every threshold against `snapshot`.
///
/// A metric with no samples yields [`Verdict::Skip`], which never fails a run.
pub fn evaluate(thresholds: &[Threshold], snapshot: &Snapshot) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|threshold| {
            let observed = snapshot.statistic(&threshold.metric, threshold.expr.statistic);
            let verdict = match observed {
                None => Verdict::Skip,
                Some(value) if threshold.expr.comparison.holds(value, threshold.expr.value) => {
                    Verdict::Pass
                }
                Some(_) => Verdict::Fail,
            };

            ThresholdResult {
                metric: threshold.metric.clone(),
                expression: threshold.expr.to_string(),
                observed,
                verdict,
            }
        })
        .collect()
}

/// Overall verdict: every threshold passed or was skipped.
pub fn passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.verdict != Verdict::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::SampleSet;

    fn snapshot(metric: &str, values: &[f64]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .trends
            .insert(metric.to_string(), values.iter().copied().collect::<SampleSet>());
        snapshot
    }

    #[test]
    fn avg_below_is_strict() {
        let thresholds = vec![Threshold::parse("d", "avg<200").unwrap()];

        let results = evaluate(&thresholds, &snapshot("d", &[100., 299.]));
        assert_eq!(results[0].verdict, Verdict::Pass);
        assert_eq!(results[0].observed, Some(199.5));

        let results = evaluate(&thresholds, &snapshot("d", &[100., 300.]));
        assert_eq!(results[0].verdict, Verdict::Fail);
        assert!(!passed(&results));
    }

    #[test]
    fn zero_samples_skip() {
        let thresholds = vec![
            Threshold::parse("never_recorded", "avg<200").unwrap(),
            Threshold::parse("empty", "p(95)<200").unwrap(),
        ];
        let results = evaluate(&thresholds, &snapshot("empty", &[]));

        assert!(results.iter().all(|r| r.verdict == Verdict::Skip));
        assert!(results.iter().all(|r| r.observed.is_none()));
        assert!(passed(&results));
    }

    #[test]
    fn verdict_is_the_and_of_all_thresholds() {
        let thresholds = vec![
            Threshold::parse("d", "avg<200").unwrap(),
            Threshold::parse("d", "max<150").unwrap(),
        ];
        let results = evaluate(&thresholds, &snapshot("d", &[100., 200.]));
        assert_eq!(results[0].verdict, Verdict::Pass);
        assert_eq!(results[1].verdict, Verdict::Fail);
        assert!(!passed(&results));
    }

    #[test]
    fn counters_are_judged_by_count() {
        let mut snap = Snapshot::default();
        snap.counters.insert("dropped_iterations".to_string(), 4);
        let thresholds = vec![Threshold::parse("dropped_iterations", "count<5").unwrap()];
        assert_eq!(evaluate(&thresholds, &snap)[0].verdict, Verdict::Pass);
    }
}
