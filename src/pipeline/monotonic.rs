use chrono::NaiveDate;
use tracing::warn;

use crate::common::error::{ConsolidateError, Result};
use crate::domain::{Metric, MetricValue, Series};

/// What to do when a cumulative counter moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonotonicPolicy {
    /// Fail loudly; the drop needs operator review.
    Strict,
    /// Treat the drop as a reporting glitch and forward-fill the prior value.
    RepairForward,
    /// Remove the offending row and re-evaluate against the new predecessor.
    DropSuspect,
}

/// One date the enforcer touched, with the original value and, for repairs,
/// the value written in its place (`None` means the row was dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedPoint {
    pub date: NaiveDate,
    pub metric: Metric,
    pub original: u64,
    pub corrected: Option<u64>,
}

/// A run of identical consecutive values that outlasted the configured
/// staleness threshold. A warning, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRun {
    pub metric: Metric,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub value: u64,
    pub days: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MonotonicReport {
    pub flagged: Vec<FlaggedPoint>,
    pub stale: Vec<StaleRun>,
}

impl MonotonicReport {
    fn absorb(&mut self, other: MonotonicReport) {
        self.flagged.extend(other.flagged);
        self.stale.extend(other.stale);
    }
}

pub struct MonotonicityEnforcer {
    policy: MonotonicPolicy,
    stale_after_days: Option<i64>,
}

impl MonotonicityEnforcer {
    pub fn new(policy: MonotonicPolicy) -> Self {
        Self {
            policy,
            stale_after_days: None,
        }
    }

    pub fn with_stale_threshold(mut self, days: i64) -> Self {
        self.stale_after_days = Some(days);
        self
    }

    /// Enforces the policy for every metric field of the series.
    pub fn enforce_all(&self, series: &mut Series) -> Result<MonotonicReport> {
        let mut report = MonotonicReport::default();
        for metric in Metric::ALL {
            report.absorb(self.enforce(series, metric)?);
        }
        Ok(report)
    }

    /// Enforces the policy for one metric. The first row of a series has no
    /// predecessor and is always accepted as-is; unknown values are skipped
    /// and never corrected.
    pub fn enforce(&self, series: &mut Series, metric: Metric) -> Result<MonotonicReport> {
        let mut report = match self.policy {
            MonotonicPolicy::Strict => self.check_strict(series, metric)?,
            MonotonicPolicy::RepairForward => self.repair_forward(series, metric),
            MonotonicPolicy::DropSuspect => self.drop_suspect(series, metric),
        };
        report.stale = self.detect_stale_runs(series, metric);
        Ok(report)
    }

    fn check_strict(&self, series: &Series, metric: Metric) -> Result<MonotonicReport> {
        let mut last_known: Option<u64> = None;
        for obs in series.observations() {
            if let Some(value) = obs.metrics.get(metric).known() {
                if let Some(previous) = last_known {
                    if value < previous {
                        return Err(ConsolidateError::NonMonotonic {
                            location: series.location().to_string(),
                            metric,
                            date: obs.date,
                            value,
                            previous,
                        });
                    }
                }
                last_known = Some(value);
            }
        }
        Ok(MonotonicReport::default())
    }

    fn repair_forward(&self, series: &mut Series, metric: Metric) -> MonotonicReport {
        let mut report = MonotonicReport::default();
        let mut last_known: Option<u64> = None;
        let location = series.location().to_string();
        for obs in series.observations_mut() {
            if let Some(value) = obs.metrics.get(metric).known() {
                match last_known {
                    Some(previous) if value < previous => {
                        obs.metrics.set(metric, MetricValue::Known(previous));
                        obs.corrected = true;
                        warn!(
                            location = %location,
                            metric = %metric,
                            date = %obs.date,
                            original = value,
                            corrected = previous,
                            "forward-filled non-monotonic value"
                        );
                        report.flagged.push(FlaggedPoint {
                            date: obs.date,
                            metric,
                            original: value,
                            corrected: Some(previous),
                        });
                        last_known = Some(previous);
                    }
                    _ => last_known = Some(value),
                }
            }
        }
        report
    }

    fn drop_suspect(&self, series: &mut Series, metric: Metric) -> MonotonicReport {
        let mut report = MonotonicReport::default();
        let mut last_kept: Option<u64> = None;
        series.retain(|obs| match obs.metrics.get(metric).known() {
            Some(value) => match last_kept {
                Some(previous) if value < previous => {
                    report.flagged.push(FlaggedPoint {
                        date: obs.date,
                        metric,
                        original: value,
                        corrected: None,
                    });
                    false
                }
                _ => {
                    last_kept = Some(value);
                    true
                }
            },
            None => true,
        });
        report
    }

    fn detect_stale_runs(&self, series: &Series, metric: Metric) -> Vec<StaleRun> {
        let Some(threshold) = self.stale_after_days else {
            return Vec::new();
        };
        let mut runs = Vec::new();
        let mut run_start: Option<(NaiveDate, u64)> = None;
        let mut run_end: Option<NaiveDate> = None;

        let mut close_run = |start: Option<(NaiveDate, u64)>, end: Option<NaiveDate>| {
            if let (Some((start, value)), Some(end)) = (start, end) {
                let days = (end - start).num_days();
                if days > threshold {
                    warn!(
                        location = series.location(),
                        metric = %metric,
                        %start,
                        %end,
                        value,
                        "cumulative value unchanged for {days} days"
                    );
                    runs.push(StaleRun {
                        metric,
                        start,
                        end,
                        value,
                        days,
                    });
                }
            }
        };

        for obs in series.observations() {
            let Some(value) = obs.metrics.get(metric).known() else {
                continue;
            };
            match run_start {
                Some((_, run_value)) if run_value == value => run_end = Some(obs.date),
                _ => {
                    close_run(run_start.take(), run_end.take());
                    run_start = Some((obs.date, value));
                    run_end = Some(obs.date);
                }
            }
        }
        close_run(run_start, run_end);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;

    fn series(points: &[((i32, u32, u32), u64)]) -> Series {
        let observations = points
            .iter()
            .map(|&((y, m, d), total)| {
                let mut obs = Observation::new("X", NaiveDate::from_ymd_opt(y, m, d).unwrap());
                obs.metrics.total_vaccinations = MetricValue::Known(total);
                obs.source_url = "https://example.org".to_string();
                obs
            })
            .collect();
        Series::from_observations("X", observations).unwrap()
    }

    fn totals(series: &Series) -> Vec<u64> {
        series
            .observations()
            .iter()
            .filter_map(|o| o.metrics.total_vaccinations.known())
            .collect()
    }

    #[test]
    fn repair_forward_fills_dips_and_flags_them() {
        let mut s = series(&[
            ((2021, 1, 1), 100),
            ((2021, 1, 2), 90),
            ((2021, 1, 3), 150),
        ]);
        let report = MonotonicityEnforcer::new(MonotonicPolicy::RepairForward)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();

        assert_eq!(totals(&s), vec![100, 100, 150]);
        assert_eq!(report.flagged.len(), 1);
        let flag = &report.flagged[0];
        assert_eq!(flag.date, NaiveDate::from_ymd_opt(2021, 1, 2).unwrap());
        assert_eq!(flag.original, 90);
        assert_eq!(flag.corrected, Some(100));
        assert!(s.observations()[1].corrected);
    }

    #[test]
    fn repaired_series_is_monotone() {
        let mut s = series(&[
            ((2021, 1, 1), 5),
            ((2021, 1, 2), 3),
            ((2021, 1, 3), 2),
            ((2021, 1, 4), 9),
            ((2021, 1, 5), 1),
        ]);
        MonotonicityEnforcer::new(MonotonicPolicy::RepairForward)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();
        let values = totals(&s);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn strict_mode_fails_on_decline() {
        let mut s = series(&[((2021, 1, 1), 100), ((2021, 1, 2), 90)]);
        let err = MonotonicityEnforcer::new(MonotonicPolicy::Strict)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap_err();
        assert!(matches!(err, ConsolidateError::NonMonotonic { value: 90, previous: 100, .. }));
    }

    #[test]
    fn strict_mode_accepts_flat_runs() {
        let mut s = series(&[((2021, 1, 1), 100), ((2021, 1, 2), 100), ((2021, 1, 3), 100)]);
        assert!(MonotonicityEnforcer::new(MonotonicPolicy::Strict)
            .enforce(&mut s, Metric::TotalVaccinations)
            .is_ok());
    }

    #[test]
    fn drop_suspect_reevaluates_against_new_predecessor() {
        let mut s = series(&[
            ((2021, 1, 1), 100),
            ((2021, 1, 2), 90),
            ((2021, 1, 3), 95),
            ((2021, 1, 4), 150),
        ]);
        let report = MonotonicityEnforcer::new(MonotonicPolicy::DropSuspect)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();

        // 90 drops against 100; 95 then also drops against 100.
        assert_eq!(totals(&s), vec![100, 150]);
        assert_eq!(report.flagged.len(), 2);
        assert!(report.flagged.iter().all(|f| f.corrected.is_none()));
    }

    #[test]
    fn first_row_is_always_accepted() {
        let mut s = series(&[((2021, 1, 1), 7)]);
        let report = MonotonicityEnforcer::new(MonotonicPolicy::Strict)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();
        assert!(report.flagged.is_empty());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn stale_run_beyond_threshold_is_reported_not_failed() {
        let mut s = series(&[
            ((2021, 1, 1), 100),
            ((2021, 1, 5), 100),
            ((2021, 1, 12), 100),
            ((2021, 1, 13), 120),
        ]);
        let report = MonotonicityEnforcer::new(MonotonicPolicy::Strict)
            .with_stale_threshold(7)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();

        assert_eq!(report.stale.len(), 1);
        let run = &report.stale[0];
        assert_eq!(run.value, 100);
        assert_eq!(run.days, 11);
    }

    #[test]
    fn short_flat_runs_are_not_stale() {
        let mut s = series(&[((2021, 1, 1), 100), ((2021, 1, 2), 100), ((2021, 1, 3), 120)]);
        let report = MonotonicityEnforcer::new(MonotonicPolicy::RepairForward)
            .with_stale_threshold(7)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();
        assert!(report.stale.is_empty());
    }

    #[test]
    fn unknown_values_are_skipped() {
        let mut observations = vec![];
        for (day, value) in [(1, Some(100)), (2, None), (3, Some(90))] {
            let mut obs = Observation::new("X", NaiveDate::from_ymd_opt(2021, 2, day).unwrap());
            obs.metrics.total_vaccinations = match value {
                Some(v) => MetricValue::Known(v),
                None => MetricValue::Unknown,
            };
            obs.source_url = "https://example.org".to_string();
            observations.push(obs);
        }
        let mut s = Series::from_observations("X", observations).unwrap();
        MonotonicityEnforcer::new(MonotonicPolicy::RepairForward)
            .enforce(&mut s, Metric::TotalVaccinations)
            .unwrap();

        // The dip at day 3 is repaired against day 1, the last known value.
        assert_eq!(totals(&s), vec![100, 100]);
        assert_eq!(s.observations()[1].metrics.total_vaccinations, MetricValue::Unknown);
    }
}
