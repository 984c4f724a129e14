use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::common::error::{ConsolidateError, Result};

/// The fixed per-domain set of cumulative metric fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    TotalVaccinations,
    PeopleVaccinated,
    PeopleFullyVaccinated,
    TotalBoosters,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::TotalVaccinations,
        Metric::PeopleVaccinated,
        Metric::PeopleFullyVaccinated,
        Metric::TotalBoosters,
    ];

    /// Column name used in persisted series files.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::TotalVaccinations => "total_vaccinations",
            Metric::PeopleVaccinated => "people_vaccinated",
            Metric::PeopleFullyVaccinated => "people_fully_vaccinated",
            Metric::TotalBoosters => "total_boosters",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A reported counter value, or an explicit marker that the source stopped
/// reporting it (e.g. dose breakdowns becoming underivable mid-campaign).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MetricValue {
    Known(u64),
    #[default]
    Unknown,
}

impl MetricValue {
    pub fn known(&self) -> Option<u64> {
        match self {
            MetricValue::Known(v) => Some(*v),
            MetricValue::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MetricValue::Known(_))
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Known(v)
    }
}

/// All metric fields of one observation, addressable by [`Metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub total_vaccinations: MetricValue,
    pub people_vaccinated: MetricValue,
    pub people_fully_vaccinated: MetricValue,
    pub total_boosters: MetricValue,
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> MetricValue {
        match metric {
            Metric::TotalVaccinations => self.total_vaccinations,
            Metric::PeopleVaccinated => self.people_vaccinated,
            Metric::PeopleFullyVaccinated => self.people_fully_vaccinated,
            Metric::TotalBoosters => self.total_boosters,
        }
    }

    pub fn set(&mut self, metric: Metric, value: MetricValue) {
        match metric {
            Metric::TotalVaccinations => self.total_vaccinations = value,
            Metric::PeopleVaccinated => self.people_vaccinated = value,
            Metric::PeopleFullyVaccinated => self.people_fully_vaccinated = value,
            Metric::TotalBoosters => self.total_boosters = value,
        }
    }

    pub fn with(mut self, metric: Metric, value: impl Into<MetricValue>) -> Self {
        self.set(metric, value.into());
        self
    }

    /// First metric where both sides are known and `self` regresses below
    /// `previous`; unknown values never count as a regression.
    pub fn regression_against(&self, previous: &MetricSet) -> Option<(Metric, u64, u64)> {
        for metric in Metric::ALL {
            if let (Some(prev), Some(next)) = (previous.get(metric).known(), self.get(metric).known())
            {
                if next < prev {
                    return Some((metric, prev, next));
                }
            }
        }
        None
    }
}

/// One dated observation for one location — a row of the canonical series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location: String,
    pub date: NaiveDate,
    pub metrics: MetricSet,
    /// Descriptive categorical label (e.g. authorized vaccine brands as of
    /// this date). Never used for computation.
    pub vaccine: Option<String>,
    pub source_url: String,
    pub source_label: String,
    pub notes: String,
    /// Set when the monotonicity enforcer forward-filled this row.
    #[serde(default)]
    pub corrected: bool,
}

impl Observation {
    pub fn new(location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            location: location.into(),
            date,
            metrics: MetricSet::default(),
            vaccine: None,
            source_url: String::new(),
            source_label: String::new(),
            notes: String::new(),
            corrected: false,
        }
    }

    /// Checks the provenance invariants required before persistence.
    pub fn validate(&self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(ConsolidateError::MissingField("location".to_string()));
        }
        if self.source_url.trim().is_empty() {
            return Err(ConsolidateError::MissingField("source_url".to_string()));
        }
        Ok(())
    }
}

/// Outcome of merging one observation into a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// The canonical per-location series: date-ascending, unique by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    location: String,
    observations: Vec<Observation>,
}

impl Series {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            observations: Vec::new(),
        }
    }

    /// Builds a series from a freshly extracted batch. Rows are sorted by
    /// date; when a source reports the same date more than once, the last
    /// occurrence wins.
    pub fn from_observations(
        location: impl Into<String>,
        observations: Vec<Observation>,
    ) -> Result<Self> {
        let location = location.into();
        let mut sorted = observations;
        for obs in &sorted {
            if obs.location != location {
                return Err(ConsolidateError::LocationMismatch {
                    expected: location,
                    got: obs.location.clone(),
                });
            }
        }
        sorted.sort_by_key(|o| o.date);
        let mut deduped: Vec<Observation> = Vec::with_capacity(sorted.len());
        for obs in sorted {
            match deduped.last() {
                Some(last) if last.date == obs.date => {
                    *deduped.last_mut().unwrap() = obs;
                }
                _ => deduped.push(obs),
            }
        }
        Ok(Self {
            location,
            observations: deduped,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn observations_mut(&mut self) -> &mut [Observation] {
        &mut self.observations
    }

    pub fn get(&self, date: NaiveDate) -> Option<&Observation> {
        self.index_of(date).ok().map(|i| &self.observations[i])
    }

    pub fn get_mut(&mut self, date: NaiveDate) -> Option<&mut Observation> {
        match self.index_of(date) {
            Ok(i) => Some(&mut self.observations[i]),
            Err(_) => None,
        }
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn retain(&mut self, f: impl FnMut(&Observation) -> bool) {
        self.observations.retain(f);
    }

    fn index_of(&self, date: NaiveDate) -> std::result::Result<usize, usize> {
        self.observations.binary_search_by_key(&date, |o| o.date)
    }

    /// Merges one observation at its sorted position.
    ///
    /// New dates are inserted; an existing date is overwritten
    /// (last-write-wins). Either way the candidate is checked against the
    /// prior date's entry and rejected with [`ConsolidateError::Regression`]
    /// when a cumulative field would move backwards; on rejection the series
    /// is left unchanged. Merging the same observation twice is a no-op
    /// after the first call.
    pub fn merge(&mut self, observation: Observation) -> Result<MergeOutcome> {
        if observation.location != self.location {
            return Err(ConsolidateError::LocationMismatch {
                expected: self.location.clone(),
                got: observation.location,
            });
        }
        observation.validate()?;

        let (index, exists) = match self.index_of(observation.date) {
            Ok(i) => (i, true),
            Err(i) => (i, false),
        };

        if index > 0 {
            let predecessor = &self.observations[index - 1];
            if let Some((metric, prev, next)) =
                observation.metrics.regression_against(&predecessor.metrics)
            {
                return Err(ConsolidateError::Regression {
                    location: self.location.clone(),
                    date: observation.date,
                    reason: format!(
                        "{metric} {next} is below {prev} reported on {}",
                        predecessor.date
                    ),
                });
            }
        }

        if exists {
            self.observations[index] = observation;
            Ok(MergeOutcome::Updated)
        } else {
            self.observations.insert(index, observation);
            Ok(MergeOutcome::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(location: &str, date: (i32, u32, u32), total: u64) -> Observation {
        let mut o = Observation::new(location, NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap());
        o.metrics.total_vaccinations = MetricValue::Known(total);
        o.source_url = "https://example.org/data".to_string();
        o
    }

    #[test]
    fn merge_into_empty_series_inserts() {
        let mut series = Series::new("X");
        let outcome = series.merge(obs("X", (2021, 5, 1), 500)).unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(series.len(), 1);
        assert_eq!(
            series.last().unwrap().metrics.total_vaccinations,
            MetricValue::Known(500)
        );
    }

    #[test]
    fn remerge_of_same_observation_is_idempotent() {
        let mut series = Series::new("X");
        let point = obs("X", (2021, 5, 1), 500);
        series.merge(point.clone()).unwrap();
        let snapshot = series.clone();

        let outcome = series.merge(point).unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(series, snapshot);
    }

    #[test]
    fn backfilled_dates_insert_at_sorted_position() {
        let mut series = Series::new("X");
        series.merge(obs("X", (2021, 5, 3), 300)).unwrap();
        series.merge(obs("X", (2021, 5, 1), 100)).unwrap();
        series.merge(obs("X", (2021, 5, 2), 200)).unwrap();

        let dates: Vec<_> = series.observations().iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2021, 5, 1).unwrap(),
                NaiveDate::from_ymd_opt(2021, 5, 2).unwrap(),
                NaiveDate::from_ymd_opt(2021, 5, 3).unwrap(),
            ]
        );
    }

    #[test]
    fn no_duplicate_dates_after_any_merge_sequence() {
        let mut series = Series::new("X");
        series.merge(obs("X", (2021, 7, 1), 10)).unwrap();
        series.merge(obs("X", (2021, 7, 2), 20)).unwrap();
        series.merge(obs("X", (2021, 7, 2), 25)).unwrap();
        series.merge(obs("X", (2021, 7, 1), 15)).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(
            series
                .get(NaiveDate::from_ymd_opt(2021, 7, 2).unwrap())
                .unwrap()
                .metrics
                .total_vaccinations,
            MetricValue::Known(25)
        );
    }

    #[test]
    fn regression_below_prior_date_is_rejected_and_store_unchanged() {
        let mut series = Series::new("X");
        series.merge(obs("X", (2021, 7, 9), 100)).unwrap();
        let snapshot = series.clone();

        let err = series.merge(obs("X", (2021, 7, 10), 80)).unwrap_err();
        assert!(matches!(err, ConsolidateError::Regression { .. }));
        assert_eq!(series, snapshot);
    }

    #[test]
    fn unknown_values_do_not_trigger_regression() {
        let mut series = Series::new("X");
        series.merge(obs("X", (2021, 7, 9), 100)).unwrap();

        let mut next = Observation::new("X", NaiveDate::from_ymd_opt(2021, 7, 10).unwrap());
        next.source_url = "https://example.org/data".to_string();
        // total_vaccinations left Unknown
        next.metrics.people_vaccinated = MetricValue::Known(50);
        assert!(series.merge(next).is_ok());
    }

    #[test]
    fn merge_rejects_wrong_location() {
        let mut series = Series::new("X");
        let err = series.merge(obs("Y", (2021, 5, 1), 1)).unwrap_err();
        assert!(matches!(err, ConsolidateError::LocationMismatch { .. }));
    }

    #[test]
    fn merge_requires_source_url() {
        let mut series = Series::new("X");
        let mut point = obs("X", (2021, 5, 1), 1);
        point.source_url.clear();
        let err = series.merge(point).unwrap_err();
        assert!(matches!(err, ConsolidateError::MissingField(_)));
    }

    #[test]
    fn from_observations_sorts_and_last_write_wins() {
        let batch = vec![
            obs("X", (2021, 1, 2), 90),
            obs("X", (2021, 1, 1), 100),
            obs("X", (2021, 1, 2), 95),
        ];
        let series = Series::from_observations("X", batch).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            series
                .get(NaiveDate::from_ymd_opt(2021, 1, 2).unwrap())
                .unwrap()
                .metrics
                .total_vaccinations,
            MetricValue::Known(95)
        );
    }
}
