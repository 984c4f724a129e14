use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::{Metric, MetricValue, Series};

/// The single trusted point the secondary authoritative feed reports for a
/// location. Recomputed each run; never persisted with the series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryPoint {
    pub as_of_date: NaiveDate,
    /// Explicit per-metric values; an `Unknown` entry blanks a field the
    /// secondary feed does not corroborate.
    pub trusted: Vec<(Metric, MetricValue)>,
    pub source_url: String,
    pub source_label: String,
}

impl SecondaryPoint {
    pub fn trusted_value(&self, metric: Metric) -> Option<u64> {
        self.trusted
            .iter()
            .find(|(m, _)| *m == metric)
            .and_then(|(_, v)| v.known())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Dates dropped as known undercounts superseded by the trusted feed.
    pub dropped: Vec<NaiveDate>,
    /// The date whose row was overwritten with trusted values, if present.
    pub overwrote: Option<NaiveDate>,
}

/// Patches the primary series against the secondary feed's trusted point.
///
/// Rows strictly after the trusted date whose `anchor` metric undercuts the
/// trusted value are discarded; the row at exactly the trusted date (when
/// present) takes the trusted values and the secondary feed's provenance.
/// No row is ever created, and rows strictly before the trusted date are
/// never touched. A missing point is a no-op.
pub fn reconcile(
    series: &mut Series,
    point: Option<&SecondaryPoint>,
    anchor: Metric,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let Some(point) = point else {
        debug!(
            location = series.location(),
            "no secondary point for location; reconciliation skipped"
        );
        return report;
    };

    if let Some(trusted) = point.trusted_value(anchor) {
        series.retain(|obs| {
            let undercut = obs.date > point.as_of_date
                && obs
                    .metrics
                    .get(anchor)
                    .known()
                    .is_some_and(|value| value < trusted);
            if undercut {
                report.dropped.push(obs.date);
            }
            !undercut
        });
    }

    if let Some(obs) = series.get_mut(point.as_of_date) {
        for (metric, value) in &point.trusted {
            obs.metrics.set(*metric, *value);
        }
        obs.source_url = point.source_url.clone();
        obs.source_label = point.source_label.clone();
        report.overwrote = Some(point.as_of_date);
    }

    if !report.dropped.is_empty() || report.overwrote.is_some() {
        info!(
            location = series.location(),
            as_of = %point.as_of_date,
            dropped = report.dropped.len(),
            overwrote = report.overwrote.is_some(),
            "reconciled against secondary feed"
        );
    }
    report
}
