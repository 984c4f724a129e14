use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::{FetchPort, SecondaryFeedPort};
use crate::common::csv;
use crate::common::dates::{clean_count, parse_iso_date};
use crate::common::error::{ConsolidateError, Result};
use crate::domain::{Metric, MetricValue};
use crate::pipeline::reconcile::SecondaryPoint;

pub const WHO_VACCINATION_DATA_URL: &str =
    "https://covid19.who.int/who-data/vaccination-data.csv";
const WHO_SOURCE_URL: &str = "https://covid19.who.int/";
const WHO_SOURCE_LABEL: &str = "World Health Organization";

/// The aggregated, delayed, but more authoritative reference feed. Only rows
/// the WHO marks as country reporting are trusted; per location it yields at
/// most the single most recent corroborated point.
pub struct WhoFeed {
    fetch: Arc<dyn FetchPort>,
    url: String,
}

impl WhoFeed {
    pub fn new(fetch: Arc<dyn FetchPort>, url: impl Into<String>) -> Self {
        Self {
            fetch,
            url: url.into(),
        }
    }

    fn parse(contents: &str, location: &str) -> Result<Option<SecondaryPoint>> {
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| ConsolidateError::Config("empty secondary feed".to_string()))?;
        let columns = csv::split_line(header);
        let index = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| ConsolidateError::MissingField(format!("secondary feed column {name}")))
        };
        let country = index("COUNTRY")?;
        let data_source = index("DATA_SOURCE")?;
        let date_updated = index("DATE_UPDATED")?;
        let totals = index("TOTAL_VACCINATIONS")?;
        let one_plus = index("PERSONS_VACCINATED_1PLUS_DOSE")?;
        let fully = index("PERSONS_FULLY_VACCINATED")?;

        for line in lines.filter(|l| !l.trim().is_empty()) {
            let fields = csv::split_line(line);
            if fields.len() <= fully {
                continue;
            }
            if fields[country] != location || fields[data_source] != "REPORTING" {
                continue;
            }

            let value = |i: usize| match clean_count(&fields[i]) {
                Ok(v) => MetricValue::Known(v),
                Err(_) => MetricValue::Unknown,
            };
            return Ok(Some(SecondaryPoint {
                as_of_date: parse_iso_date(&fields[date_updated])?,
                trusted: vec![
                    (Metric::TotalVaccinations, value(totals)),
                    (Metric::PeopleVaccinated, value(one_plus)),
                    (Metric::PeopleFullyVaccinated, value(fully)),
                ],
                source_url: WHO_SOURCE_URL.to_string(),
                source_label: WHO_SOURCE_LABEL.to_string(),
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl SecondaryFeedPort for WhoFeed {
    async fn latest_for(&self, location: &str) -> Result<Option<SecondaryPoint>> {
        let contents = self.fetch.fetch_text(&self.url).await?;
        let point = Self::parse(&contents, location)?;
        debug!(location, found = point.is_some(), "queried secondary feed");
        Ok(point)
    }
}
