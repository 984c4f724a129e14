use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::SeriesStore;
use crate::common::csv;
use crate::common::dates::parse_iso_date;
use crate::common::error::{ConsolidateError, Result};
use crate::domain::{Metric, MetricValue, Observation, Series};

const HEADER: [&str; 10] = [
    "location",
    "date",
    "total_vaccinations",
    "people_vaccinated",
    "people_fully_vaccinated",
    "total_boosters",
    "vaccine",
    "source_url",
    "source_label",
    "notes",
];

/// One tabular file per location under a root directory. A commit rewrites
/// the whole file from the sorted series, so the persisted form is sorted
/// and unique by construction.
pub struct CsvStore {
    root: PathBuf,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, location: &str) -> PathBuf {
        let slug = location
            .to_lowercase()
            .replace(' ', "-")
            .replace(['\'', '"'], "");
        self.root.join(format!("{slug}.csv"))
    }

    fn render(series: &Series) -> String {
        let mut out = String::new();
        out.push_str(&HEADER.join(","));
        out.push('\n');
        for obs in series.observations() {
            let date = obs.date.format("%Y-%m-%d").to_string();
            let metrics: Vec<String> = Metric::ALL
                .iter()
                .map(|m| match obs.metrics.get(*m) {
                    MetricValue::Known(v) => v.to_string(),
                    MetricValue::Unknown => String::new(),
                })
                .collect();
            let fields = [
                obs.location.as_str(),
                date.as_str(),
                metrics[0].as_str(),
                metrics[1].as_str(),
                metrics[2].as_str(),
                metrics[3].as_str(),
                obs.vaccine.as_deref().unwrap_or(""),
                obs.source_url.as_str(),
                obs.source_label.as_str(),
                obs.notes.as_str(),
            ];
            out.push_str(&csv::write_line(&fields));
            out.push('\n');
        }
        out
    }

    fn parse(path: &Path, contents: &str) -> Result<Series> {
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| ConsolidateError::Config(format!("empty series file {path:?}")))?;
        if csv::split_line(header) != HEADER {
            return Err(ConsolidateError::Config(format!(
                "unexpected header in series file {path:?}"
            )));
        }

        let mut location = String::new();
        let mut observations = Vec::new();
        for line in lines.filter(|l| !l.trim().is_empty()) {
            let fields = csv::split_line(line);
            if fields.len() != HEADER.len() {
                return Err(ConsolidateError::Config(format!(
                    "malformed row in series file {path:?}: '{line}'"
                )));
            }
            if location.is_empty() {
                location = fields[0].clone();
            }
            let mut obs = Observation::new(fields[0].clone(), parse_iso_date(&fields[1])?);
            for (i, metric) in Metric::ALL.iter().enumerate() {
                let raw = &fields[2 + i];
                let value = if raw.is_empty() {
                    MetricValue::Unknown
                } else {
                    MetricValue::Known(raw.parse().map_err(|e| {
                        ConsolidateError::Config(format!("bad {metric} '{raw}' in {path:?}: {e}"))
                    })?)
                };
                obs.metrics.set(*metric, value);
            }
            obs.vaccine = if fields[6].is_empty() {
                None
            } else {
                Some(fields[6].clone())
            };
            obs.source_url = fields[7].clone();
            obs.source_label = fields[8].clone();
            obs.notes = fields[9].clone();
            observations.push(obs);
        }
        Series::from_observations(location, observations)
    }
}

#[async_trait]
impl SeriesStore for CsvStore {
    async fn load(&self, location: &str) -> Result<Option<Series>> {
        let path = self.path_for(location);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(Self::parse(&path, &contents)?))
    }

    async fn commit(&self, series: &Series) -> Result<()> {
        for obs in series.observations() {
            obs.validate()?;
        }
        let path = self.path_for(series.location());
        let tmp = path.with_extension("csv.tmp");
        fs::write(&tmp, Self::render(series))?;
        fs::rename(&tmp, &path)?;
        debug!(
            location = series.location(),
            rows = series.len(),
            path = %path.display(),
            "rewrote series file"
        );
        Ok(())
    }

    async fn locations(&self) -> Result<Vec<String>> {
        let mut locations = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            if let Some(first_row) = contents.lines().nth(1) {
                locations.push(csv::split_line(first_row)[0].clone());
            }
        }
        locations.sort();
        Ok(locations)
    }
}
