use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::SeriesStore;
use crate::common::error::Result;
use crate::domain::{MergeOutcome, Observation, Series};

/// In-memory store for development and testing.
#[derive(Default)]
pub struct InMemoryStore {
    series: Arc<Mutex<HashMap<String, Series>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesStore for InMemoryStore {
    async fn load(&self, location: &str) -> Result<Option<Series>> {
        let series = self.series.lock().unwrap();
        Ok(series.get(location).cloned())
    }

    async fn commit(&self, series: &Series) -> Result<()> {
        let mut map = self.series.lock().unwrap();
        map.insert(series.location().to_string(), series.clone());
        debug!(
            location = series.location(),
            rows = series.len(),
            "committed series"
        );
        Ok(())
    }

    async fn locations(&self) -> Result<Vec<String>> {
        let series = self.series.lock().unwrap();
        let mut locations: Vec<String> = series.keys().cloned().collect();
        locations.sort();
        Ok(locations)
    }

    // Single-lock merge so the read-modify-write is one total order per
    // location.
    async fn merge(&self, observation: Observation) -> Result<MergeOutcome> {
        let mut map = self.series.lock().unwrap();
        let series = map
            .entry(observation.location.clone())
            .or_insert_with(|| Series::new(observation.location.clone()));
        let outcome = series.merge(observation)?;
        debug!(location = series.location(), ?outcome, "merged observation");
        Ok(outcome)
    }
}
