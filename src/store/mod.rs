pub mod csv_file;
pub mod in_memory;

use async_trait::async_trait;

use crate::common::error::Result;
use crate::domain::{MergeOutcome, Observation, Series};

pub use csv_file::CsvStore;
pub use in_memory::InMemoryStore;

/// Persistence seam for canonical per-location series.
///
/// The design assumes at most one writer per location per run; writes to one
/// location apply in a single total order.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn load(&self, location: &str) -> Result<Option<Series>>;

    /// Replaces the persisted series for its location wholesale. Commit is
    /// the only way a run's output becomes visible.
    async fn commit(&self, series: &Series) -> Result<()>;

    async fn locations(&self) -> Result<Vec<String>>;

    /// Merges a single freshly observed point into the persisted series,
    /// creating the series on first contact with a location.
    async fn merge(&self, observation: Observation) -> Result<MergeOutcome> {
        let mut series = self
            .load(&observation.location)
            .await?
            .unwrap_or_else(|| Series::new(observation.location.clone()));
        let outcome = series.merge(observation)?;
        self.commit(&series).await?;
        Ok(outcome)
    }
}
