pub mod indonesia;
pub mod montenegro;

use std::fmt;

use async_trait::async_trait;

use crate::app::ports::FetchPort;
use crate::common::error::Result;
use crate::domain::{Metric, Observation};
use crate::pipeline::monotonic::MonotonicPolicy;
use crate::pipeline::stage::Pipeline;
use crate::pipeline::table::Table;
use crate::pipeline::timeline::VaccineTimeline;

pub const MONTENEGRO_SOURCE: &str = "montenegro";
pub const INDONESIA_SOURCE: &str = "indonesia";

/// Whether a source yields one new dated point per run or a full historical
/// series per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Incremental,
    Batch,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Incremental => "incremental",
            SourceKind::Batch => "batch",
        })
    }
}

/// One upstream source. Adapters own the fetching and extraction quirks of
/// their source; the consolidation core only sees the table they produce.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;
    fn location(&self) -> &'static str;

    fn kind(&self) -> SourceKind {
        SourceKind::Incremental
    }

    fn monotonic_policy(&self) -> MonotonicPolicy {
        MonotonicPolicy::RepairForward
    }

    /// Metric anchoring reconciliation against the secondary feed, when this
    /// source participates in it.
    fn reconcile_metric(&self) -> Option<Metric> {
        None
    }

    fn vaccine_timeline(&self) -> Result<Option<VaccineTimeline>> {
        Ok(None)
    }

    /// Retrieves and extracts the raw table for this run.
    async fn read(&self, fetch: &dyn FetchPort) -> Result<Table>;

    /// The ordered stage chain this source assembles from the shared stages.
    fn pipeline(&self) -> Pipeline;

    /// Converts the fully transformed table into canonical observations.
    fn observations(&self, table: Table) -> Result<Vec<Observation>>;
}

pub fn create_adapter(source_id: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        MONTENEGRO_SOURCE => Some(Box::new(montenegro::Montenegro)),
        INDONESIA_SOURCE => Some(Box::new(indonesia::Indonesia)),
        _ => None,
    }
}

pub fn all_source_ids() -> Vec<&'static str> {
    vec![INDONESIA_SOURCE, MONTENEGRO_SOURCE]
}
