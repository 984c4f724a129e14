use async_trait::async_trait;

use crate::common::error::Result;
use crate::pipeline::reconcile::SecondaryPoint;

/// Upstream fetch collaborator. Supplies raw payloads already parsed where
/// possible; the consolidation core itself never fetches.
#[async_trait]
pub trait FetchPort: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value>;
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Secondary authoritative feed collaborator: at most one trusted point per
/// location per reconciliation run. Absence is valid.
#[async_trait]
pub trait SecondaryFeedPort: Send + Sync {
    async fn latest_for(&self, location: &str) -> Result<Option<SecondaryPoint>>;
}
