//! Research cache seam.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::research::ResearchContext;

/// Storage for model-derived research, keyed by `Subject::key()`.
///
/// Implemented by `MemoryStore` and `LibSqlStore`.
#[async_trait]
pub trait ResearchCache: Send + Sync {
    async fn get_research(&self, key: &str) -> Result<Option<ResearchContext>, DatabaseError>;

    async fn put_research(&self, key: &str, context: &ResearchContext)
    -> Result<(), DatabaseError>;
}
