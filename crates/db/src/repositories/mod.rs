use async_trait::async_trait;
use thiserror::Error;

use drivethru_core::domain::conversation::{ConversationId, ConversationState};
use drivethru_core::domain::dataset::DatasetItem;
use drivethru_core::scoring::EvaluationReport;

pub mod conversation;
pub mod dataset;
pub mod evaluation;
pub mod memory;

pub use conversation::SqlConversationRepository;
pub use dataset::SqlDatasetRepository;
pub use evaluation::SqlEvaluationRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryDatasetRepository, InMemoryEvaluationRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable store for conversation state envelopes, keyed by conversation id.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(&self, state: ConversationState) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Inserts or replaces items by id. Returns the number of items written.
    async fn upsert_items(
        &self,
        dataset_name: &str,
        items: &[DatasetItem],
    ) -> Result<usize, RepositoryError>;

    /// Items of one dataset ordered by their metadata index.
    async fn list_items(&self, dataset_name: &str) -> Result<Vec<DatasetItem>, RepositoryError>;
}

#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    async fn save_report(&self, report: &EvaluationReport) -> Result<(), RepositoryError>;
    async fn find_report(
        &self,
        run_name: &str,
    ) -> Result<Option<EvaluationReport>, RepositoryError>;
}
