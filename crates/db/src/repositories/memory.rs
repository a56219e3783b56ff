use std::collections::HashMap;

use tokio::sync::RwLock;

use drivethru_core::domain::conversation::{ConversationId, ConversationState};
use drivethru_core::domain::dataset::DatasetItem;
use drivethru_core::scoring::EvaluationReport;

use super::{ConversationRepository, DatasetRepository, EvaluationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    states: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(&id.0).cloned())
    }

    async fn save(&self, state: ConversationState) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(state.conversation_id.0.clone(), state);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDatasetRepository {
    items: RwLock<HashMap<String, (String, DatasetItem)>>,
}

#[async_trait::async_trait]
impl DatasetRepository for InMemoryDatasetRepository {
    async fn upsert_items(
        &self,
        dataset_name: &str,
        items: &[DatasetItem],
    ) -> Result<usize, RepositoryError> {
        let mut stored = self.items.write().await;
        for item in items {
            stored.insert(item.id.clone(), (dataset_name.to_string(), item.clone()));
        }
        Ok(items.len())
    }

    async fn list_items(&self, dataset_name: &str) -> Result<Vec<DatasetItem>, RepositoryError> {
        let stored = self.items.read().await;
        let mut items: Vec<DatasetItem> = stored
            .values()
            .filter(|(name, _)| name == dataset_name)
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by(|left, right| {
            left.metadata.index.cmp(&right.metadata.index).then_with(|| left.id.cmp(&right.id))
        });
        Ok(items)
    }
}

#[derive(Default)]
pub struct InMemoryEvaluationRepository {
    reports: RwLock<HashMap<String, EvaluationReport>>,
}

#[async_trait::async_trait]
impl EvaluationRepository for InMemoryEvaluationRepository {
    async fn save_report(&self, report: &EvaluationReport) -> Result<(), RepositoryError> {
        let mut reports = self.reports.write().await;
        reports.insert(report.run_name.clone(), report.clone());
        Ok(())
    }

    async fn find_report(
        &self,
        run_name: &str,
    ) -> Result<Option<EvaluationReport>, RepositoryError> {
        let reports = self.reports.read().await;
        Ok(reports.get(run_name).cloned())
    }
}
