use sqlx::Row;

use drivethru_core::domain::dataset::Dataset;

use crate::connection::DbPool;
use crate::repositories::{DatasetRepository, RepositoryError, SqlDatasetRepository};

/// Bundled labeled dataset for order-correctness evaluation.
///
/// Item ids are stable, so loading is an idempotent upsert.
pub struct DatasetSeed;

impl DatasetSeed {
    pub const JSON: &'static str = include_str!("../../../datasets/order-correctness-v1.json");

    pub fn dataset() -> Result<Dataset, RepositoryError> {
        Dataset::from_json_str(Self::JSON)
            .map_err(|error| RepositoryError::Decode(format!("bundled dataset: {error}")))
    }

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        Self::load_dataset(pool, &Self::dataset()?).await
    }

    pub async fn load_dataset(pool: &DbPool, dataset: &Dataset) -> Result<SeedResult, RepositoryError> {
        let repository = SqlDatasetRepository::new(pool.clone());
        let items_seeded = repository.upsert_items(&dataset.name, &dataset.items).await?;

        tracing::info!(
            event_name = "persistence.dataset.seeded",
            dataset_name = %dataset.name,
            items_seeded,
            "dataset seeded"
        );
        Ok(SeedResult { dataset_name: dataset.name.clone(), items_seeded })
    }

    /// Checks that every bundled item id is present under the bundled dataset name.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        Self::verify_dataset(pool, &Self::dataset()?).await
    }

    pub async fn verify_dataset(
        pool: &DbPool,
        dataset: &Dataset,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(dataset.items.len() + 1);

        let stored: i64 =
            sqlx::query("SELECT COUNT(*) AS count FROM eval_dataset_item WHERE dataset_name = ?")
                .bind(&dataset.name)
                .fetch_one(pool)
                .await?
                .try_get("count")?;
        let expected = i64::try_from(dataset.items.len()).unwrap_or(i64::MAX);
        checks.push(("item_count".to_string(), stored == expected));

        for item in &dataset.items {
            let present: i64 = sqlx::query(
                "SELECT COUNT(*) AS count FROM eval_dataset_item WHERE id = ? AND dataset_name = ?",
            )
            .bind(&item.id)
            .bind(&dataset.name)
            .fetch_one(pool)
            .await?
            .try_get("count")?;
            checks.push((item.id.clone(), present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, item_count: stored, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub dataset_name: String,
    pub items_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub item_count: i64,
    pub checks: Vec<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use super::DatasetSeed;
    use drivethru_core::domain::dataset::{dataset_item_id, DEFAULT_DATASET_NAME};

    #[test]
    fn bundled_dataset_is_valid() {
        let dataset = DatasetSeed::dataset().expect("bundled dataset parses");
        assert_eq!(dataset.name, DEFAULT_DATASET_NAME);
        assert_eq!(dataset.items.len(), 25);

        for (index, item) in dataset.items.iter().enumerate() {
            let index = u32::try_from(index).expect("index fits");
            assert_eq!(item.id, dataset_item_id(index));
            assert_eq!(item.metadata.index, index);
        }
    }

    #[test]
    fn bundled_dataset_covers_empty_and_multi_line_cases() {
        let dataset = DatasetSeed::dataset().expect("bundled dataset parses");
        assert!(dataset.items.iter().any(|item| item.expected_items.is_empty()));
        assert!(dataset.items.iter().any(|item| item.expected_items.len() > 1));
        assert!(dataset
            .items
            .iter()
            .any(|item| item.expected_items.iter().any(|line| !line.modifiers.is_empty())));
    }
}
