use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use drivethru_core::domain::dataset::{DatasetItem, DatasetMetadata};
use drivethru_core::domain::order::OrderLine;

use super::{DatasetRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDatasetRepository {
    pool: DbPool,
}

impl SqlDatasetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DatasetRepository for SqlDatasetRepository {
    async fn upsert_items(
        &self,
        dataset_name: &str,
        items: &[DatasetItem],
    ) -> Result<usize, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for item in items {
            let expected_items = serde_json::to_string(&item.expected_items).map_err(|error| {
                RepositoryError::Decode(format!("cannot encode expected items for `{}`: {error}", item.id))
            })?;

            sqlx::query(
                r#"
                INSERT INTO eval_dataset_item (
                    id, dataset_name, item_index, utterance, expected_items_json,
                    category, difficulty, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    dataset_name = excluded.dataset_name,
                    item_index = excluded.item_index,
                    utterance = excluded.utterance,
                    expected_items_json = excluded.expected_items_json,
                    category = excluded.category,
                    difficulty = excluded.difficulty,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&item.id)
            .bind(dataset_name)
            .bind(i64::from(item.metadata.index))
            .bind(&item.utterance)
            .bind(expected_items)
            .bind(&item.metadata.category)
            .bind(&item.metadata.difficulty)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(items.len())
    }

    async fn list_items(&self, dataset_name: &str) -> Result<Vec<DatasetItem>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, item_index, utterance, expected_items_json, category, difficulty
            FROM eval_dataset_item
            WHERE dataset_name = ?
            ORDER BY item_index ASC, id ASC
            "#,
        )
        .bind(dataset_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(dataset_item_from_row).collect()
    }
}

fn dataset_item_from_row(row: &SqliteRow) -> Result<DatasetItem, RepositoryError> {
    let id: String = row.try_get("id")?;
    let index: i64 = row.try_get("item_index")?;
    let expected_items_json: String = row.try_get("expected_items_json")?;

    let expected_items: Vec<OrderLine> =
        serde_json::from_str(&expected_items_json).map_err(|error| {
            RepositoryError::Decode(format!("invalid expected_items_json for `{id}`: {error}"))
        })?;
    let index = u32::try_from(index)
        .map_err(|_| RepositoryError::Decode(format!("invalid item_index for `{id}`: {index}")))?;

    Ok(DatasetItem {
        utterance: row.try_get("utterance")?,
        expected_items,
        metadata: DatasetMetadata {
            category: row.try_get("category")?,
            difficulty: row.try_get("difficulty")?,
            index,
        },
        id,
    })
}
