use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use drivethru_core::scoring::{EvaluationReport, ItemEvaluation, RunAggregate, Score, TaskOutput};

use super::{EvaluationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEvaluationRepository {
    pool: DbPool,
}

impl SqlEvaluationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EvaluationRepository for SqlEvaluationRepository {
    async fn save_report(&self, report: &EvaluationReport) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM eval_item_result WHERE run_name = ?")
            .bind(&report.run_name)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO eval_run (
                run_name, dataset_name, started_at, finished_at, item_count,
                failed_count, avg_order_correctness, aggregate_comment
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_name) DO UPDATE SET
                dataset_name = excluded.dataset_name,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                item_count = excluded.item_count,
                failed_count = excluded.failed_count,
                avg_order_correctness = excluded.avg_order_correctness,
                aggregate_comment = excluded.aggregate_comment
            "#,
        )
        .bind(&report.run_name)
        .bind(&report.dataset_name)
        .bind(report.started_at.to_rfc3339())
        .bind(report.finished_at.to_rfc3339())
        .bind(count_to_i64(report.aggregate.item_count))
        .bind(count_to_i64(report.aggregate.failed_count))
        .bind(report.aggregate.avg_order_correctness)
        .bind(&report.aggregate.comment)
        .execute(&mut *tx)
        .await?;

        for (position, item) in report.items.iter().enumerate() {
            let scores = encode(&item.scores, "scores")?;
            let output = item.output.as_ref().map(|output| encode(output, "output")).transpose()?;

            sqlx::query(
                r#"
                INSERT INTO eval_item_result (
                    run_name, dataset_item_id, position, utterance, scores_json, output_json, error
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&report.run_name)
            .bind(&item.dataset_item_id)
            .bind(count_to_i64(position))
            .bind(&item.utterance)
            .bind(scores)
            .bind(output)
            .bind(&item.error)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            event_name = "persistence.eval_report.saved",
            run_name = %report.run_name,
            items = report.items.len(),
            "evaluation report saved"
        );
        Ok(())
    }

    async fn find_report(
        &self,
        run_name: &str,
    ) -> Result<Option<EvaluationReport>, RepositoryError> {
        let Some(run) = sqlx::query(
            r#"
            SELECT run_name, dataset_name, started_at, finished_at, item_count,
                   failed_count, avg_order_correctness, aggregate_comment
            FROM eval_run
            WHERE run_name = ?
            "#,
        )
        .bind(run_name)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT dataset_item_id, utterance, scores_json, output_json, error
            FROM eval_item_result
            WHERE run_name = ?
            ORDER BY position ASC
            "#,
        )
        .bind(run_name)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()?;
        let item_count: i64 = run.try_get("item_count")?;
        let failed_count: i64 = run.try_get("failed_count")?;

        Ok(Some(EvaluationReport {
            run_name: run.try_get("run_name")?,
            dataset_name: run.try_get("dataset_name")?,
            started_at: parse_timestamp("started_at", run.try_get("started_at")?)?,
            finished_at: parse_timestamp("finished_at", run.try_get("finished_at")?)?,
            items,
            aggregate: RunAggregate {
                avg_order_correctness: run.try_get("avg_order_correctness")?,
                comment: run.try_get("aggregate_comment")?,
                item_count: decode_count("item_count", item_count)?,
                failed_count: decode_count("failed_count", failed_count)?,
            },
        }))
    }
}

fn item_from_row(row: &SqliteRow) -> Result<ItemEvaluation, RepositoryError> {
    let dataset_item_id: String = row.try_get("dataset_item_id")?;
    let scores_json: String = row.try_get("scores_json")?;
    let output_json: Option<String> = row.try_get("output_json")?;

    let scores: Vec<Score> = serde_json::from_str(&scores_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid scores_json for `{dataset_item_id}`: {error}"))
    })?;
    let output = output_json
        .map(|raw| serde_json::from_str::<TaskOutput>(&raw))
        .transpose()
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid output_json for `{dataset_item_id}`: {error}"))
        })?;

    Ok(ItemEvaluation {
        utterance: row.try_get("utterance")?,
        scores,
        output,
        error: row.try_get("error")?,
        dataset_item_id,
    })
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode {what}: {error}")))
}

fn count_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn decode_count(column: &str, value: i64) -> Result<usize, RepositoryError> {
    usize::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("invalid count in `{column}`: {value}")))
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}
