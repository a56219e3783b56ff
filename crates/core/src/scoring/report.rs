use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    no_hallucinated_items, order_correctness, round3, tool_protocol_accuracy, Score,
    NO_HALLUCINATED_ITEMS, ORDER_CORRECTNESS, TOOL_CALL_ACCURACY,
};
use crate::domain::dataset::DatasetItem;
use crate::domain::order::OrderLine;
use crate::tools::ToolName;

/// What a single turn produced for one dataset case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub order_lines: Vec<OrderLine>,
    pub tool_calls: Vec<ToolName>,
    pub response: String,
    pub item_count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemEvaluation {
    pub dataset_item_id: String,
    pub utterance: String,
    pub scores: Vec<Score>,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ItemEvaluation {
    pub fn scored(item: &DatasetItem, output: TaskOutput, catalog_ids: &BTreeSet<&str>) -> Self {
        Self {
            dataset_item_id: item.id.clone(),
            utterance: item.utterance.clone(),
            scores: score_item(item, &output, catalog_ids),
            output: Some(output),
            error: None,
        }
    }

    /// A turn that never completed scores zero on every metric.
    pub fn failed(item: &DatasetItem, error: impl Into<String>) -> Self {
        let error = error.into();
        let comment = format!("Task failed: {error}");
        Self {
            dataset_item_id: item.id.clone(),
            utterance: item.utterance.clone(),
            scores: [ORDER_CORRECTNESS, TOOL_CALL_ACCURACY, NO_HALLUCINATED_ITEMS]
                .into_iter()
                .map(|name| Score::new(name, 0.0, comment.clone()))
                .collect(),
            output: None,
            error: Some(error),
        }
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.iter().find(|score| score.name == name).map(|score| score.value)
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

pub fn score_item(
    item: &DatasetItem,
    output: &TaskOutput,
    catalog_ids: &BTreeSet<&str>,
) -> Vec<Score> {
    vec![
        order_correctness(&item.expected_items, &output.order_lines),
        tool_protocol_accuracy(!item.expected_items.is_empty(), &output.tool_calls),
        no_hallucinated_items(catalog_ids, &output.order_lines),
    ]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunAggregate {
    pub avg_order_correctness: Option<f64>,
    pub comment: String,
    pub item_count: usize,
    pub failed_count: usize,
}

/// Mean order-correctness across a run, rounded to three decimals.
pub fn average_order_correctness(items: &[ItemEvaluation]) -> RunAggregate {
    let values: Vec<f64> = items.iter().filter_map(|item| item.score(ORDER_CORRECTNESS)).collect();
    let failed_count = items.iter().filter(|item| item.is_failure()).count();

    if values.is_empty() {
        return RunAggregate {
            avg_order_correctness: None,
            comment: "No scores".to_string(),
            item_count: items.len(),
            failed_count,
        };
    }

    let average = round3(values.iter().sum::<f64>() / values.len() as f64);
    RunAggregate {
        avg_order_correctness: Some(average),
        comment: format!("Average order correctness: {average:.3} across {} items", values.len()),
        item_count: items.len(),
        failed_count,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_name: String,
    pub dataset_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemEvaluation>,
    pub aggregate: RunAggregate,
}

impl EvaluationReport {
    pub fn new(
        run_name: impl Into<String>,
        dataset_name: impl Into<String>,
        started_at: DateTime<Utc>,
        items: Vec<ItemEvaluation>,
    ) -> Self {
        let aggregate = average_order_correctness(&items);
        Self {
            run_name: run_name.into(),
            dataset_name: dataset_name.into(),
            started_at,
            finished_at: Utc::now(),
            items,
            aggregate,
        }
    }

    /// Mean of one metric across every item, failures included as zero.
    pub fn mean_of(&self, name: &str) -> Option<f64> {
        let values: Vec<f64> = self.items.iter().filter_map(|item| item.score(name)).collect();
        if values.is_empty() {
            None
        } else {
            Some(round3(values.iter().sum::<f64>() / values.len() as f64))
        }
    }

    pub fn default_run_name(now: DateTime<Utc>) -> String {
        format!("eval-{}", now.format("%Y%m%d-%H%M%S"))
    }
}
