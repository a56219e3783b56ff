use std::sync::Arc;

use chrono::Utc;
use drivethru_core::domain::conversation::ConversationState;
use drivethru_core::domain::dataset::{Dataset, DatasetItem};
use drivethru_core::domain::menu::Menu;
use drivethru_core::scoring::{EvaluationReport, ItemEvaluation, TaskOutput, ORDER_CORRECTNESS};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::llm::DecisionProvider;
use crate::runtime::{AgentRuntime, TurnResult};

/// Drives every dataset item through one isolated turn and scores it.
pub struct EvaluationRunner<P> {
    runtime: Arc<AgentRuntime<P>>,
    menu: Arc<Menu>,
    max_concurrency: usize,
}

impl<P> EvaluationRunner<P>
where
    P: DecisionProvider + 'static,
{
    pub fn new(runtime: Arc<AgentRuntime<P>>, menu: Arc<Menu>) -> Self {
        Self { runtime, menu, max_concurrency: 1 }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub async fn run(&self, run_name: &str, dataset: &Dataset) -> EvaluationReport {
        let started_at = Utc::now();
        info!(
            event_name = "eval.run.started",
            run_name,
            dataset_name = %dataset.name,
            items = dataset.items.len(),
            max_concurrency = self.max_concurrency,
            "evaluation run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (position, item) in dataset.items.iter().cloned().enumerate() {
            let runtime = Arc::clone(&self.runtime);
            let menu = Arc::clone(&self.menu);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let evaluation = match semaphore.acquire_owned().await {
                    Ok(_permit) => evaluate_item(&runtime, &menu, &item).await,
                    Err(error) => ItemEvaluation::failed(&item, error.to_string()),
                };
                (position, evaluation)
            });
        }

        let mut slots: Vec<Option<ItemEvaluation>> = vec![None; dataset.items.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, evaluation)) => slots[position] = Some(evaluation),
                Err(error) => warn!(
                    event_name = "eval.item.aborted",
                    run_name,
                    error = %error,
                    "evaluation task did not complete"
                ),
            }
        }

        let items = slots
            .into_iter()
            .zip(&dataset.items)
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| ItemEvaluation::failed(item, "evaluation task did not complete"))
            })
            .collect();

        let report = EvaluationReport::new(run_name, dataset.name.clone(), started_at, items);
        info!(
            event_name = "eval.run.completed",
            run_name,
            avg_order_correctness = report.aggregate.avg_order_correctness.unwrap_or_default(),
            failed = report.aggregate.failed_count,
            "{}",
            report.aggregate.comment
        );
        report
    }

    pub async fn run_item(&self, item: &DatasetItem) -> ItemEvaluation {
        evaluate_item(&self.runtime, &self.menu, item).await
    }
}

async fn evaluate_item<P>(runtime: &AgentRuntime<P>, menu: &Arc<Menu>, item: &DatasetItem) -> ItemEvaluation
where
    P: DecisionProvider,
{
    let state = ConversationState::fresh(Arc::clone(menu));
    let evaluation = match runtime.run_turn(state, &item.utterance).await {
        Ok(result) => ItemEvaluation::scored(item, task_output(result), &menu.catalog_ids()),
        Err(error) => {
            warn!(
                event_name = "eval.item.failed",
                dataset_item_id = %item.id,
                error = %error,
                "turn failed during evaluation"
            );
            ItemEvaluation::failed(item, error.to_string())
        }
    };

    info!(
        event_name = "eval.item.scored",
        dataset_item_id = %item.id,
        order_correctness = evaluation.score(ORDER_CORRECTNESS).unwrap_or_default(),
        failed = evaluation.is_failure(),
        "dataset item scored"
    );
    evaluation
}

pub fn task_output(result: TurnResult) -> TaskOutput {
    TaskOutput {
        order_lines: result.state.order.lines(),
        tool_calls: result.trace.tool_names(),
        response: result.response,
        item_count: result.state.order.total_quantity(),
    }
}
