//! Evaluation scorers and report types.
//!
//! Scorers are pure functions over expected lines, produced lines and the
//! decision trace of a turn.

pub mod correctness;
pub mod protocol;
pub mod report;

use serde::{Deserialize, Serialize};

pub use correctness::{order_correctness, ScoringWeights};
pub use protocol::{no_hallucinated_items, tool_protocol_accuracy};
pub use report::{
    average_order_correctness, score_item, EvaluationReport, ItemEvaluation, RunAggregate,
    TaskOutput,
};

pub const ORDER_CORRECTNESS: &str = "order_correctness";
pub const TOOL_CALL_ACCURACY: &str = "tool_call_accuracy";
pub const NO_HALLUCINATED_ITEMS: &str = "no_hallucinated_items";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub comment: String,
}

impl Score {
    pub fn new(name: impl Into<String>, value: f64, comment: impl Into<String>) -> Self {
        Self { name: name.into(), value, comment: comment.into() }
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
