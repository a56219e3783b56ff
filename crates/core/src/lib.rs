pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod materializer;
pub mod scoring;
pub mod tools;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::conversation::{ChatMessage, ConversationId, ConversationState, ToolCall};
pub use domain::dataset::{Dataset, DatasetItem, DatasetMetadata, DEFAULT_DATASET_NAME};
pub use domain::item::{Category, Item, ItemId, Modifier, Size};
pub use domain::menu::{Location, Menu};
pub use domain::order::{MergeEffect, Order, OrderId, OrderLine};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{FlowEngine, TurnAction, TurnContext, TurnEvent, TurnLoop, TurnState};
pub use materializer::{materialize, materialize_with_audit};
pub use scoring::{EvaluationReport, ItemEvaluation, Score, TaskOutput};
pub use tools::ToolName;
