//! Conversational order-taking agent.
//!
//! Each customer utterance runs one turn of a Reason, Act, Materialize loop:
//! - **Reason** (`runtime`) asks a [`DecisionProvider`] for either a reply or
//!   tool calls, supervised by the retry policy in `retry`.
//! - **Act** (`tools`) runs the requested tools against the menu and order.
//! - **Materialize** folds accepted additions into the order.
//!
//! The provider only chooses tools. Transitions, merges and scoring stay
//! deterministic in `drivethru-core`.

pub mod conversation;
pub mod evaluation;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod prompt;
pub mod protocol;
pub mod retry;
pub mod runtime;
pub mod tools;

pub use conversation::{ConversationError, ConversationService};
pub use evaluation::EvaluationRunner;
pub use llm::{Decision, DecisionError, DecisionProvider, DecisionRequest, ToolSignature};
pub use openai::OpenAiCompatibleProvider;
pub use prompt::SystemPrompt;
pub use retry::{RetryError, RetryPolicy, RetrySupervisor};
pub use runtime::{AgentError, AgentRuntime, RuntimeLimits, TurnResult, TurnStatus, TurnTrace};
