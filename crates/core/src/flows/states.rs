use serde::{Deserialize, Serialize};

/// Phases of one customer turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    Reason,
    Act,
    Materialize,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    ToolCallsRequested,
    ResponseProduced,
    ToolsExecuted,
    OrderMaterialized,
    FinalizeRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    pub steps_taken: u32,
    pub max_steps: u32,
}

impl Default for TurnContext {
    fn default() -> Self {
        Self { steps_taken: 0, max_steps: 8 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnAction {
    ExecuteTools,
    MaterializeProposals,
    ReasonAgain,
    RespondToCustomer,
    ConfirmFinalizedOrder,
    Escalate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub actions: Vec<TurnAction>,
}

impl TransitionOutcome {
    pub fn is_terminal(&self) -> bool {
        self.to == TurnState::Done
    }
}
