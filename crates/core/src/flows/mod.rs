pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, TurnLoop};
pub use states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnState};
