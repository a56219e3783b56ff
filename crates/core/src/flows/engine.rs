use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnState};

pub trait FlowDefinition {
    fn initial_state(&self) -> TurnState;
    fn transition(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Reason, then Act, then Materialize, looping back to Reason until the model
/// answers without tools, finalizes, or runs out of steps.
#[derive(Clone, Debug, Default)]
pub struct TurnLoop;

impl FlowDefinition for TurnLoop {
    fn initial_state(&self) -> TurnState {
        TurnState::Reason
    }

    fn transition(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_turn(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> TurnState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    audit
                        .event("loop.transition_applied", AuditCategory::Loop, AuditOutcome::Success)
                        .with_metadata("from", format!("{:?}", outcome.from))
                        .with_metadata("to", format!("{:?}", outcome.to))
                        .with_metadata("event", format!("{:?}", outcome.event))
                        .with_metadata("step", context.steps_taken.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("loop.transition_rejected", AuditCategory::Loop, AuditOutcome::Rejected)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<TurnLoop> {
    fn default() -> Self {
        Self::new(TurnLoop)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TurnState, event: TurnEvent },
}

fn transition_turn(
    current: &TurnState,
    event: &TurnEvent,
    context: &TurnContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use TurnAction::{
        ConfirmFinalizedOrder, Escalate, ExecuteTools, MaterializeProposals, ReasonAgain,
        RespondToCustomer,
    };
    use TurnEvent::{
        FinalizeRequested, OrderMaterialized, ResponseProduced, ToolCallsRequested, ToolsExecuted,
    };
    use TurnState::{Act, Done, Materialize, Reason};

    let (to, actions) = match (current, event) {
        (Reason, ToolCallsRequested) => (Act, vec![ExecuteTools]),
        (Reason, ResponseProduced) => (Done, vec![RespondToCustomer]),
        (Act, ToolsExecuted) => (Materialize, vec![MaterializeProposals]),
        (Materialize, FinalizeRequested) => (Done, vec![ConfirmFinalizedOrder]),
        (Materialize, OrderMaterialized) if context.steps_taken >= context.max_steps => {
            (Done, vec![Escalate])
        }
        (Materialize, OrderMaterialized) => (Reason, vec![ReasonAgain]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, TurnLoop};
    use crate::flows::states::{TurnAction, TurnContext, TurnEvent, TurnState};

    #[test]
    fn tool_step_cycles_back_to_reason() {
        let engine = FlowEngine::new(TurnLoop);
        let context = TurnContext { steps_taken: 1, max_steps: 4 };
        let mut state = engine.initial_state();

        state = engine
            .apply(&state, &TurnEvent::ToolCallsRequested, &context)
            .expect("reason -> act")
            .to;
        state = engine.apply(&state, &TurnEvent::ToolsExecuted, &context).expect("act -> mat").to;
        let back = engine
            .apply(&state, &TurnEvent::OrderMaterialized, &context)
            .expect("materialize -> reason");

        assert_eq!(back.to, TurnState::Reason);
        assert_eq!(back.actions, vec![TurnAction::ReasonAgain]);
    }

    #[test]
    fn direct_response_ends_the_turn() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&TurnState::Reason, &TurnEvent::ResponseProduced, &TurnContext::default())
            .expect("reason -> done");

        assert!(outcome.is_terminal());
        assert_eq!(outcome.actions, vec![TurnAction::RespondToCustomer]);
    }

    #[test]
    fn finalize_is_terminal_after_materialization() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&TurnState::Materialize, &TurnEvent::FinalizeRequested, &TurnContext::default())
            .expect("materialize -> done");

        assert!(outcome.is_terminal());
        assert_eq!(outcome.actions, vec![TurnAction::ConfirmFinalizedOrder]);
    }

    #[test]
    fn step_budget_escalates_instead_of_reasoning_again() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &TurnState::Materialize,
                &TurnEvent::OrderMaterialized,
                &TurnContext { steps_taken: 3, max_steps: 3 },
            )
            .expect("materialize -> done");

        assert!(outcome.is_terminal());
        assert_eq!(outcome.actions, vec![TurnAction::Escalate]);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&TurnState::Reason, &TurnEvent::ToolsExecuted, &TurnContext::default())
            .expect_err("reason cannot skip act");

        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: TurnState::Reason,
                event: TurnEvent::ToolsExecuted
            }
        ));
    }

    #[test]
    fn done_accepts_no_further_events() {
        let engine = FlowEngine::default();
        for event in [TurnEvent::ToolCallsRequested, TurnEvent::ResponseProduced] {
            assert!(engine.apply(&TurnState::Done, &event, &TurnContext::default()).is_err());
        }
        assert_eq!(TurnLoop.initial_state(), TurnState::Reason);
    }

    #[test]
    fn audited_transitions_record_outcomes() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, None, "turn-1", "turn-loop");

        engine
            .apply_with_audit(
                &TurnState::Reason,
                &TurnEvent::ToolCallsRequested,
                &TurnContext::default(),
                &sink,
                &audit,
            )
            .expect("valid");
        let _ = engine.apply_with_audit(
            &TurnState::Act,
            &TurnEvent::FinalizeRequested,
            &TurnContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "loop.transition_applied");
        assert_eq!(events[1].event_type, "loop.transition_rejected");
        assert_eq!(events[1].correlation_id, "turn-1");
    }
}
