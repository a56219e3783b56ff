use std::borrow::Cow;
use std::sync::Arc;

use drivethru_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use drivethru_core::config::{AgentConfig, AppConfig};
use drivethru_core::domain::conversation::{ChatMessage, ConversationState};
use drivethru_core::domain::item::Item;
use drivethru_core::errors::{ApplicationError, DomainError};
use drivethru_core::flows::{
    FlowEngine, FlowTransitionError, TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnLoop,
    TurnState,
};
use drivethru_core::materializer::materialize_with_audit;
use drivethru_core::tools::ToolName;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{Decision, DecisionError, DecisionProvider, DecisionRequest, ToolSignature};
use crate::prompt::{extract_reasoning, reasoning_entry, PromptError, SystemPrompt};
use crate::protocol::{ProtocolMonitor, ProtocolViolation};
use crate::retry::{RetryError, RetryPolicy, RetrySupervisor};
use crate::tools::{ToolContext, ToolEffect, ToolRegistry};

pub const ESCALATION_MESSAGE: &str =
    "Sorry, I'm having trouble with that. Could you please repeat your order?";
const FINALIZED_MESSAGE: &str = "Thank you! Your order is finalized. Please pull forward to the window.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub max_steps: u32,
    pub max_reprompts: u32,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for RuntimeLimits {
    fn from(config: &AgentConfig) -> Self {
        Self { max_steps: config.max_steps_per_turn.max(1), max_reprompts: config.max_reprompts }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Responded,
    Finalized,
    Escalated,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TracedCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub outcome: Value,
}

impl TracedCall {
    pub fn tool(&self) -> Option<ToolName> {
        self.name.parse().ok()
    }
}

/// Ordered record of what one turn asked the tools to do.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TurnTrace {
    pub steps: u32,
    pub tool_calls: Vec<TracedCall>,
    pub violations: Vec<ProtocolViolation>,
}

impl TurnTrace {
    /// Known tool names in call order. Unknown names are skipped.
    pub fn tool_names(&self) -> Vec<ToolName> {
        self.tool_calls.iter().filter_map(TracedCall::tool).collect()
    }
}

#[derive(Clone, Debug)]
pub struct TurnResult {
    pub state: ConversationState,
    pub response: String,
    pub status: TurnStatus,
    pub trace: TurnTrace,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("decision provider failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: DecisionError },
    #[error(transparent)]
    Decision(DecisionError),
    #[error("decision provider output still malformed after {attempts} attempts: {detail}")]
    MalformedOutput { attempts: u32, detail: String },
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Domain(error) => Self::Domain(error),
            AgentError::Flow(error) => Self::Domain(DomainError::FlowTransition(error)),
            AgentError::Prompt(error) => Self::Configuration(error.to_string()),
            other => Self::Integration(other.to_string()),
        }
    }
}

/// Runs one customer utterance through Reason, Act and Materialize.
pub struct AgentRuntime<P> {
    provider: P,
    supervisor: RetrySupervisor,
    registry: ToolRegistry,
    signatures: Vec<ToolSignature>,
    prompt: SystemPrompt,
    engine: FlowEngine<TurnLoop>,
    audit_sink: Arc<dyn AuditSink>,
    limits: RuntimeLimits,
}

impl<P> AgentRuntime<P>
where
    P: DecisionProvider,
{
    pub fn new(provider: P, prompt: SystemPrompt) -> Self {
        let registry = ToolRegistry::with_default_tools();
        let signatures = registry.signatures();
        Self {
            provider,
            supervisor: RetrySupervisor::default(),
            registry,
            signatures,
            prompt,
            engine: FlowEngine::default(),
            audit_sink: Arc::new(TracingAuditSink),
            limits: RuntimeLimits::default(),
        }
    }

    pub fn from_config(provider: P, config: &AppConfig) -> Result<Self, AgentError> {
        let prompt = SystemPrompt::load(config.agent.prompt_template_path.as_deref())?;
        Ok(Self::new(provider, prompt)
            .with_retry_policy(RetryPolicy::from(&config.retry))
            .with_limits(RuntimeLimits::from(&config.agent)))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.supervisor = RetrySupervisor::new(policy);
        self
    }

    pub fn with_limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    pub async fn run_turn(
        &self,
        mut state: ConversationState,
        utterance: &str,
    ) -> Result<TurnResult, AgentError> {
        let correlation_id = format!("turn-{}", Uuid::new_v4());
        let audit = AuditContext::new(
            Some(state.conversation_id.clone()),
            Some(state.order.id().clone()),
            correlation_id.clone(),
            "turn-loop",
        );
        info!(
            event_name = "agent.turn.started",
            conversation_id = %state.conversation_id,
            order_id = %state.order.id(),
            correlation_id = %correlation_id,
            "customer turn started"
        );

        state.messages.push(ChatMessage::user(utterance));
        let mut phase = self.engine.initial_state();
        let mut context = TurnContext { steps_taken: 0, max_steps: self.limits.max_steps };
        let mut monitor = ProtocolMonitor::new();
        let mut trace = TurnTrace::default();

        loop {
            context.steps_taken += 1;
            trace.steps = context.steps_taken;

            let decision = self.reason(&state).await?;
            let (rationale, reply) = extract_reasoning(&decision.content);
            let entry = reasoning_entry(rationale.as_deref(), &decision.tool_calls, &reply);
            debug!(
                event_name = "agent.reasoning.logged",
                correlation_id = %correlation_id,
                step = context.steps_taken,
                entry = %entry,
                "decision rationale"
            );
            state.reasoning.push(entry);
            state.messages.push(ChatMessage::assistant(reply.clone(), decision.tool_calls.clone()));

            if !decision.requests_tools() {
                self.advance(&mut phase, TurnEvent::ResponseProduced, &context, &audit)?;
                return Ok(self.finish(state, reply, TurnStatus::Responded, monitor, trace));
            }
            self.advance(&mut phase, TurnEvent::ToolCallsRequested, &context, &audit)?;

            let mut accepted: Vec<Item> = Vec::new();
            let mut finalize_requested = false;
            for call in &decision.tool_calls {
                let tool_context =
                    ToolContext { menu: &state.menu, order: &state.order, pending: &accepted };
                let payload = match self.registry.execute(&call.name, &tool_context, &call.arguments) {
                    Ok(effect) => {
                        match &effect {
                            ToolEffect::Lookup(outcome) => monitor.record_lookup(outcome),
                            ToolEffect::Proposal(outcome) => {
                                let item_id = call.arguments["item_id"].as_str().unwrap_or_default();
                                let item_name = call.arguments["item_name"]
                                    .as_str()
                                    .or_else(|| call.arguments["name"].as_str())
                                    .unwrap_or_default();
                                monitor.check_add(&call.id, item_id, item_name);
                                if let Some(item) = outcome.accepted() {
                                    accepted.push(item.clone());
                                }
                            }
                            ToolEffect::Finalized(_) => finalize_requested = true,
                            ToolEffect::OrderSnapshot(_) => {}
                        }
                        effect.payload()
                    }
                    Err(error) => {
                        warn!(
                            event_name = "agent.tool.failed",
                            correlation_id = %correlation_id,
                            tool = %call.name,
                            error = %error,
                            "tool call could not be executed"
                        );
                        error.payload()
                    }
                };

                info!(
                    event_name = "agent.tool.executed",
                    correlation_id = %correlation_id,
                    tool = %call.name,
                    tool_call_id = %call.id,
                    "tool executed"
                );
                trace.tool_calls.push(TracedCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    outcome: payload.clone(),
                });
                state.messages.push(ChatMessage::tool(call.id.clone(), call.name.clone(), payload));
            }

            self.advance(&mut phase, TurnEvent::ToolsExecuted, &context, &audit)?;
            state.order =
                materialize_with_audit(state.order, accepted, self.audit_sink.as_ref(), &audit)?;

            if finalize_requested {
                self.advance(&mut phase, TurnEvent::FinalizeRequested, &context, &audit)?;
                let response = if reply.is_empty() { FINALIZED_MESSAGE.to_string() } else { reply };
                return Ok(self.finish(state, response, TurnStatus::Finalized, monitor, trace));
            }

            let outcome = self.advance(&mut phase, TurnEvent::OrderMaterialized, &context, &audit)?;
            if outcome.actions.contains(&TurnAction::Escalate) {
                warn!(
                    event_name = "agent.turn.escalated",
                    correlation_id = %correlation_id,
                    steps = context.steps_taken,
                    "step budget exhausted"
                );
                state.messages.push(ChatMessage::assistant(ESCALATION_MESSAGE, Vec::new()));
                return Ok(self.finish(
                    state,
                    ESCALATION_MESSAGE.to_string(),
                    TurnStatus::Escalated,
                    monitor,
                    trace,
                ));
            }
        }
    }

    async fn reason(&self, state: &ConversationState) -> Result<Decision, AgentError> {
        let system_prompt = self.prompt.render(state)?;
        let mut history = Cow::Borrowed(state.messages.as_slice());
        let mut reprompts = 0_u32;

        loop {
            let request = DecisionRequest {
                system_prompt: &system_prompt,
                messages: &history,
                tools: &self.signatures,
            };
            let error = match self.supervisor.run(|| self.provider.decide(request)).await {
                Ok(decision) => return Ok(decision),
                Err(RetryError::Exhausted { attempts, last }) => {
                    return Err(AgentError::RetriesExhausted { attempts, last });
                }
                Err(RetryError::NonRetryable(error)) => error,
            };

            let detail = match error {
                DecisionError::MalformedOutput(detail) => detail,
                other => return Err(AgentError::Decision(other)),
            };
            if reprompts >= self.limits.max_reprompts {
                return Err(AgentError::MalformedOutput { attempts: reprompts + 1, detail });
            }

            reprompts += 1;
            warn!(
                event_name = "agent.reprompt",
                conversation_id = %state.conversation_id,
                reprompts,
                detail = %detail,
                "decision output was malformed, asking again"
            );
            history.to_mut().push(ChatMessage::user(format!(
                "Your previous reply could not be processed ({detail}). Reply again: either call tools with valid JSON arguments or answer the customer directly."
            )));
        }
    }

    fn advance(
        &self,
        phase: &mut TurnState,
        event: TurnEvent,
        context: &TurnContext,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let outcome =
            self.engine.apply_with_audit(phase, &event, context, self.audit_sink.as_ref(), audit)?;
        *phase = outcome.to;
        Ok(outcome)
    }

    fn finish(
        &self,
        state: ConversationState,
        response: String,
        status: TurnStatus,
        monitor: ProtocolMonitor,
        mut trace: TurnTrace,
    ) -> TurnResult {
        trace.violations = monitor.into_violations();
        info!(
            event_name = "agent.turn.completed",
            conversation_id = %state.conversation_id,
            order_id = %state.order.id(),
            status = ?status,
            steps = trace.steps,
            tool_calls = trace.tool_calls.len(),
            violations = trace.violations.len(),
            "customer turn completed"
        );
        TurnResult { state, response, status, trace }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drivethru_core::audit::InMemoryAuditSink;
    use drivethru_core::domain::conversation::{ChatMessage, ConversationState, ToolCall};
    use drivethru_core::domain::menu::Menu;
    use drivethru_core::errors::ApplicationError;
    use serde_json::json;

    use super::{AgentError, AgentRuntime, RuntimeLimits, TurnStatus, ESCALATION_MESSAGE};
    use crate::llm::{Decision, DecisionError};
    use crate::mock::ScriptedDecisionProvider;
    use crate::prompt::SystemPrompt;

    fn state() -> ConversationState {
        let menu = Menu::from_json_str(include_str!("../../../menus/breakfast-v2.json")).expect("menu");
        ConversationState::fresh(Arc::new(menu))
    }

    fn runtime(script: Vec<Result<Decision, DecisionError>>) -> AgentRuntime<ScriptedDecisionProvider> {
        AgentRuntime::new(ScriptedDecisionProvider::new(script), SystemPrompt::builtin().expect("prompt"))
    }

    #[tokio::test]
    async fn direct_reply_strips_reasoning_and_logs_it() {
        let runtime = runtime(vec![Ok(Decision::respond(
            "<reasoning>Greeting only.</reasoning> Welcome! What can I get for you?",
        ))]);

        let result = runtime.run_turn(state(), "Hi").await.expect("turn");

        assert_eq!(result.status, TurnStatus::Responded);
        assert_eq!(result.response, "Welcome! What can I get for you?");
        assert_eq!(result.state.reasoning, vec!["[DIRECT] Greeting only.".to_string()]);
        assert_eq!(result.state.messages.len(), 2);
        assert!(matches!(result.state.messages[0], ChatMessage::User { .. }));
    }

    #[tokio::test]
    async fn add_without_lookup_is_flagged_but_applied() {
        let sink = InMemoryAuditSink::default();
        let runtime = runtime(vec![
            Ok(Decision::call_tools(
                "",
                vec![ToolCall::new(
                    "call-1",
                    "add_item_to_order",
                    json!({"item_id": "hotcakes", "item_name": "Hotcakes", "category_name": "breakfast"}),
                )],
            )),
            Ok(Decision::respond("Added hotcakes.")),
        ])
        .with_audit_sink(Arc::new(sink.clone()));

        let result = runtime.run_turn(state(), "Hotcakes").await.expect("turn");

        assert_eq!(result.state.order.items().len(), 1);
        assert_eq!(result.trace.violations.len(), 1);
        assert_eq!(result.trace.violations[0].item_id, "hotcakes");
        assert!(sink.events().iter().any(|event| event.event_type == "order.line_appended"));
    }

    #[tokio::test]
    async fn step_budget_escalates() {
        let read_back = || {
            Ok(Decision::call_tools(
                "",
                vec![ToolCall::new("call", "get_current_order", json!({}))],
            ))
        };
        let runtime = runtime(vec![read_back(), read_back(), read_back()])
            .with_limits(RuntimeLimits { max_steps: 2, max_reprompts: 0 });

        let result = runtime.run_turn(state(), "hmm").await.expect("turn");

        assert_eq!(result.status, TurnStatus::Escalated);
        assert_eq!(result.response, ESCALATION_MESSAGE);
        assert_eq!(result.trace.steps, 2);
    }

    #[tokio::test]
    async fn non_transient_provider_error_is_surfaced() {
        let runtime = runtime(vec![Err(DecisionError::Rejected {
            status: 401,
            message: "invalid api key".to_string(),
        })]);

        let error = runtime.run_turn(state(), "Hi").await.expect_err("rejected");
        assert!(matches!(error, AgentError::Decision(DecisionError::Rejected { status: 401, .. })));
        assert!(matches!(ApplicationError::from(error), ApplicationError::Integration(_)));
    }

    #[tokio::test]
    async fn malformed_output_beyond_reprompt_budget_fails_the_turn() {
        let malformed = || Err(DecisionError::MalformedOutput("arguments were not json".to_string()));
        let runtime = runtime(vec![malformed(), malformed()])
            .with_limits(RuntimeLimits { max_steps: 4, max_reprompts: 1 });

        let error = runtime.run_turn(state(), "Hi").await.expect_err("malformed");
        assert!(matches!(error, AgentError::MalformedOutput { attempts: 2, .. }));
    }
}
