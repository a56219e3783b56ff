//! Deterministic decision providers for driving the loop without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use drivethru_core::domain::conversation::ChatMessage;

use crate::llm::{Decision, DecisionError, DecisionProvider, DecisionRequest};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<&'static str>,
}

/// Replays a fixed queue of decisions, one per call.
#[derive(Debug, Default)]
pub struct ScriptedDecisionProvider {
    script: Mutex<VecDeque<Result<Decision, DecisionError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedDecisionProvider {
    pub fn new(script: Vec<Result<Decision, DecisionError>>) -> Self {
        Self { script: Mutex::new(script.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, next: Result<Decision, DecisionError>) {
        match self.script.lock() {
            Ok(mut script) => script.push_back(next),
            Err(poisoned) => poisoned.into_inner().push_back(next),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.script.lock() {
            Ok(script) => script.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl DecisionProvider for ScriptedDecisionProvider {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        let recorded = RecordedRequest {
            system_prompt: request.system_prompt.to_string(),
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|tool| tool.name).collect(),
        };
        match self.requests.lock() {
            Ok(mut requests) => requests.push(recorded),
            Err(poisoned) => poisoned.into_inner().push(recorded),
        }

        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| {
            Err(DecisionError::Rejected {
                status: 0,
                message: "scripted provider has no decisions left".to_string(),
            })
        })
    }
}

/// Decides with a closure over the request. Handy when each dataset item
/// needs an answer derived from its own utterance.
pub struct FnDecisionProvider<F> {
    decide: F,
}

impl<F> FnDecisionProvider<F>
where
    F: Fn(DecisionRequest<'_>) -> Result<Decision, DecisionError> + Send + Sync,
{
    pub fn new(decide: F) -> Self {
        Self { decide }
    }
}

#[async_trait]
impl<F> DecisionProvider for FnDecisionProvider<F>
where
    F: Fn(DecisionRequest<'_>) -> Result<Decision, DecisionError> + Send + Sync,
{
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        (self.decide)(request)
    }
}
