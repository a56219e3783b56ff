use std::sync::Arc;

use drivethru_core::domain::conversation::{ConversationId, ConversationState};
use drivethru_core::domain::menu::Menu;
use drivethru_core::errors::{ApplicationError, InterfaceError};
use drivethru_db::repositories::{ConversationRepository, RepositoryError};
use thiserror::Error;
use tracing::{error, info};

use crate::llm::DecisionProvider;
use crate::runtime::{AgentError, AgentRuntime, TurnResult};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("unknown conversation `{0}`")]
    UnknownConversation(ConversationId),
    #[error("conversation persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Turn(#[from] AgentError),
}

impl ConversationError {
    /// What the customer hears when a turn cannot be completed.
    pub fn user_message(&self) -> &'static str {
        InterfaceError::from(ApplicationError::from(self)).user_message()
    }
}

impl From<&ConversationError> for ApplicationError {
    fn from(error: &ConversationError) -> Self {
        match error {
            ConversationError::UnknownConversation(id) => {
                Self::Persistence(format!("unknown conversation `{id}`"))
            }
            ConversationError::Persistence(error) => Self::Persistence(error.to_string()),
            ConversationError::Turn(AgentError::Domain(error)) => Self::Domain(error.clone()),
            ConversationError::Turn(AgentError::Prompt(error)) => Self::Configuration(error.to_string()),
            ConversationError::Turn(error) => Self::Integration(error.to_string()),
        }
    }
}

/// Restores state before a turn and persists it only when the turn succeeds.
pub struct ConversationService<P, R> {
    runtime: AgentRuntime<P>,
    repository: R,
    menu: Arc<Menu>,
}

impl<P, R> ConversationService<P, R>
where
    P: DecisionProvider,
    R: ConversationRepository,
{
    pub fn new(runtime: AgentRuntime<P>, repository: R, menu: Arc<Menu>) -> Self {
        Self { runtime, repository, menu }
    }

    pub fn runtime(&self) -> &AgentRuntime<P> {
        &self.runtime
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub async fn start(&self) -> Result<ConversationState, ConversationError> {
        let state = ConversationState::fresh(Arc::clone(&self.menu));
        self.repository.save(state.clone()).await?;
        info!(
            event_name = "conversation.started",
            conversation_id = %state.conversation_id,
            order_id = %state.order.id(),
            "conversation started"
        );
        Ok(state)
    }

    pub async fn resume(&self, id: &ConversationId) -> Result<ConversationState, ConversationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ConversationError::UnknownConversation(id.clone()))
    }

    pub async fn handle_utterance(
        &self,
        id: &ConversationId,
        utterance: &str,
    ) -> Result<TurnResult, ConversationError> {
        let state = self.resume(id).await?;
        let result = match self.runtime.run_turn(state, utterance).await {
            Ok(result) => result,
            Err(turn_error) => {
                error!(
                    event_name = "conversation.turn_failed",
                    conversation_id = %id,
                    error = %turn_error,
                    "turn failed; persisted state left unchanged"
                );
                return Err(turn_error.into());
            }
        };

        self.repository.save(result.state.clone()).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drivethru_core::domain::conversation::ConversationId;
    use drivethru_core::domain::menu::Menu;
    use drivethru_db::repositories::{ConversationRepository, InMemoryConversationRepository};

    use super::{ConversationError, ConversationService};
    use crate::llm::{Decision, DecisionError};
    use crate::mock::ScriptedDecisionProvider;
    use crate::prompt::SystemPrompt;
    use crate::runtime::AgentRuntime;

    fn service(
        script: Vec<Result<Decision, DecisionError>>,
    ) -> ConversationService<ScriptedDecisionProvider, InMemoryConversationRepository> {
        let menu = Menu::from_json_str(include_str!("../../../menus/breakfast-v2.json")).expect("menu");
        let runtime = AgentRuntime::new(
            ScriptedDecisionProvider::new(script),
            SystemPrompt::builtin().expect("prompt"),
        );
        ConversationService::new(runtime, InMemoryConversationRepository::default(), Arc::new(menu))
    }

    #[tokio::test]
    async fn start_persists_a_fresh_state() {
        let service = service(Vec::new());
        let state = service.start().await.expect("start");

        let stored = service
            .repository()
            .find_by_id(&state.conversation_id)
            .await
            .expect("lookup")
            .expect("stored");
        assert!(stored.messages.is_empty());
        assert!(stored.order.is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_is_an_error() {
        let service = service(Vec::new());
        let error = service
            .handle_utterance(&ConversationId("conv-missing".to_string()), "Hi")
            .await
            .expect_err("unknown");

        assert!(matches!(error, ConversationError::UnknownConversation(_)));
        assert!(!error.user_message().is_empty());
    }

    #[tokio::test]
    async fn failed_turn_leaves_stored_state_untouched() {
        let service = service(vec![
            Ok(Decision::respond("Welcome!")),
            Err(DecisionError::Rejected { status: 400, message: "bad request".to_string() }),
        ]);
        let state = service.start().await.expect("start");

        service.handle_utterance(&state.conversation_id, "Hi").await.expect("first turn");
        let error = service
            .handle_utterance(&state.conversation_id, "Hash brown")
            .await
            .expect_err("second turn fails");

        assert!(matches!(error, ConversationError::Turn(_)));
        assert!(error.user_message().contains("repeat"));
        let stored = service.resume(&state.conversation_id).await.expect("resume");
        assert_eq!(stored.messages.len(), 2);
    }
}
