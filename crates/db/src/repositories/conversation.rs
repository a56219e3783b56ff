use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use drivethru_core::domain::conversation::{ConversationId, ConversationState};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredEnvelope {
    version: u32,
    state: ConversationState,
}

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT envelope_json FROM conversation_state WHERE conversation_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("envelope_json")?;
        decode_envelope(id, &raw).map(Some)
    }

    async fn save(&self, state: ConversationState) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let conversation_id = state.conversation_id.0.clone();
        let order_id = state.order.id().0.clone();
        let message_count = i64::try_from(state.messages.len()).unwrap_or(i64::MAX);
        let envelope = serde_json::to_string(&StoredEnvelope { version: ENVELOPE_VERSION, state })
            .map_err(|error| RepositoryError::Decode(format!("cannot encode envelope: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversation_state (
                conversation_id, order_id, envelope_json, message_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                order_id = excluded.order_id,
                envelope_json = excluded.envelope_json,
                message_count = excluded.message_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&conversation_id)
        .bind(&order_id)
        .bind(envelope)
        .bind(message_count)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            event_name = "persistence.conversation.saved",
            conversation_id = %conversation_id,
            order_id = %order_id,
            message_count,
            "conversation state saved"
        );
        Ok(())
    }
}

fn decode_envelope(id: &ConversationId, raw: &str) -> Result<ConversationState, RepositoryError> {
    let envelope: StoredEnvelope = serde_json::from_str(raw).map_err(|error| {
        RepositoryError::Decode(format!("corrupted state envelope for `{id}`: {error}"))
    })?;
    if envelope.version != ENVELOPE_VERSION {
        return Err(RepositoryError::Decode(format!(
            "unsupported state envelope version {} for `{id}`",
            envelope.version
        )));
    }
    if envelope.state.conversation_id != *id {
        return Err(RepositoryError::Decode(format!(
            "state envelope stored under `{id}` belongs to `{}`",
            envelope.state.conversation_id
        )));
    }
    Ok(envelope.state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use drivethru_core::domain::conversation::{ChatMessage, ConversationId, ConversationState};
    use drivethru_core::domain::item::{Category, Item, Size};
    use drivethru_core::domain::menu::{Location, Menu};

    use super::SqlConversationRepository;
    use crate::repositories::{ConversationRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    fn menu() -> Arc<Menu> {
        Arc::new(Menu {
            menu_id: "breakfast".to_string(),
            menu_name: "Breakfast".to_string(),
            menu_version: "v2".to_string(),
            location: Location {
                id: "loc-1".to_string(),
                name: "Main Street".to_string(),
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip: "62701".to_string(),
                country: "US".to_string(),
            },
            items: vec![Item::new("hash-brown", "Hash Brown", Category::SnacksSides, Size::Regular)],
        })
    }

    #[tokio::test]
    async fn sql_conversation_repo_round_trip_and_overwrite() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool);
        let mut state = ConversationState::fresh(menu());

        repo.save(state.clone()).await.expect("save fresh state");

        state.messages.push(ChatMessage::user("Two hash browns please"));
        let hash_browns = Item::new("hash-brown", "Hash Brown", Category::SnacksSides, Size::Regular)
            .with_quantity(2)
            .expect("two");
        state.order = state.order.clone().add(hash_browns).expect("add");
        repo.save(state.clone()).await.expect("overwrite state");

        let restored = repo.find_by_id(&state.conversation_id).await.expect("find state");
        assert_eq!(restored, Some(state));
    }

    #[tokio::test]
    async fn unknown_conversation_is_none() {
        let repo = SqlConversationRepository::new(setup_pool().await);
        let found = repo.find_by_id(&ConversationId("conv-missing".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn corrupted_envelope_is_a_decode_error() {
        let pool = setup_pool().await;
        sqlx::query(
            "INSERT INTO conversation_state (conversation_id, order_id, envelope_json, message_count, created_at, updated_at)
             VALUES ('conv-bad', 'order-bad', '{not json', 0, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert corrupted row");

        let repo = SqlConversationRepository::new(pool);
        let error = repo
            .find_by_id(&ConversationId("conv-bad".to_string()))
            .await
            .expect_err("corrupted envelope should fail");
        assert!(matches!(error, RepositoryError::Decode(ref message) if message.contains("conv-bad")));
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
