use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::menu::Menu;
use crate::domain::order::Order;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(format!("conv-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tool invocation requested by the decision provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: Value,
    },
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant { content: content.into(), tool_calls }
    }

    pub fn tool(tool_call_id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self::Tool { tool_call_id: tool_call_id.into(), name: name.into(), content }
    }
}

/// Everything one conversation carries between turns.
///
/// `messages` and `reasoning` are append-only, `menu` is shared read-only and
/// `order` is the only field a turn mutates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    pub messages: Vec<ChatMessage>,
    pub menu: Arc<Menu>,
    pub order: Order,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

impl ConversationState {
    pub fn new(conversation_id: ConversationId, menu: Arc<Menu>) -> Self {
        Self { conversation_id, messages: Vec::new(), menu, order: Order::new(), reasoning: Vec::new() }
    }

    pub fn fresh(menu: Arc<Menu>) -> Self {
        Self::new(ConversationId::generate(), menu)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{ChatMessage, ConversationState, ToolCall};
    use crate::domain::menu::fixtures::breakfast_menu;

    #[test]
    fn messages_are_tagged_by_role() {
        let message = ChatMessage::assistant(
            "",
            vec![ToolCall::new("call-1", "lookup_menu_item", json!({"item_name": "Hotcakes"}))],
        );
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["name"], "lookup_menu_item");

        let plain = serde_json::to_value(ChatMessage::assistant("hello", Vec::new())).expect("plain");
        assert!(plain.get("tool_calls").is_none());
    }

    #[test]
    fn state_envelope_round_trips() {
        let mut state = ConversationState::fresh(Arc::new(breakfast_menu()));
        state.messages.push(ChatMessage::user("Hi"));
        state.reasoning.push("[DIRECT] greeting".to_string());

        let raw = serde_json::to_string(&state).expect("serialize");
        let restored: ConversationState = serde_json::from_str(&raw).expect("deserialize");

        assert_eq!(restored, state);
        assert!(restored.conversation_id.0.starts_with("conv-"));
    }
}
