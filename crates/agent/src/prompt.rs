use std::fs;
use std::path::{Path, PathBuf};

use drivethru_core::domain::conversation::{ConversationState, ToolCall};
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

const TEMPLATE_NAME: &str = "drive_thru_system.txt";
const DEFAULT_TEMPLATE: &str = include_str!("../../../templates/prompts/drive_thru_system.txt.tera");
const OPEN_TAG: &str = "<reasoning>";
const CLOSE_TAG: &str = "</reasoning>";
const SNIPPET_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt template `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("prompt template error: {0}")]
    Template(#[from] tera::Error),
}

/// System prompt rendered fresh for every Reason step.
#[derive(Clone, Debug)]
pub struct SystemPrompt {
    tera: Tera,
}

impl SystemPrompt {
    pub fn builtin() -> Result<Self, PromptError> {
        Self::from_template(DEFAULT_TEMPLATE)
    }

    pub fn from_template(template: &str) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, template)?;
        Ok(Self { tera })
    }

    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let template = fs::read_to_string(path)
            .map_err(|source| PromptError::Io { path: path.to_path_buf(), source })?;
        Self::from_template(&template)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, PromptError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn render(&self, state: &ConversationState) -> Result<String, PromptError> {
        let menu = &state.menu;
        let menu_items = menu
            .items
            .iter()
            .map(|item| {
                format!("- {} [{}] (default size: {})", item.name(), item.category(), item.default_size())
            })
            .collect::<Vec<_>>()
            .join("\n");
        let current_order = if state.order.is_empty() {
            "Empty".to_string()
        } else {
            state
                .order
                .items()
                .iter()
                .map(|item| format!("- {}", item.describe()))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut context = Context::new();
        context.insert("location_name", &menu.location.name);
        context.insert("location_address", &menu.location.street_address());
        context.insert("menu_items", &menu_items);
        context.insert("current_order", &current_order);
        Ok(self.tera.render(TEMPLATE_NAME, &context)?)
    }
}

/// Splits the first `<reasoning>` block from a reply and strips every block
/// from the customer-facing text.
pub fn extract_reasoning(content: &str) -> (Option<String>, String) {
    let mut rationale = None;
    let mut cleaned = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find(OPEN_TAG) {
        let after_open = &rest[start + OPEN_TAG.len()..];
        let Some(end) = after_open.find(CLOSE_TAG) else {
            break;
        };
        cleaned.push_str(&rest[..start]);
        if rationale.is_none() {
            rationale = Some(after_open[..end].trim().to_string());
        }
        rest = &after_open[end + CLOSE_TAG.len()..];
    }
    cleaned.push_str(rest);

    (rationale.filter(|text| !text.is_empty()), cleaned.trim().to_string())
}

pub fn reasoning_entry(rationale: Option<&str>, tool_calls: &[ToolCall], content: &str) -> String {
    if tool_calls.is_empty() {
        return match rationale {
            Some(rationale) => format!("[DIRECT] {rationale}"),
            None => format!("[DIRECT] {}", content.chars().take(SNIPPET_CHARS).collect::<String>()),
        };
    }

    let names = tool_calls.iter().map(|call| call.name.as_str()).collect::<Vec<_>>().join(", ");
    match rationale {
        Some(rationale) => format!("[TOOL_CALL] {names}: {rationale}"),
        None => {
            let summary = tool_calls.iter().map(summarize_call).collect::<Vec<_>>().join("; ");
            format!("[TOOL_CALL] {names}: {summary}")
        }
    }
}

fn summarize_call(call: &ToolCall) -> String {
    let arguments = match &call.arguments {
        Value::Object(map) => {
            map.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join(", ")
        }
        Value::Null => String::new(),
        other => other.to_string(),
    };
    format!("{}({arguments})", call.name)
}
