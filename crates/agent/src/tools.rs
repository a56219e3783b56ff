use drivethru_core::domain::item::Item;
use drivethru_core::domain::menu::Menu;
use drivethru_core::domain::order::Order;
use drivethru_core::tools::{
    finalize_order, lookup_menu_item, propose_add_item, read_order, AddItemRequest, FinalizeReceipt,
    LookupOutcome, OrderSnapshot, ProposalOutcome, ToolName,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::ToolSignature;

/// Read-only view a tool executes against. `pending` holds additions accepted
/// earlier in the same step that are not materialized yet.
#[derive(Clone, Copy, Debug)]
pub struct ToolContext<'a> {
    pub menu: &'a Menu,
    pub order: &'a Order,
    pub pending: &'a [Item],
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolEffect {
    Lookup(LookupOutcome),
    Proposal(ProposalOutcome),
    OrderSnapshot(OrderSnapshot),
    Finalized(FinalizeReceipt),
}

impl ToolEffect {
    pub fn payload(&self) -> Value {
        match self {
            Self::Lookup(outcome) => outcome.to_payload(),
            Self::Proposal(outcome) => outcome.to_payload(),
            Self::OrderSnapshot(snapshot) => snapshot.to_payload(),
            Self::Finalized(receipt) => receipt.to_payload(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: ToolName, message: String },
}

impl ToolError {
    pub fn payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;
    fn signature(&self) -> ToolSignature;
    fn execute(&self, context: &ToolContext<'_>, arguments: &Value) -> Result<ToolEffect, ToolError>;
}

fn parse_arguments<T>(tool: ToolName, arguments: &Value) -> Result<T, ToolError>
where
    T: for<'de> Deserialize<'de>,
{
    let arguments = if arguments.is_null() { json!({}) } else { arguments.clone() };
    serde_json::from_value(arguments)
        .map_err(|error| ToolError::InvalidArguments { tool, message: error.to_string() })
}

#[derive(Debug, Deserialize)]
struct LookupArguments {
    #[serde(alias = "name")]
    item_name: String,
}

pub struct LookupMenuItemTool;

impl Tool for LookupMenuItemTool {
    fn name(&self) -> ToolName {
        ToolName::LookupMenuItem
    }

    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: self.name().as_str(),
            description: "Look up a menu item by name. Returns the item's id, category, default size and available modifiers, or up to three suggestions when it is not on the menu.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "item_name": { "type": "string", "description": "Name of the item the customer asked for" }
                },
                "required": ["item_name"]
            }),
        }
    }

    fn execute(&self, context: &ToolContext<'_>, arguments: &Value) -> Result<ToolEffect, ToolError> {
        let arguments: LookupArguments = parse_arguments(self.name(), arguments)?;
        Ok(ToolEffect::Lookup(lookup_menu_item(context.menu, &arguments.item_name)))
    }
}

pub struct AddItemToOrderTool;

impl Tool for AddItemToOrderTool {
    fn name(&self) -> ToolName {
        ToolName::ProposeAddItem
    }

    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: self.name().as_str(),
            description: "Add an item to the order. Only use ids, names and categories returned by lookup_menu_item.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "item_id": { "type": "string" },
                    "item_name": { "type": "string" },
                    "category_name": { "type": "string" },
                    "quantity": { "type": "integer", "minimum": 1, "default": 1 },
                    "size": {
                        "type": "string",
                        "enum": ["snack", "small", "medium", "large", "regular"]
                    },
                    "modifiers": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "modifier_id values from the item's available_modifiers"
                    }
                },
                "required": ["item_id", "item_name", "category_name"]
            }),
        }
    }

    fn execute(&self, context: &ToolContext<'_>, arguments: &Value) -> Result<ToolEffect, ToolError> {
        let request: AddItemRequest = parse_arguments(self.name(), arguments)?;
        let ordered = context.order.items().iter().chain(context.pending);
        Ok(ToolEffect::Proposal(propose_add_item(context.menu, ordered, &request)))
    }
}

pub struct GetCurrentOrderTool;

impl Tool for GetCurrentOrderTool {
    fn name(&self) -> ToolName {
        ToolName::ReadOrder
    }

    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: self.name().as_str(),
            description: "Read back the items currently in the order. Prices are not available.",
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    fn execute(&self, context: &ToolContext<'_>, _arguments: &Value) -> Result<ToolEffect, ToolError> {
        Ok(ToolEffect::OrderSnapshot(read_order(context.order)))
    }
}

pub struct FinalizeOrderTool;

impl Tool for FinalizeOrderTool {
    fn name(&self) -> ToolName {
        ToolName::FinalizeOrder
    }

    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: self.name().as_str(),
            description: "Finalize the order once the customer has confirmed it.",
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    fn execute(&self, context: &ToolContext<'_>, _arguments: &Value) -> Result<ToolEffect, ToolError> {
        Ok(ToolEffect::Finalized(finalize_order(context.order)))
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn with_default_tools() -> Self {
        let mut registry = Self::default();
        registry.register(LookupMenuItemTool);
        registry.register(AddItemToOrderTool);
        registry.register(GetCurrentOrderTool);
        registry.register(FinalizeOrderTool);
        registry
    }

    /// Registering a tool twice replaces the earlier entry.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.retain(|existing| existing.name() != tool.name());
        self.tools.push(Box::new(tool));
    }

    pub fn signatures(&self) -> Vec<ToolSignature> {
        self.tools.iter().map(|tool| tool.signature()).collect()
    }

    pub fn execute(
        &self,
        name: &str,
        context: &ToolContext<'_>,
        arguments: &Value,
    ) -> Result<ToolEffect, ToolError> {
        let tool = name
            .parse::<ToolName>()
            .ok()
            .and_then(|wanted| self.tools.iter().find(|tool| tool.name() == wanted))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(context, arguments)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
