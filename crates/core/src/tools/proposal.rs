use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::item::{Category, Item, ItemId, Modifier, Size};
use crate::domain::menu::Menu;
use crate::domain::order::OrderLine;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModifierRef {
    Id(String),
    Object {
        modifier_id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl ModifierRef {
    pub fn key(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { modifier_id, .. } => modifier_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub item_id: String,
    #[serde(alias = "name")]
    pub item_name: String,
    #[serde(alias = "category")]
    pub category_name: Category,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub modifiers: Vec<ModifierRef>,
}

/// Upper bound on the quantity of one line, counting what is already ordered.
pub const MAX_LINE_QUANTITY: u32 = 99;

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    UnknownItem { item_id: String },
    InvalidQuantity { quantity: u32, on_order: u32 },
    ModifierUnavailable { item_name: String, modifier: String, available: Vec<String> },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownItem { item_id } => {
                write!(f, "`{item_id}` is not on the menu; look the item up first")
            }
            Self::InvalidQuantity { quantity: 0, .. } => write!(f, "quantity must be at least 1, got 0"),
            Self::InvalidQuantity { quantity, on_order } => write!(
                f,
                "at most {MAX_LINE_QUANTITY} of the same item per order; {on_order} already ordered, asked for {quantity}"
            ),
            Self::ModifierUnavailable { item_name, modifier, available } if available.is_empty() => {
                write!(f, "`{modifier}` is not available for {item_name}; it takes no modifiers")
            }
            Self::ModifierUnavailable { item_name, modifier, available } => write!(
                f,
                "`{modifier}` is not available for {item_name}; available modifiers: {}",
                available.join(", ")
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProposalOutcome {
    Accepted(Item),
    Rejected(RejectionReason),
}

impl ProposalOutcome {
    pub fn accepted(&self) -> Option<&Item> {
        match self {
            Self::Accepted(item) => Some(item),
            Self::Rejected(_) => None,
        }
    }

    pub fn to_payload(&self) -> Value {
        match self {
            Self::Accepted(item) => {
                let line = OrderLine::from(item);
                json!({
                    "added": true,
                    "item_id": line.item_id,
                    "item_name": line.name,
                    "category_name": item.category(),
                    "quantity": line.quantity,
                    "size": line.size,
                    "modifiers": line.modifiers,
                })
            }
            Self::Rejected(reason) => json!({ "added": false, "reason": reason.to_string() }),
        }
    }
}

/// Validates an addition against the catalog and returns the line to apply.
///
/// Canonical name, category and default size always come from the catalog entry.
/// `ordered` holds the lines the addition would merge into; a line never grows
/// past [`MAX_LINE_QUANTITY`].
pub fn propose_add_item<'a>(
    menu: &Menu,
    ordered: impl IntoIterator<Item = &'a Item>,
    request: &AddItemRequest,
) -> ProposalOutcome {
    let Some(entry) = menu.find(&ItemId(request.item_id.trim().to_string())) else {
        return ProposalOutcome::Rejected(RejectionReason::UnknownItem {
            item_id: request.item_id.clone(),
        });
    };

    let mut modifiers: Vec<Modifier> = Vec::with_capacity(request.modifiers.len());
    for requested in &request.modifiers {
        let Some(modifier) = resolve_modifier(entry, requested.key()) else {
            return ProposalOutcome::Rejected(RejectionReason::ModifierUnavailable {
                item_name: entry.name().to_string(),
                modifier: requested.key().to_string(),
                available: entry
                    .available_modifiers()
                    .iter()
                    .map(|modifier| modifier.modifier_id.clone())
                    .collect(),
            });
        };
        if !modifiers.contains(modifier) {
            modifiers.push(modifier.clone());
        }
    }

    let line = Item::new(entry.item_id().0.clone(), entry.name(), entry.category(), entry.default_size())
        .with_size(request.size.unwrap_or(entry.default_size()))
        .with_modifiers(modifiers)
        .with_quantity(request.quantity);

    let Ok(line) = line else {
        return ProposalOutcome::Rejected(RejectionReason::InvalidQuantity {
            quantity: request.quantity,
            on_order: 0,
        });
    };

    let on_order = ordered
        .into_iter()
        .filter(|existing| existing.is_same_configuration(&line))
        .fold(0_u32, |total, existing| total.saturating_add(existing.quantity()));
    if on_order.saturating_add(line.quantity()) > MAX_LINE_QUANTITY {
        return ProposalOutcome::Rejected(RejectionReason::InvalidQuantity {
            quantity: request.quantity,
            on_order,
        });
    }

    ProposalOutcome::Accepted(line)
}

fn resolve_modifier<'a>(entry: &'a Item, key: &str) -> Option<&'a Modifier> {
    let key = key.trim();
    entry.offers_modifier(key).or_else(|| {
        entry.available_modifiers().iter().find(|modifier| modifier.name.eq_ignore_ascii_case(key))
    })
}
