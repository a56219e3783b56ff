//! Deterministic order-taking operations.
//!
//! Every operation takes its inputs explicitly and returns a value. None of
//! them touch the order; accepted additions are applied by the materializer.

pub mod lookup;
pub mod proposal;
pub mod readback;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use lookup::{lookup_menu_item, LookupOutcome, MenuMatch, MAX_SUGGESTIONS};
pub use proposal::{propose_add_item, AddItemRequest, ModifierRef, ProposalOutcome, RejectionReason};
pub use readback::{finalize_order, read_order, FinalizeReceipt, OrderSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "lookup_menu_item")]
    LookupMenuItem,
    #[serde(rename = "add_item_to_order")]
    ProposeAddItem,
    #[serde(rename = "get_current_order")]
    ReadOrder,
    #[serde(rename = "finalize_order")]
    FinalizeOrder,
}

impl ToolName {
    pub const ALL: [ToolName; 4] =
        [ToolName::LookupMenuItem, ToolName::ProposeAddItem, ToolName::ReadOrder, ToolName::FinalizeOrder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LookupMenuItem => "lookup_menu_item",
            Self::ProposeAddItem => "add_item_to_order",
            Self::ReadOrder => "get_current_order",
            Self::FinalizeOrder => "finalize_order",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value.trim())
            .ok_or_else(|| format!("unknown tool `{value}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::ToolName;

    #[test]
    fn wire_names_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>(), Ok(name));
            assert_eq!(
                serde_json::to_value(name).expect("serialize"),
                serde_json::Value::String(name.as_str().to_string())
            );
        }
        assert!("remove_item".parse::<ToolName>().is_err());
    }
}
