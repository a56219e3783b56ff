use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::order::OrderLine;
use crate::errors::DomainError;

pub const DEFAULT_DATASET_NAME: &str = "drive-thru/order-correctness-v1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub category: String,
    pub difficulty: String,
    pub index: u32,
}

/// One labeled case: what the customer says and what should end up in the order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetItem {
    pub id: String,
    pub utterance: String,
    #[serde(default)]
    pub expected_items: Vec<OrderLine>,
    pub metadata: DatasetMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub items: Vec<DatasetItem>,
}

pub fn dataset_item_id(index: u32) -> String {
    format!("order-correctness-{index:03}")
}

impl Dataset {
    pub fn from_json_str(raw: &str) -> Result<Self, DomainError> {
        let dataset: Dataset = serde_json::from_str(raw).map_err(|error| {
            DomainError::InvariantViolation(format!("malformed dataset: {error}"))
        })?;
        dataset.validate()?;
        Ok(dataset)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let mut ids = BTreeSet::new();
        for item in &self.items {
            if item.utterance.trim().is_empty() {
                return Err(DomainError::InvariantViolation(format!(
                    "dataset item `{}` has an empty utterance",
                    item.id
                )));
            }
            if !ids.insert(item.id.as_str()) {
                return Err(DomainError::InvariantViolation(format!(
                    "dataset item id `{}` is not unique",
                    item.id
                )));
            }
            if let Some(line) = item.expected_items.iter().find(|line| line.quantity == 0) {
                return Err(DomainError::InvalidQuantity {
                    item_id: line.item_id.0.clone(),
                    quantity: 0,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{dataset_item_id, Dataset};
    use crate::errors::DomainError;

    const RAW: &str = r#"{
        "name": "drive-thru/order-correctness-v1",
        "items": [
            {"id": "order-correctness-000", "utterance": "Two hash browns please",
             "expected_items": [{"item_id": "hash-brown", "name": "Hash Brown", "quantity": 2, "size": "regular"}],
             "metadata": {"category": "quantity", "difficulty": "easy", "index": 0}},
            {"id": "order-correctness-001", "utterance": "Hi, good morning!",
             "metadata": {"category": "greeting", "difficulty": "easy", "index": 1}}
        ]
    }"#;

    #[test]
    fn ids_are_zero_padded() {
        assert_eq!(dataset_item_id(7), "order-correctness-007");
    }

    #[test]
    fn parses_items_with_optional_expectations() {
        let dataset = Dataset::from_json_str(RAW).expect("dataset parses");
        assert_eq!(dataset.items.len(), 2);
        assert_eq!(dataset.items[0].expected_items[0].quantity, 2);
        assert!(dataset.items[0].expected_items[0].modifiers.is_empty());
        assert!(dataset.items[1].expected_items.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = RAW.replace("order-correctness-001", "order-correctness-000");
        let error = Dataset::from_json_str(&raw).expect_err("duplicate");
        assert!(matches!(error, DomainError::InvariantViolation(ref message) if message.contains("not unique")));
    }

    #[test]
    fn malformed_records_surface_as_errors() {
        let error = Dataset::from_json_str(r#"{"name": "x", "items": [{"id": "a"}]}"#)
            .expect_err("missing fields");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }
}
