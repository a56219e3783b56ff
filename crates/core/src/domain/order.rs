use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::item::{Item, ItemId, Modifier, Size};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeEffect {
    Merged { line_index: usize, quantity: u32 },
    Appended { line_index: usize },
}

/// A customer's order. Lines are only ever added or merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    order_id: OrderId,
    items: Vec<Item>,
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}

impl Order {
    pub fn new() -> Self {
        Self::with_id(OrderId::generate())
    }

    pub fn with_id(order_id: OrderId) -> Self {
        Self { order_id, items: Vec::new() }
    }

    pub fn id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().fold(0_u32, |total, item| total.saturating_add(item.quantity()))
    }

    pub fn lines(&self) -> Vec<OrderLine> {
        self.items.iter().map(OrderLine::from).collect()
    }

    /// Folds `item` into the order: a same-configuration line grows, otherwise
    /// a new line is appended.
    pub fn merge(self, item: Item) -> Result<(Order, MergeEffect), DomainError> {
        let Order { order_id, mut items } = self;

        let existing = items.iter().position(|line| line.is_same_configuration(&item));
        let effect = match existing {
            Some(line_index) => {
                let combined = items[line_index].combine(&item)?;
                let quantity = combined.quantity();
                items[line_index] = combined;
                MergeEffect::Merged { line_index, quantity }
            }
            None => {
                items.push(item);
                MergeEffect::Appended { line_index: items.len() - 1 }
            }
        };

        Ok((Order { order_id, items }, effect))
    }

    pub fn add(self, item: Item) -> Result<Order, DomainError> {
        self.merge(item).map(|(order, _)| order)
    }
}

/// Flat, price-free view of one order line. Also the shape of expected lines in
/// evaluation datasets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: ItemId,
    pub name: String,
    pub quantity: u32,
    pub size: Size,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

impl From<&Item> for OrderLine {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.item_id().clone(),
            name: item.name().to_string(),
            quantity: item.quantity(),
            size: item.size(),
            modifiers: item.modifiers().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeEffect, Order, OrderId};
    use crate::domain::item::{Category, Item, Modifier, Size};

    fn egg_mcmuffin() -> Item {
        Item::new("egg-mcmuffin", "Egg McMuffin", Category::Breakfast, Size::Regular)
    }

    fn hash_brown() -> Item {
        Item::new("hash-brown", "Hash Brown", Category::SnacksSides, Size::Regular)
    }

    #[test]
    fn new_orders_are_empty_with_generated_ids() {
        let first = Order::new();
        let second = Order::new();
        assert!(first.is_empty());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn repeated_configuration_merges_into_one_line() {
        let order = Order::new();
        let (order, first) = order.merge(egg_mcmuffin()).expect("first add");
        let (order, second) = order.merge(egg_mcmuffin()).expect("second add");

        assert_eq!(first, MergeEffect::Appended { line_index: 0 });
        assert_eq!(second, MergeEffect::Merged { line_index: 0, quantity: 2 });
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity(), 2);
    }

    #[test]
    fn distinct_configurations_append_new_lines() {
        let whites = egg_mcmuffin().with_modifiers(vec![Modifier::new("egg-whites", "Egg Whites")]);
        let order = Order::new()
            .add(egg_mcmuffin())
            .and_then(|order| order.add(hash_brown()))
            .and_then(|order| order.add(whites))
            .expect("adds");

        assert_eq!(order.items().len(), 3);
        assert_eq!(order.total_quantity(), 3);
    }

    #[test]
    fn order_id_survives_any_sequence_of_merges() {
        let id = OrderId("order-fixed".to_string());
        let mut order = Order::with_id(id.clone());
        for quantity in 1..=4 {
            let item = hash_brown().with_quantity(quantity).expect("quantity");
            order = order.add(item).expect("add");
            order = order.add(egg_mcmuffin()).expect("add");
        }

        assert_eq!(order.id(), &id);
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.items()[0].quantity(), 10);
        assert_eq!(order.items()[1].quantity(), 4);
    }

    #[test]
    fn merging_never_grows_the_set_of_configurations_beyond_distinct_inputs() {
        let inputs = [egg_mcmuffin(), hash_brown(), egg_mcmuffin(), hash_brown(), egg_mcmuffin()];
        let order = inputs
            .iter()
            .cloned()
            .try_fold(Order::new(), |order, item| order.add(item))
            .expect("adds");

        assert_eq!(order.items().len(), 2);
        assert_eq!(order.total_quantity(), 5);
    }

    #[test]
    fn lines_expose_price_free_views() {
        let order = Order::new().add(hash_brown().with_quantity(2).expect("two")).expect("add");
        let lines = order.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_id.as_str(), "hash-brown");
        assert_eq!(lines[0].quantity, 2);

        let payload = serde_json::to_value(&lines[0]).expect("serialize");
        assert!(payload.get("price").is_none());
    }
}
