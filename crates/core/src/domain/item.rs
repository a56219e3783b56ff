use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Snack,
    Small,
    Medium,
    Large,
    Regular,
}

impl Size {
    pub const ALL: [Size; 5] = [Size::Snack, Size::Small, Size::Medium, Size::Large, Size::Regular];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snack => "snack",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Regular => "regular",
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Breakfast,
    BeefPork,
    ChickenFish,
    Salads,
    SnacksSides,
    Desserts,
    Beverages,
    CoffeeTea,
    SmoothiesShakes,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::BeefPork => "beef-pork",
            Self::ChickenFish => "chicken-fish",
            Self::Salads => "salads",
            Self::SnacksSides => "snacks-sides",
            Self::Desserts => "desserts",
            Self::Beverages => "beverages",
            Self::CoffeeTea => "coffee-tea",
            Self::SmoothiesShakes => "smoothies-shakes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Modifier {
    pub modifier_id: String,
    pub name: String,
}

impl Modifier {
    pub fn new(modifier_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { modifier_id: modifier_id.into(), name: name.into() }
    }
}

/// Identity of an order line: catalog identity, size and the unordered modifier set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigurationKey {
    pub item_id: ItemId,
    pub category: Category,
    pub size: Size,
    pub modifiers: BTreeSet<Modifier>,
}

/// A menu entry or an order line.
///
/// Catalog entries carry `available_modifiers`; order lines carry `modifiers`.
/// `quantity` is always at least one and `size` is always concrete.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "ItemRecord")]
pub struct Item {
    item_id: ItemId,
    name: String,
    category_name: Category,
    default_size: Size,
    size: Size,
    quantity: u32,
    modifiers: Vec<Modifier>,
    available_modifiers: Vec<Modifier>,
}

impl Item {
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        default_size: Size,
    ) -> Self {
        Self {
            item_id: ItemId(item_id.into()),
            name: name.into(),
            category_name: category,
            default_size,
            size: default_size,
            quantity: 1,
            modifiers: Vec::new(),
            available_modifiers: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { item_id: self.item_id.0, quantity });
        }
        self.quantity = quantity;
        Ok(self)
    }

    pub fn with_modifiers(mut self, modifiers: Vec<Modifier>) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_available_modifiers(mut self, available_modifiers: Vec<Modifier>) -> Self {
        self.available_modifiers = available_modifiers;
        self
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category_name
    }

    pub fn default_size(&self) -> Size {
        self.default_size
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn available_modifiers(&self) -> &[Modifier] {
        &self.available_modifiers
    }

    pub fn offers_modifier(&self, modifier_id: &str) -> Option<&Modifier> {
        self.available_modifiers.iter().find(|modifier| modifier.modifier_id == modifier_id)
    }

    pub fn configuration_key(&self) -> ConfigurationKey {
        ConfigurationKey {
            item_id: self.item_id.clone(),
            category: self.category_name,
            size: self.size,
            modifiers: self.modifiers.iter().cloned().collect(),
        }
    }

    pub fn is_same_configuration(&self, other: &Item) -> bool {
        self.item_id == other.item_id
            && self.category_name == other.category_name
            && self.size == other.size
            && self.modifiers.iter().collect::<BTreeSet<_>>()
                == other.modifiers.iter().collect::<BTreeSet<_>>()
    }

    /// Sums quantities of two lines with the same configuration.
    pub fn combine(&self, other: &Item) -> Result<Item, DomainError> {
        if !self.is_same_configuration(other) {
            return Err(DomainError::ConfigurationMismatch {
                left: self.describe(),
                right: other.describe(),
            });
        }

        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or_else(|| DomainError::QuantityOverflow { item_id: self.item_id.0.clone() })?;

        let mut combined = self.clone();
        combined.quantity = quantity;
        Ok(combined)
    }

    pub fn describe(&self) -> String {
        let mut label = format!("{}x {} ({})", self.quantity, self.name, self.size);
        if !self.modifiers.is_empty() {
            let names =
                self.modifiers.iter().map(|modifier| modifier.name.as_str()).collect::<Vec<_>>();
            label.push_str(&format!(" [{}]", names.join(", ")));
        }
        label
    }
}

/// Equal when the configuration and the quantity match. Ordering is by quantity
/// and only defined between lines of the same configuration.
impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_configuration(other) && self.quantity == other.quantity
    }
}

impl Eq for Item {}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.is_same_configuration(other) {
            return None;
        }
        Some(self.quantity.cmp(&other.quantity))
    }
}

#[derive(Deserialize)]
struct ItemRecord {
    item_id: String,
    name: String,
    category_name: Category,
    #[serde(default = "default_size")]
    default_size: Size,
    #[serde(default)]
    size: Option<Size>,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default)]
    modifiers: Vec<Modifier>,
    #[serde(default)]
    available_modifiers: Vec<Modifier>,
}

fn default_size() -> Size {
    Size::Regular
}

fn default_quantity() -> u32 {
    1
}

impl TryFrom<ItemRecord> for Item {
    type Error = DomainError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        let item = Item::new(record.item_id, record.name, record.category_name, record.default_size)
            .with_size(record.size.unwrap_or(record.default_size))
            .with_modifiers(record.modifiers)
            .with_available_modifiers(record.available_modifiers);
        item.with_quantity(record.quantity)
    }
}
