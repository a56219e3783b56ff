use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::item::{Item, ItemId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl Location {
    pub fn street_address(&self) -> String {
        format!("{}, {}, {} {}", self.address, self.city, self.state, self.zip)
    }
}

/// Read-only catalog for one location. Loaded once per conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MenuDocument", into = "MenuDocument")]
pub struct Menu {
    pub menu_id: String,
    pub menu_name: String,
    pub menu_version: String,
    pub location: Location,
    pub items: Vec<Item>,
}

impl Menu {
    pub fn from_json_str(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw)
            .map_err(|error| DomainError::InvalidMenu(format!("could not parse menu: {error}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, DomainError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            DomainError::InvalidMenu(format!("could not read `{}`: {error}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn find(&self, item_id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.item_id() == item_id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Item> {
        let wanted = name.trim().to_lowercase();
        self.items.iter().find(|item| item.name().to_lowercase() == wanted)
    }

    pub fn catalog_ids(&self) -> BTreeSet<&str> {
        self.items.iter().map(|item| item.item_id().as_str()).collect()
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct MenuDocument {
    metadata: MenuMetadata,
    items: Vec<Item>,
}

#[derive(Clone, Serialize, Deserialize)]
struct MenuMetadata {
    menu_id: String,
    menu_name: String,
    menu_version: String,
    location: Location,
}

impl TryFrom<MenuDocument> for Menu {
    type Error = DomainError;

    fn try_from(document: MenuDocument) -> Result<Self, Self::Error> {
        let mut seen = BTreeSet::new();
        for item in &document.items {
            if !seen.insert(item.item_id().as_str()) {
                return Err(DomainError::InvalidMenu(format!(
                    "duplicate catalog entry `{}`",
                    item.item_id()
                )));
            }
        }

        let MenuDocument { metadata, items } = document;
        Ok(Menu {
            menu_id: metadata.menu_id,
            menu_name: metadata.menu_name,
            menu_version: metadata.menu_version,
            location: metadata.location,
            items,
        })
    }
}

impl From<Menu> for MenuDocument {
    fn from(menu: Menu) -> Self {
        MenuDocument {
            metadata: MenuMetadata {
                menu_id: menu.menu_id,
                menu_name: menu.menu_name,
                menu_version: menu.menu_version,
                location: menu.location,
            },
            items: menu.items,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::breakfast_menu;
    use super::Menu;
    use crate::domain::item::{ItemId, Size};
    use crate::errors::DomainError;

    const MENU_JSON: &str = r#"{
        "metadata": {
            "menu_id": "breakfast",
            "menu_name": "Breakfast Menu",
            "menu_version": "2",
            "location": {
                "id": "store-001", "name": "Main Street", "address": "1 Main St",
                "city": "Springfield", "state": "IL", "zip": "62701", "country": "US"
            }
        },
        "items": [
            {"item_id": "hash-brown", "name": "Hash Brown", "category_name": "snacks-sides",
             "default_size": "regular", "available_modifiers": []},
            {"item_id": "hotcakes", "name": "Hotcakes", "category_name": "breakfast",
             "default_size": "regular",
             "available_modifiers": [{"modifier_id": "sausage", "name": "Sausage"}]}
        ]
    }"#;

    #[test]
    fn parses_metadata_wrapped_document() {
        let menu = Menu::from_json_str(MENU_JSON).expect("menu parses");
        assert_eq!(menu.menu_id, "breakfast");
        assert_eq!(menu.items.len(), 2);
        assert_eq!(menu.location.street_address(), "1 Main St, Springfield, IL 62701");

        let hotcakes = menu.find(&ItemId("hotcakes".to_string())).expect("hotcakes");
        assert_eq!(hotcakes.size(), Size::Regular);
        assert!(hotcakes.offers_modifier("sausage").is_some());
    }

    #[test]
    fn duplicate_catalog_ids_are_rejected() {
        let raw = MENU_JSON.replace("\"hotcakes\"", "\"hash-brown\"");
        let error = Menu::from_json_str(&raw).expect_err("duplicate ids");
        assert!(matches!(error, DomainError::InvalidMenu(ref message) if message.contains("duplicate")));
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let menu = breakfast_menu();
        let item = menu.find_by_name("  egg MCMUFFIN ").expect("found");
        assert_eq!(item.item_id().as_str(), "egg-mcmuffin");
        assert!(menu.find_by_name("Big Mac").is_none());
    }

    #[test]
    fn serialized_menu_keeps_file_layout() {
        let menu = breakfast_menu();
        let value = serde_json::to_value(&menu).expect("serialize");
        assert_eq!(value["metadata"]["menu_id"], "breakfast");

        let back: Menu = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, menu);
        assert!(back.catalog_ids().contains("hash-brown"));
    }
}
