use serde::Serialize;
use serde_json::Value;

use crate::domain::item::{Category, Item, ItemId, Modifier, Size};
use crate::domain::menu::Menu;

pub const MAX_SUGGESTIONS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MenuMatch {
    pub item_id: ItemId,
    pub item_name: String,
    pub category_name: Category,
    pub default_size: Size,
    pub available_modifiers: Vec<Modifier>,
}

impl From<&Item> for MenuMatch {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.item_id().clone(),
            item_name: item.name().to_string(),
            category_name: item.category(),
            default_size: item.default_size(),
            available_modifiers: item.available_modifiers().to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LookupOutcome {
    pub found: bool,
    pub requested: String,
    #[serde(flatten)]
    pub item: Option<MenuMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl LookupOutcome {
    pub fn matched(&self) -> Option<&MenuMatch> {
        self.item.as_ref().filter(|_| self.found)
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Exact case-insensitive name match, else up to three containment suggestions.
pub fn lookup_menu_item(menu: &Menu, name: &str) -> LookupOutcome {
    let requested = name.trim().to_string();

    if let Some(item) = menu.find_by_name(&requested) {
        return LookupOutcome {
            found: true,
            requested,
            item: Some(MenuMatch::from(item)),
            suggestions: Vec::new(),
        };
    }

    let query = requested.to_lowercase();
    let suggestions = if query.is_empty() {
        Vec::new()
    } else {
        menu.items
            .iter()
            .filter(|item| {
                let candidate = item.name().to_lowercase();
                candidate.contains(&query) || query.contains(&candidate)
            })
            .take(MAX_SUGGESTIONS)
            .map(|item| item.name().to_string())
            .collect()
    };

    LookupOutcome { found: false, requested, item: None, suggestions }
}

#[cfg(test)]
mod tests {
    use super::{lookup_menu_item, MAX_SUGGESTIONS};
    use crate::domain::item::{Category, Item, Size};
    use crate::domain::menu::fixtures::breakfast_menu;

    #[test]
    fn exact_match_ignores_case_and_padding() {
        let outcome = lookup_menu_item(&breakfast_menu(), "  hash BROWN ");
        let matched = outcome.matched().expect("found");

        assert_eq!(matched.item_id.as_str(), "hash-brown");
        assert_eq!(matched.default_size, Size::Regular);
        assert!(outcome.suggestions.is_empty());
    }

    #[test]
    fn miss_suggests_names_containing_the_query() {
        let outcome = lookup_menu_item(&breakfast_menu(), "McMuffin");

        assert!(!outcome.found);
        assert_eq!(outcome.suggestions, vec!["Egg McMuffin", "Sausage McMuffin"]);
    }

    #[test]
    fn miss_suggests_names_contained_in_the_query() {
        let outcome = lookup_menu_item(&breakfast_menu(), "two hash browns");
        assert!(!outcome.found);
        assert_eq!(outcome.suggestions, vec!["Hash Brown"]);
    }

    #[test]
    fn suggestions_are_capped() {
        let mut menu = breakfast_menu();
        for index in 0..5 {
            menu.items.push(Item::new(
                format!("biscuit-{index}"),
                format!("Biscuit {index}"),
                Category::Breakfast,
                Size::Regular,
            ));
        }

        let outcome = lookup_menu_item(&menu, "biscuit");
        assert_eq!(outcome.suggestions.len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn unknown_item_has_no_suggestions() {
        let outcome = lookup_menu_item(&breakfast_menu(), "Big Mac");
        assert!(!outcome.found);
        assert!(outcome.suggestions.is_empty());

        let payload = outcome.to_payload();
        assert_eq!(payload["found"], false);
        assert!(payload.get("item_id").is_none());
    }

    #[test]
    fn found_payload_flattens_catalog_fields() {
        let payload = lookup_menu_item(&breakfast_menu(), "Hotcakes").to_payload();
        assert_eq!(payload["found"], true);
        assert_eq!(payload["item_id"], "hotcakes");
        assert_eq!(payload["category_name"], "breakfast");
        assert_eq!(payload["available_modifiers"][0]["modifier_id"], "sausage");
    }
}
