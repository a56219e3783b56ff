use std::collections::BTreeSet;

use super::{Score, NO_HALLUCINATED_ITEMS, TOOL_CALL_ACCURACY};
use crate::domain::order::OrderLine;
use crate::tools::ToolName;

/// Staged check that lookups precede additions in the call trace.
///
/// Only the first occurrence of each tool counts. When the case expects no
/// items, any addition fails the check.
pub fn tool_protocol_accuracy(items_expected: bool, trace: &[ToolName]) -> Score {
    let first_lookup = trace.iter().position(|name| *name == ToolName::LookupMenuItem);
    let first_add = trace.iter().position(|name| *name == ToolName::ProposeAddItem);

    if !items_expected {
        return match first_add {
            None => Score::new(TOOL_CALL_ACCURACY, 1.0, "Correctly did not add items"),
            Some(_) => Score::new(
                TOOL_CALL_ACCURACY,
                0.0,
                format!("Should not have called add_item_to_order. Tool calls: {}", render(trace)),
            ),
        };
    }

    match (first_lookup, first_add) {
        (None, None) => {
            Score::new(TOOL_CALL_ACCURACY, 0.0, "No tool calls made, expected ordering tools")
        }
        (None, Some(_)) => Score::new(
            TOOL_CALL_ACCURACY,
            0.3,
            "add_item_to_order called without lookup_menu_item first",
        ),
        (Some(_), None) => Score::new(
            TOOL_CALL_ACCURACY,
            0.3,
            "lookup_menu_item called but add_item_to_order never called",
        ),
        (Some(lookup), Some(add)) if lookup < add => {
            Score::new(TOOL_CALL_ACCURACY, 1.0, "Correct: lookup before add")
        }
        (Some(lookup), Some(add)) => Score::new(
            TOOL_CALL_ACCURACY,
            0.5,
            format!(
                "Protocol violation: add_item_to_order at index {add} before lookup_menu_item at {lookup}"
            ),
        ),
    }
}

/// Fails iff any produced line names an item outside the catalog.
pub fn no_hallucinated_items(catalog_ids: &BTreeSet<&str>, actual: &[OrderLine]) -> Score {
    if actual.is_empty() {
        return Score::new(NO_HALLUCINATED_ITEMS, 1.0, "No items in order");
    }

    let hallucinated: Vec<&str> = actual
        .iter()
        .filter(|line| !catalog_ids.contains(line.item_id.as_str()))
        .map(|line| line.name.as_str())
        .collect();

    if hallucinated.is_empty() {
        Score::new(NO_HALLUCINATED_ITEMS, 1.0, "All items are on the menu")
    } else {
        Score::new(
            NO_HALLUCINATED_ITEMS,
            0.0,
            format!("Hallucinated items not on menu: [{}]", hallucinated.join(", ")),
        )
    }
}

fn render(trace: &[ToolName]) -> String {
    let names: Vec<&str> = trace.iter().map(ToolName::as_str).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{no_hallucinated_items, tool_protocol_accuracy};
    use crate::domain::item::{ItemId, Size};
    use crate::domain::order::OrderLine;
    use crate::tools::ToolName::{FinalizeOrder, LookupMenuItem, ProposeAddItem, ReadOrder};

    #[test]
    fn staged_protocol_scores() {
        assert_eq!(tool_protocol_accuracy(true, &[LookupMenuItem, ProposeAddItem]).value, 1.0);
        assert_eq!(tool_protocol_accuracy(true, &[ProposeAddItem, LookupMenuItem]).value, 0.5);
        assert_eq!(tool_protocol_accuracy(true, &[ProposeAddItem]).value, 0.3);
        assert_eq!(tool_protocol_accuracy(true, &[LookupMenuItem, ReadOrder]).value, 0.3);
        assert_eq!(tool_protocol_accuracy(true, &[]).value, 0.0);
    }

    #[test]
    fn only_first_occurrences_decide_ordering() {
        let trace = [LookupMenuItem, ProposeAddItem, ProposeAddItem, LookupMenuItem, FinalizeOrder];
        assert_eq!(tool_protocol_accuracy(true, &trace).value, 1.0);
    }

    #[test]
    fn adding_when_nothing_was_expected_fails() {
        assert_eq!(tool_protocol_accuracy(false, &[LookupMenuItem]).value, 1.0);
        assert_eq!(tool_protocol_accuracy(false, &[]).value, 1.0);

        let score = tool_protocol_accuracy(false, &[LookupMenuItem, ProposeAddItem]);
        assert_eq!(score.value, 0.0);
        assert!(score.comment.contains("add_item_to_order"));
    }

    #[test]
    fn hallucination_check_is_binary_over_catalog_ids() {
        let catalog: BTreeSet<&str> = ["hash-brown", "hotcakes"].into_iter().collect();
        let line = |id: &str| OrderLine {
            item_id: ItemId(id.to_string()),
            name: id.to_string(),
            quantity: 1,
            size: Size::Regular,
            modifiers: Vec::new(),
        };

        assert_eq!(no_hallucinated_items(&catalog, &[]).value, 1.0);
        assert_eq!(no_hallucinated_items(&catalog, &[line("hotcakes")]).value, 1.0);

        let score = no_hallucinated_items(&catalog, &[line("hotcakes"), line("big-mac")]);
        assert_eq!(score.value, 0.0);
        assert!(score.comment.contains("big-mac"));
    }
}
