use std::collections::BTreeSet;

use drivethru_core::tools::LookupOutcome;
use serde::Serialize;
use tracing::warn;

/// An addition that was not preceded by a successful lookup in the same turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProtocolViolation {
    pub item_id: String,
    pub tool_call_id: String,
    pub reason_code: &'static str,
}

/// Watches one turn's tool calls for add-before-lookup. Never blocks a call.
#[derive(Clone, Debug, Default)]
pub struct ProtocolMonitor {
    looked_up_ids: BTreeSet<String>,
    looked_up_names: BTreeSet<String>,
    violations: Vec<ProtocolViolation>,
}

impl ProtocolMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lookup(&mut self, outcome: &LookupOutcome) {
        if let Some(matched) = outcome.matched() {
            self.looked_up_ids.insert(matched.item_id.0.clone());
            self.looked_up_names.insert(matched.item_name.to_lowercase());
        }
    }

    /// Checks an add request. Returns the violation it recorded, if any.
    pub fn check_add(
        &mut self,
        tool_call_id: &str,
        item_id: &str,
        item_name: &str,
    ) -> Option<&ProtocolViolation> {
        let item_id = item_id.trim();
        if self.looked_up_ids.contains(item_id)
            || self.looked_up_names.contains(&item_name.trim().to_lowercase())
        {
            return None;
        }

        warn!(
            event_name = "agent.protocol.violation",
            item_id,
            tool_call_id,
            reason_code = "add_without_lookup",
            "item added without a successful lookup earlier in the turn"
        );
        self.violations.push(ProtocolViolation {
            item_id: item_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            reason_code: "add_without_lookup",
        });
        self.violations.last()
    }

    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<ProtocolViolation> {
        self.violations
    }
}
