//! Applies accepted additions to an order, in acceptance order.

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::item::Item;
use crate::domain::order::{MergeEffect, Order};
use crate::errors::DomainError;

pub fn materialize<I>(order: Order, accepted: I) -> Result<Order, DomainError>
where
    I: IntoIterator<Item = Item>,
{
    accepted.into_iter().try_fold(order, |order, item| order.merge(item).map(|(order, _)| order))
}

pub fn materialize_with_audit<I, S>(
    order: Order,
    accepted: I,
    sink: &S,
    audit: &AuditContext,
) -> Result<Order, DomainError>
where
    I: IntoIterator<Item = Item>,
    S: AuditSink + ?Sized,
{
    let mut order = order;
    for item in accepted {
        let item_id = item.item_id().0.clone();
        let added = item.quantity();
        let description = item.describe();

        let (next, effect) = match order.merge(item) {
            Ok(merged) => merged,
            Err(error) => {
                sink.emit(
                    audit
                        .event("order.merge_failed", AuditCategory::Order, AuditOutcome::Failed)
                        .with_metadata("item_id", item_id)
                        .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };

        let (event_type, line_index, line_quantity) = match effect {
            MergeEffect::Merged { line_index, quantity } => ("order.line_merged", line_index, quantity),
            MergeEffect::Appended { line_index } => ("order.line_appended", line_index, added),
        };
        tracing::info!(
            event_name = event_type,
            correlation_id = %audit.correlation_id,
            order_id = %next.id(),
            item_id = %item_id,
            line_index,
            line_quantity,
            "{description}"
        );
        sink.emit(
            audit
                .event(event_type, AuditCategory::Order, AuditOutcome::Success)
                .with_metadata("item_id", item_id)
                .with_metadata("added_quantity", added.to_string())
                .with_metadata("line_index", line_index.to_string())
                .with_metadata("line_quantity", line_quantity.to_string()),
        );
        order = next;
    }
    Ok(order)
}
