use crate::models::OrderStatus;

/// The four events that drive the order saga. Each corresponds to one
/// inbound routing key the consumer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaEvent {
    InventoryReservedSuccess,
    InventoryReservedFailed,
    PaymentSucceeded,
    PaymentFailed,
}

/// Pure transition predicate: `PENDING --confirm(inv.ok)--> CONFIRMED
/// --pay(pay.ok)--> PAID`, with `CANCELLED` reachable from either
/// PENDING (inventory failure) or CONFIRMED (payment failure). `PAID`
/// and `CANCELLED` are terminal — `None` in either of those states,
/// and `None` for any event that doesn't match the current state,
/// meaning "acknowledge and discard, no state change." Side effects
/// (persisting the row, enqueueing the outbox event) live in the
/// caller, never here.
pub fn next_status(current: OrderStatus, event: SagaEvent) -> Option<OrderStatus> {
    use OrderStatus::*;
    use SagaEvent::*;

    match (current, event) {
        (Pending, InventoryReservedSuccess) => Some(Confirmed),
        (Pending, InventoryReservedFailed) => Some(Cancelled),
        (Confirmed, PaymentSucceeded) => Some(Paid),
        (Confirmed, PaymentFailed) => Some(Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;
    use SagaEvent::*;

    #[test]
    fn happy_path_transitions() {
        assert_eq!(next_status(Pending, InventoryReservedSuccess), Some(Confirmed));
        assert_eq!(next_status(Confirmed, PaymentSucceeded), Some(Paid));
    }

    #[test]
    fn compensation_transitions() {
        assert_eq!(next_status(Pending, InventoryReservedFailed), Some(Cancelled));
        assert_eq!(next_status(Confirmed, PaymentFailed), Some(Cancelled));
    }

    #[test]
    fn terminal_states_absorb_every_event() {
        for event in [InventoryReservedSuccess, InventoryReservedFailed, PaymentSucceeded, PaymentFailed] {
            assert_eq!(next_status(Paid, event), None);
            assert_eq!(next_status(Cancelled, event), None);
        }
    }

    #[test]
    fn out_of_sequence_events_are_rejected() {
        // payment.succeeded can't fire against a PENDING order — it hasn't been confirmed yet.
        assert_eq!(next_status(Pending, PaymentSucceeded), None);
        // inventory.reserved.success against an already-CONFIRMED order is a stale redelivery.
        assert_eq!(next_status(Confirmed, InventoryReservedSuccess), None);
    }

    #[test]
    fn terminal_predicate_matches_paid_and_cancelled_only() {
        assert!(Paid.is_terminal());
        assert!(Cancelled.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Confirmed.is_terminal());
    }
}
