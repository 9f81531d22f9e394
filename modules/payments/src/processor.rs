use crate::models::{FailureCode, OrderConfirmedPayload, ProcessorOutcome};

/// Mock payment gateway. No external integration; outcomes are drawn
/// from a configurable success rate so retry/backoff and failure
/// classification can be exercised without a real processor.
///
/// Mirrors `MockPaymentProcessor`'s shape (a zero-field struct with a
/// single `process_payment` method), generalised from "always
/// succeeds" to a weighted outcome so the saga's failure paths are
/// reachable in development the same way its success path is.
pub struct MockPaymentProcessor {
    success_rate: f64,
}

impl MockPaymentProcessor {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    /// One attempt against the mock gateway. ~70% of failures are
    /// transient (split evenly across gateway timeout, network error,
    /// service unavailable, rate limited); the remainder are a
    /// terminal decline.
    pub async fn process_payment(&self, order: &OrderConfirmedPayload) -> ProcessorOutcome {
        tracing::info!(
            order_id = %order.order_id,
            amount = order.total_price,
            currency = %order.currency,
            "submitting payment to mock gateway"
        );

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        if fastrand::f64() < self.success_rate {
            let transaction_id = format!("mock_txn_{}", uuid::Uuid::new_v4().simple());
            tracing::info!(order_id = %order.order_id, %transaction_id, "mock gateway accepted payment");
            return ProcessorOutcome::Succeeded { transaction_id };
        }

        let code = if fastrand::f64() < 0.3 {
            FailureCode::PaymentDeclined
        } else {
            match fastrand::u8(0..4) {
                0 => FailureCode::GatewayTimeout,
                1 => FailureCode::NetworkError,
                2 => FailureCode::ServiceUnavailable,
                _ => FailureCode::RateLimited,
            }
        };

        let message = match code {
            FailureCode::PaymentDeclined => "card declined by issuer".to_string(),
            other => format!("mock gateway transient failure: {}", other.as_str()),
        };

        tracing::warn!(order_id = %order.order_id, code = code.as_str(), "mock gateway rejected payment");
        ProcessorOutcome::Failed { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderLineItem;

    fn sample_order() -> OrderConfirmedPayload {
        OrderConfirmedPayload {
            order_id: "order-1".to_string(),
            products: vec![OrderLineItem { product_id: "p1".to_string(), quantity: 1, unit_price: 10.0 }],
            total_price: 10.0,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn success_rate_one_always_succeeds() {
        let processor = MockPaymentProcessor::new(1.0);
        let outcome = processor.process_payment(&sample_order()).await;
        assert!(matches!(outcome, ProcessorOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn success_rate_zero_always_fails() {
        let processor = MockPaymentProcessor::new(0.0);
        let outcome = processor.process_payment(&sample_order()).await;
        assert!(matches!(outcome, ProcessorOutcome::Failed { .. }));
    }

    #[test]
    fn only_payment_declined_is_terminal() {
        assert!(!FailureCode::PaymentDeclined.is_transient());
        assert!(FailureCode::GatewayTimeout.is_transient());
        assert!(FailureCode::NetworkError.is_transient());
        assert!(FailureCode::ServiceUnavailable.is_transient());
        assert!(FailureCode::RateLimited.is_transient());
    }
}
