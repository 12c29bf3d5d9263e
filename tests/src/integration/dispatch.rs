//! # Dispatch Ordering and Failure Handling
//!
//! Priority tiers, error isolation versus propagation, and `off()` racing an
//! in-flight emit.

#[cfg(test)]
mod tests {
    use crate::support::{failing_handler, within, Recorder};
    use relay_bus::{BusError, EmitOptions, EventBus, SubscriptionSpec, ValidationMode};
    use relay_types::events::INPUT_MESSAGE_READY;
    use relay_types::MessagePayload;
    use std::time::Duration;

    fn bus() -> EventBus {
        EventBus::layered(ValidationMode::Permissive)
    }

    fn message() -> MessagePayload {
        MessagePayload::new("hello", "viewer").with_platform("test")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lower_priority_value_finishes_first() {
        let bus = bus();
        let recorder = Recorder::new();

        // Registered first and fast, but in the later tier.
        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY).priority(50),
            recorder.handler("p50"),
        )
        .unwrap();
        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY).priority(10),
            recorder.slow_handler("p10", Duration::from_millis(40)),
        )
        .unwrap();

        within(bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::waiting()))
            .await
            .unwrap();

        assert_eq!(recorder.entries(), vec!["p10", "p50"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_same_priority_handlers_run_concurrently() {
        let bus = bus();
        let recorder = Recorder::new();
        for label in ["a", "b", "c"] {
            bus.on(
                SubscriptionSpec::new(INPUT_MESSAGE_READY),
                recorder.slow_handler(label, Duration::from_millis(150)),
            )
            .unwrap();
        }

        let started = std::time::Instant::now();
        within(bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::waiting()))
            .await
            .unwrap();

        assert_eq!(recorder.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_isolated_failure_does_not_stop_siblings() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY),
            failing_handler("provider exploded"),
        )
        .unwrap();
        bus.on(SubscriptionSpec::new(INPUT_MESSAGE_READY), recorder.handler("b"))
            .unwrap();

        let receipt = within(bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::waiting()))
            .await
            .unwrap();

        assert_eq!(receipt.listeners, 2);
        assert_eq!(recorder.entries(), vec!["b"]);
        let stats = bus.get_stats(INPUT_MESSAGE_READY).unwrap();
        assert_eq!(stats.emit_count, 1);
        assert_eq!(stats.error_count, 1);
    }

    #[tokio::test]
    async fn test_propagating_emit_returns_first_failure() {
        let bus = bus();
        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY),
            failing_handler("provider exploded"),
        )
        .unwrap();

        let result = within(bus.emit(
            INPUT_MESSAGE_READY,
            message(),
            "test",
            EmitOptions::propagating(),
        ))
        .await;

        match result {
            Err(BusError::Handler(err)) => {
                assert_eq!(err.event, INPUT_MESSAGE_READY);
                assert!(err.message.contains("provider exploded"));
                assert!(!err.panicked);
            }
            other => panic!("expected handler error, got {other:?}"),
        }
        assert_eq!(bus.get_stats(INPUT_MESSAGE_READY).unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn test_off_during_inflight_emit_prevents_delivery() {
        let bus = bus();
        let gate = Recorder::new();
        let late = Recorder::new();

        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY).priority(0),
            gate.slow_handler("gate", Duration::from_millis(60)),
        )
        .unwrap();
        let handle = bus
            .on(
                SubscriptionSpec::new(INPUT_MESSAGE_READY).priority(10),
                late.handler("late"),
            )
            .unwrap();

        let receipt = bus
            .emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::default())
            .await
            .unwrap();
        assert_eq!(receipt.listeners, 2);

        // The dispatch is parked in the first tier.
        assert!(bus.off(&handle));
        assert!(!bus.off(&handle));

        crate::support::eventually(|| gate.len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(late.is_empty());

        within(bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::waiting()))
            .await
            .unwrap();
        assert!(late.is_empty());
        assert_eq!(bus.subscriber_count(INPUT_MESSAGE_READY), 1);
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_handlers() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.on(SubscriptionSpec::new("decision.*"), recorder.handler("any"))
            .unwrap();

        let result = bus
            .emit(
                "decision.intent.generated",
                message(),
                "test",
                EmitOptions::waiting(),
            )
            .await;

        assert!(matches!(result, Err(BusError::Validation(_))));
        assert!(recorder.is_empty());
        let stats = bus.get_stats("decision.intent.generated").unwrap();
        assert_eq!(stats.emit_count, 0);
        assert_eq!(stats.error_count, 1);
    }
}
