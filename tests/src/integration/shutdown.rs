//! # Bounded Shutdown
//!
//! `cleanup` must return near its deadline no matter what handlers do.

#[cfg(test)]
mod tests {
    use crate::support::{hanging_handler, within, Recorder};
    use relay_bus::{BusError, EmitOptions, EventBus, SubscriptionSpec, ValidationMode};
    use relay_types::events::INPUT_MESSAGE_READY;
    use relay_types::MessagePayload;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::layered(ValidationMode::Permissive))
    }

    fn message() -> MessagePayload {
        MessagePayload::new("still there?", "viewer")
    }

    #[tokio::test]
    async fn test_forced_cleanup_cancels_hanging_handler() {
        let bus = bus();
        bus.on(SubscriptionSpec::new(INPUT_MESSAGE_READY), hanging_handler())
            .unwrap();
        bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::default())
            .await
            .unwrap();
        assert_eq!(bus.in_flight(), 1);

        let started = Instant::now();
        let report = within(bus.cleanup(Duration::from_secs(1), true)).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1600), "overran: {elapsed:?}");
        assert!(!report.drained);
        assert_eq!(report.in_flight_at_start, 1);
        assert!(report.cancelled >= 1);
        assert_eq!(report.subscriptions_removed, 1);
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn test_waiting_emitter_sees_cancellation() {
        let bus = bus();
        bus.on(SubscriptionSpec::new(INPUT_MESSAGE_READY), hanging_handler())
            .unwrap();

        let emitter = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::waiting())
                    .await
            })
        };
        crate::support::eventually(|| bus.in_flight() == 1).await;

        let report = within(bus.cleanup(Duration::from_millis(100), true)).await;
        assert_eq!(report.cancelled, 1);

        match within(emitter).await.unwrap() {
            Err(BusError::Cancelled { event }) => assert_eq!(event, INPUT_MESSAGE_READY),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_graceful_cleanup_drains_finishing_work() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY),
            recorder.slow_handler("slow", Duration::from_millis(50)),
        )
        .unwrap();
        bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::default())
            .await
            .unwrap();

        let report = within(bus.cleanup(Duration::from_secs(1), false)).await;
        assert!(report.drained);
        assert_eq!(report.cancelled, 0);
        assert_eq!(recorder.entries(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_closed_bus_refuses_new_work() {
        let bus = bus();
        bus.cleanup(Duration::from_millis(10), false).await;

        assert!(matches!(
            bus.emit(INPUT_MESSAGE_READY, message(), "test", EmitOptions::default())
                .await,
            Err(BusError::Closed)
        ));
        assert!(matches!(
            bus.on(SubscriptionSpec::new(INPUT_MESSAGE_READY), Recorder::new().handler("late")),
            Err(BusError::Closed)
        ));
    }
}
