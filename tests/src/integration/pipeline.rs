//! # End-to-End Pipeline
//!
//! A full [`Runtime`](relay_runtime::Runtime) wired with built-in providers:
//! scripted input → echo decision → output renderers, observed from the bus.

#[cfg(test)]
mod tests {
    use crate::support::eventually;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_bus::{handler_fn, SubscriptionSpec};
    use relay_runtime::builtin::AudioMeter;
    use relay_runtime::{
        register_builtins, FailurePolicy, LayerConfig, OutputProvider, ProviderDescriptor,
        ProviderRegistry, Runtime, RuntimeConfig, RuntimeState,
    };
    use relay_stream::{BackpressurePolicy, SubscriberConfig};
    use relay_types::events::{
        DECISION_INTENT_GENERATED, INPUT_MESSAGE_READY, OUTPUT_RENDER_COMPLETED,
        OUTPUT_RENDER_FAILED,
    };
    use relay_types::{
        BoxError, DomainTag, Event, IntentPayload, Layer, Payload, Pattern, ProviderStatus,
    };
    use serde_json::json;
    use std::sync::Arc;

    /// Renderer that rejects every intent.
    struct Broken;

    #[async_trait]
    impl OutputProvider for Broken {
        async fn render(&self, _intent: &IntentPayload) -> Result<(), BoxError> {
            Err("speaker unplugged".into())
        }
    }

    fn registry() -> Arc<ProviderRegistry> {
        let registry = ProviderRegistry::new();
        register_builtins(&registry).unwrap();
        registry
            .register(ProviderDescriptor::output("broken", |_| Ok(Broken)).source("test"))
            .unwrap();
        Arc::new(registry)
    }

    fn scripted(messages: serde_json::Value) -> LayerConfig {
        LayerConfig::default().with_provider("scripted", json!({ "messages": messages }))
    }

    /// Record every event seen by a wildcard observer tag.
    fn observe(runtime: &Runtime) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tag = DomainTag::new("observer");
        runtime
            .bus()
            .validator()
            .set_rule(tag.clone(), Some(vec![Pattern::All]));

        let sink = Arc::clone(&seen);
        runtime
            .bus()
            .on(
                SubscriptionSpec::new("*").domain(tag),
                handler_fn(move |event: Arc<Event>| {
                    sink.lock().push(Event::clone(&event));
                    async { Ok(()) }
                }),
            )
            .unwrap();
        seen
    }

    fn count(seen: &Mutex<Vec<Event>>, name: &str) -> usize {
        seen.lock().iter().filter(|e| e.name == name).count()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_renderer_does_not_block_healthy_one() {
        let config = RuntimeConfig {
            input: scripted(json!(["hello relay"])),
            decision: LayerConfig::default().with_provider("echo", json!({ "prefix": "> " })),
            output: LayerConfig::default()
                .with_policy(FailurePolicy::Continue)
                .with_provider("console", json!({}))
                .with_provider("broken", json!({})),
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::new(config, registry());
        let seen = observe(&runtime);

        let failures = runtime.start().await.unwrap();
        assert!(failures.is_empty(), "{failures:?}");
        assert_eq!(runtime.state(), RuntimeState::Running);

        eventually(|| {
            count(&seen, OUTPUT_RENDER_COMPLETED) == 1 && count(&seen, OUTPUT_RENDER_FAILED) == 1
        })
        .await;

        {
            let seen = seen.lock();
            let message = seen.iter().find(|e| e.name == INPUT_MESSAGE_READY).unwrap();
            assert_eq!(message.source, "scripted");

            let intent = seen.iter().find(|e| e.name == DECISION_INTENT_GENERATED).unwrap();
            assert_eq!(intent.source, "echo");
            match &intent.payload {
                Payload::Intent(i) => {
                    assert_eq!(i.text, "> hello relay");
                    assert_eq!(i.reply_to, Some(message.id));
                }
                other => panic!("unexpected payload {other}"),
            }

            let completed = seen.iter().find(|e| e.name == OUTPUT_RENDER_COMPLETED).unwrap();
            match &completed.payload {
                Payload::RenderCompleted(r) => assert_eq!(r.provider, "console"),
                other => panic!("unexpected payload {other}"),
            }

            let failed = seen.iter().find(|e| e.name == OUTPUT_RENDER_FAILED).unwrap();
            match &failed.payload {
                Payload::Failure(f) => {
                    assert_eq!(f.provider, "broken");
                    assert!(f.error.contains("speaker unplugged"));
                    assert_eq!(f.event_id, Some(intent.id));
                }
                other => panic!("unexpected payload {other}"),
            }
        }

        let reports = runtime.reports();
        let broken = reports.iter().find(|r| r.name == "broken").unwrap();
        assert_eq!(broken.layer, Layer::Output);
        assert_eq!(broken.status, ProviderStatus::Running);
        assert_eq!(broken.failed, 1);
        let console = reports.iter().find(|r| r.name == "console").unwrap();
        assert_eq!(console.handled, 1);

        let report = runtime.shutdown().await.unwrap();
        assert!(report.is_clean(), "{report:?}");
        assert!(runtime
            .reports()
            .iter()
            .all(|r| r.status == ProviderStatus::Stopped));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tone_sessions_reach_stream_subscribers() {
        let config = RuntimeConfig {
            input: scripted(json!(["hi", "again"])),
            decision: LayerConfig::default().with_provider("echo", json!({})),
            output: LayerConfig::default().with_provider(
                "tone",
                json!({ "sample_rate": 8000, "ms_per_char": 10, "min_ms": 40, "max_ms": 200 }),
            ),
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::new(config, registry());
        let meter = Arc::new(AudioMeter::new());
        runtime
            .stream()
            .subscribe(
                "meter",
                meter.clone(),
                SubscriberConfig::new(32, BackpressurePolicy::DropOldest),
            )
            .unwrap();
        let seen = observe(&runtime);

        assert!(runtime.start().await.unwrap().is_empty());

        eventually(|| count(&seen, OUTPUT_RENDER_COMPLETED) == 2).await;
        eventually(|| meter.reading().sessions == 2).await;

        let report = runtime.shutdown().await.unwrap();
        assert!(report.stream_drained);

        let reading = meter.reading();
        assert!(reading.chunks > 0);
        assert!(reading.peak > 0.0);
        assert!(reading.rms > 0.0);
    }

    #[tokio::test]
    async fn test_disabled_layer_runs_nothing() {
        let mut decision = LayerConfig::default().with_provider("echo", json!({}));
        decision.enabled = false;
        let config = RuntimeConfig {
            input: scripted(json!(["ignored"])),
            decision,
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::new(config, registry());
        let seen = observe(&runtime);

        runtime.start().await.unwrap();
        eventually(|| count(&seen, INPUT_MESSAGE_READY) == 1).await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        assert_eq!(count(&seen, DECISION_INTENT_GENERATED), 0);
        assert_eq!(runtime.bus().subscriber_count(INPUT_MESSAGE_READY), 1);
        runtime.shutdown().await.unwrap();
    }
}
