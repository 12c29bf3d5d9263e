//! # Layer Topology Enforcement
//!
//! The architectural validator as seen through a live bus.

#[cfg(test)]
mod tests {
    use crate::support::Recorder;
    use relay_bus::{BusError, EventBus, SubscriptionSpec, ValidationMode};
    use relay_types::events::{DECISION_INTENT_GENERATED, INPUT_MESSAGE_READY, OUTPUT_RENDER_COMPLETED};
    use relay_types::{DomainTag, Layer, Pattern};

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let bus = EventBus::layered(ValidationMode::Strict);
        let tag = DomainTag::new("sealed");
        bus.validator().set_rule(tag.clone(), Some(vec![]));

        let result = bus.on(
            SubscriptionSpec::new(INPUT_MESSAGE_READY).domain(tag),
            Recorder::new().handler("sealed"),
        );

        match result {
            Err(BusError::Violation(violation)) => {
                assert_eq!(violation.pattern, INPUT_MESSAGE_READY);
                assert_eq!(violation.domain_tag, Some(DomainTag::new("sealed")));
            }
            other => panic!("expected violation, got {other:?}"),
        }
        assert_eq!(bus.subscriber_count(INPUT_MESSAGE_READY), 0);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn test_layers_only_listen_upstream() {
        let bus = EventBus::layered(ValidationMode::Strict);
        let recorder = Recorder::new();
        let output = DomainTag::for_layer(Layer::Output);
        let decision = DomainTag::for_layer(Layer::Decision);
        let input = DomainTag::for_layer(Layer::Input);

        assert!(bus
            .on(
                SubscriptionSpec::new(DECISION_INTENT_GENERATED).domain(output.clone()),
                recorder.handler("output"),
            )
            .is_ok());
        assert!(bus
            .on(
                SubscriptionSpec::new(INPUT_MESSAGE_READY).domain(decision.clone()),
                recorder.handler("decision"),
            )
            .is_ok());

        // Skipping a layer, listening downstream and any input subscription.
        for (tag, pattern) in [
            (output.clone(), INPUT_MESSAGE_READY),
            (output, "input.*"),
            (decision.clone(), OUTPUT_RENDER_COMPLETED),
            (decision, "*"),
            (input, DECISION_INTENT_GENERATED),
        ] {
            let result = bus.on(SubscriptionSpec::new(pattern).domain(tag), recorder.handler("x"));
            assert!(matches!(result, Err(BusError::Violation(_))), "{pattern} accepted");
        }
        assert_eq!(bus.subscription_count(), 2);
    }

    #[test]
    fn test_untagged_subscriber_depends_on_mode() {
        let recorder = Recorder::new();

        let strict = EventBus::layered(ValidationMode::Strict);
        assert!(matches!(
            strict.on(SubscriptionSpec::new(INPUT_MESSAGE_READY), recorder.handler("s")),
            Err(BusError::Violation(_))
        ));

        let permissive = EventBus::layered(ValidationMode::Permissive);
        assert!(permissive
            .on(SubscriptionSpec::new(INPUT_MESSAGE_READY), recorder.handler("p"))
            .is_ok());

        // A registered tag is still held to its rule in permissive mode.
        assert!(matches!(
            permissive.on(
                SubscriptionSpec::new(INPUT_MESSAGE_READY).domain(DomainTag::for_layer(Layer::Output)),
                recorder.handler("o"),
            ),
            Err(BusError::Violation(_))
        ));
    }

    #[test]
    fn test_narrowed_provider_rule() {
        let bus = EventBus::layered(ValidationMode::Strict);
        let tag = DomainTag::for_provider(Layer::Output, "tone");
        bus.validator().set_rule(
            tag.clone(),
            Some(vec![Pattern::parse(DECISION_INTENT_GENERATED).unwrap()]),
        );

        let recorder = Recorder::new();
        assert!(bus
            .on(
                SubscriptionSpec::new(DECISION_INTENT_GENERATED).domain(tag.clone()),
                recorder.handler("tone"),
            )
            .is_ok());
        assert!(bus
            .on(SubscriptionSpec::new("decision.*").domain(tag), recorder.handler("tone"))
            .is_err());
    }
}
