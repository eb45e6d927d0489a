//! Property tests for the decision engine.

use keel_decision::DecisionEngine;
use keel_types::{
    Classification, DecisionIdAllocator, DecisionRequest, DecisionType, Parameter, ParameterKind,
    Priority,
};
use proptest::prelude::*;

fn decision_type() -> impl Strategy<Value = DecisionType> {
    prop::sample::select(DecisionType::ALL.to_vec())
}

fn priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(Priority::ALL.to_vec())
}

fn kind() -> impl Strategy<Value = ParameterKind> {
    prop_oneof![
        Just(ParameterKind::HigherIsBetter),
        Just(ParameterKind::LowerIsBetter),
        Just(ParameterKind::Gate),
    ]
}

fn parameter(index: usize) -> impl Strategy<Value = Parameter> {
    (
        kind(),
        0.0f64..2.0,
        prop::option::of(0.05f64..2.0),
        0.01f64..10.0,
    )
        .prop_map(move |(kind, observed_value, threshold, weight)| Parameter {
            name: format!("p{index}"),
            observed_value,
            threshold,
            weight,
            kind,
        })
}

fn parameters() -> impl Strategy<Value = Vec<Parameter>> {
    (1usize..6).prop_flat_map(|n| (0..n).map(parameter).collect::<Vec<_>>())
}

fn build(
    decision_type: DecisionType,
    priority: Priority,
    parameters: Vec<Parameter>,
) -> DecisionRequest {
    DecisionRequest::builder(decision_type, priority, "svc")
        .parameters(parameters)
        .build_with(&DecisionIdAllocator::new())
        .unwrap()
}

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        decision_type in decision_type(),
        priority in priority(),
        parameters in parameters(),
    ) {
        let engine = DecisionEngine::default();
        let request = build(decision_type, priority, parameters);

        let first = engine.evaluate(&request);
        let second = engine.evaluate(&request);
        prop_assert_eq!(first.confidence, second.confidence);
        prop_assert_eq!(first.classification, second.classification);
    }

    #[test]
    fn confidence_stays_in_unit_interval(
        decision_type in decision_type(),
        priority in priority(),
        parameters in parameters(),
    ) {
        let result = DecisionEngine::default().evaluate(&build(decision_type, priority, parameters));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn higher_is_better_is_monotonic(
        parameters in parameters(),
        observed in 0.0f64..2.0,
        bump in 0.0f64..2.0,
        threshold in prop::option::of(0.05f64..2.0),
        weight in 0.01f64..10.0,
    ) {
        let engine = DecisionEngine::default();
        let with_value = |value: f64| {
            let mut params = parameters.clone();
            params.push(Parameter {
                name: "probe".to_string(),
                observed_value: value,
                threshold,
                weight,
                kind: ParameterKind::HigherIsBetter,
            });
            engine
                .evaluate(&build(DecisionType::Deployment, Priority::Medium, params))
                .confidence
        };

        prop_assert!(with_value(observed + bump) >= with_value(observed) - 1e-12);
    }

    #[test]
    fn exactly_one_classification(
        decision_type in decision_type(),
        priority in priority(),
        parameters in parameters(),
    ) {
        let result = DecisionEngine::default().evaluate(&build(decision_type, priority, parameters));
        let matches = [
            Classification::AutoApproved,
            Classification::AutoRejected,
            Classification::PendingGuardian,
        ]
        .iter()
        .filter(|c| **c == result.classification)
        .count();
        prop_assert_eq!(matches, 1);
        prop_assert_eq!(
            result.requires_guardian,
            result.classification == Classification::PendingGuardian
        );
    }

    #[test]
    fn guardian_override_always_pending(
        priority in priority(),
        parameters in parameters(),
    ) {
        let result = DecisionEngine::default()
            .evaluate(&build(DecisionType::GuardianOverride, priority, parameters));
        prop_assert_eq!(result.classification, Classification::PendingGuardian);
    }

    #[test]
    fn critical_deployment_never_auto_approves(parameters in parameters()) {
        let result = DecisionEngine::default()
            .evaluate(&build(DecisionType::Deployment, Priority::Critical, parameters));
        prop_assert_ne!(result.classification, Classification::AutoApproved);
    }
}
