//! Decision engine
//!
//! `evaluate` is a pure, synchronous function of the request and the
//! policy. It holds no mutable state and can be called concurrently from
//! any task.

use chrono::Utc;
use keel_types::{Classification, DecisionRequest, DecisionResult, DecisionType, ParameterScore};
use tracing::{debug, instrument};

use crate::policy::DecisionPolicy;
use crate::scoring::{confidence, score_parameters};

/// Number of parameters summarized in the reasoning text.
const REASONING_PARAMETERS: usize = 3;

/// Scores requests and classifies them against a [`DecisionPolicy`].
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Score and classify a request.
    #[instrument(
        level = "debug",
        skip(self, request),
        fields(decision_id = %request.id(), decision_type = %request.decision_type())
    )]
    pub fn evaluate(&self, request: &DecisionRequest) -> DecisionResult {
        let scores = score_parameters(request.parameters());
        let confidence = confidence(&scores);
        let (classification, verdict) = self.classify(request, confidence);

        debug!(
            confidence,
            classification = %classification,
            "Decision evaluated"
        );

        DecisionResult {
            decision_id: request.id().clone(),
            decision_type: request.decision_type(),
            priority: request.priority(),
            component: request.component().clone(),
            revision: request.revision().cloned(),
            confidence,
            classification,
            reasoning: reasoning(request, confidence, &verdict, &scores),
            requires_guardian: classification == Classification::PendingGuardian,
            parameter_scores: scores,
            actions: recommended_actions(request.decision_type(), classification),
            decided_at: Utc::now(),
        }
    }

    /// Apply the classification rules in order: override, approve,
    /// reject, escalate.
    fn classify(&self, request: &DecisionRequest, confidence: f64) -> (Classification, String) {
        let decision_type = request.decision_type();
        let priority = request.priority();

        let Some(threshold) = self.policy.threshold(decision_type) else {
            return (
                Classification::PendingGuardian,
                format!("{decision_type} decisions always require a guardian"),
            );
        };

        if confidence >= threshold {
            if self.policy.auto_approvable(decision_type, priority) {
                return (
                    Classification::AutoApproved,
                    format!(
                        "Meets {decision_type} threshold {threshold:.2}, approved for autonomous execution"
                    ),
                );
            }
            return (
                Classification::PendingGuardian,
                format!(
                    "Meets {decision_type} threshold {threshold:.2} but {priority} priority is not eligible for auto-approval"
                ),
            );
        }

        let margin = self.policy.reject_margin(decision_type);
        if confidence < threshold - margin {
            return (
                Classification::AutoRejected,
                format!(
                    "More than {margin:.2} below {decision_type} threshold {threshold:.2}, insufficient confidence"
                ),
            );
        }

        (
            Classification::PendingGuardian,
            format!(
                "Below {decision_type} threshold {threshold:.2} but within reject margin {margin:.2}, guardian review required"
            ),
        )
    }
}

fn reasoning(
    request: &DecisionRequest,
    confidence: f64,
    verdict: &str,
    scores: &[ParameterScore],
) -> String {
    let mut parts = vec![
        format!(
            "Decision type: {}, Priority: {}, Confidence: {:.1}%",
            request.decision_type(),
            request.priority(),
            confidence * 100.0
        ),
        verdict.to_string(),
    ];

    if !scores.is_empty() {
        let summary = scores
            .iter()
            .take(REASONING_PARAMETERS)
            .map(|s| format!("{}={} (score {:.2})", s.name, s.observed_value, s.score))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("Parameters: {summary}"));
    }

    parts.join(". ")
}

fn recommended_actions(decision_type: DecisionType, classification: Classification) -> Vec<String> {
    match classification {
        Classification::PendingGuardian => vec![
            "Request guardian approval".to_string(),
            "Queue decision for manual review".to_string(),
            "Log decision to audit trail".to_string(),
        ],
        Classification::AutoApproved => vec![
            format!("Execute {decision_type} autonomously"),
            "Observe post-action health".to_string(),
            "Record outcome to audit trail".to_string(),
        ],
        Classification::AutoRejected => vec![
            "Decision rejected - insufficient confidence".to_string(),
            "Request additional parameters".to_string(),
            "Log to incident report".to_string(),
        ],
    }
}
