//! Decision requests and results
//!
//! A [`DecisionRequest`] is validated when it is built and never changes
//! afterwards. The engine turns it into exactly one [`DecisionResult`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::{ComponentId, DecisionId, DecisionIdAllocator, Revision};

/// Kinds of operational decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Deployment,
    Scaling,
    Rollback,
    Healing,
    Monitoring,
    /// Always routed to a human.
    GuardianOverride,
}

impl DecisionType {
    pub const ALL: [DecisionType; 6] = [
        DecisionType::Deployment,
        DecisionType::Scaling,
        DecisionType::Rollback,
        DecisionType::Healing,
        DecisionType::Monitoring,
        DecisionType::GuardianOverride,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Deployment => "deployment",
            DecisionType::Scaling => "scaling",
            DecisionType::Rollback => "rollback",
            DecisionType::Healing => "healing",
            DecisionType::Monitoring => "monitoring",
            DecisionType::GuardianOverride => "guardian_override",
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision priority, ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a parameter's observed value maps onto a [0, 1] score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// e.g. test coverage: `observed / threshold`
    HigherIsBetter,
    /// e.g. error rate: `1 - observed / threshold`
    LowerIsBetter,
    /// Pass/fail check: any positive observed value passes.
    Gate,
}

/// One weighted input signal of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub observed_value: f64,
    pub threshold: Option<f64>,
    /// Relative weight; the engine renormalizes across the request.
    pub weight: f64,
    pub kind: ParameterKind,
}

impl Parameter {
    /// Higher-is-better metric measured against a threshold.
    pub fn higher_is_better(
        name: impl Into<String>,
        observed_value: f64,
        threshold: f64,
        weight: f64,
    ) -> Self {
        Self {
            name: name.into(),
            observed_value,
            threshold: Some(threshold),
            weight,
            kind: ParameterKind::HigherIsBetter,
        }
    }

    /// Lower-is-better metric measured against a threshold.
    pub fn lower_is_better(
        name: impl Into<String>,
        observed_value: f64,
        threshold: f64,
        weight: f64,
    ) -> Self {
        Self {
            name: name.into(),
            observed_value,
            threshold: Some(threshold),
            weight,
            kind: ParameterKind::LowerIsBetter,
        }
    }

    /// Already-normalized ratio in [0, 1] (higher is better, no threshold).
    pub fn ratio(name: impl Into<String>, observed_value: f64, weight: f64) -> Self {
        Self {
            name: name.into(),
            observed_value,
            threshold: None,
            weight,
            kind: ParameterKind::HigherIsBetter,
        }
    }

    /// Boolean gate.
    pub fn gate(name: impl Into<String>, passed: bool, weight: f64) -> Self {
        Self {
            name: name.into(),
            observed_value: if passed { 1.0 } else { 0.0 },
            threshold: None,
            weight,
            kind: ParameterKind::Gate,
        }
    }

    /// Check the parameter is scorable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyParameterName);
        }
        if !self.observed_value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                name: self.name.clone(),
            });
        }
        // `!(w > 0)` also catches NaN
        if !(self.weight > 0.0) || !self.weight.is_finite() {
            return Err(ValidationError::NonPositiveWeight {
                name: self.name.clone(),
                weight: self.weight,
            });
        }
        if let Some(threshold) = self.threshold {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ValidationError::InvalidThreshold {
                    name: self.name.clone(),
                    threshold,
                });
            }
        }
        Ok(())
    }
}

/// Validated, immutable input to the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRequest {
    id: DecisionId,
    decision_type: DecisionType,
    priority: Priority,
    component: ComponentId,
    parameters: Vec<Parameter>,
    source: String,
    revision: Option<Revision>,
    created_at: DateTime<Utc>,
}

impl DecisionRequest {
    /// Start building a request against `component`.
    pub fn builder(
        decision_type: DecisionType,
        priority: Priority,
        component: impl Into<ComponentId>,
    ) -> DecisionRequestBuilder {
        DecisionRequestBuilder {
            decision_type,
            priority,
            component: component.into(),
            parameters: Vec::new(),
            source: "autonomous_agent".to_string(),
            revision: None,
            id: None,
        }
    }

    /// A builder for a follow-up request with the same type, priority,
    /// component and revision but no parameters.
    pub fn rebuild(&self) -> DecisionRequestBuilder {
        DecisionRequestBuilder {
            decision_type: self.decision_type,
            priority: self.priority,
            component: self.component.clone(),
            parameters: Vec::new(),
            source: self.source.clone(),
            revision: self.revision.clone(),
            id: None,
        }
    }

    pub fn id(&self) -> &DecisionId {
        &self.id
    }

    pub fn decision_type(&self) -> DecisionType {
        self.decision_type
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Revision being deployed, or the rollback target.
    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Builder for [`DecisionRequest`]
#[derive(Debug, Clone)]
pub struct DecisionRequestBuilder {
    decision_type: DecisionType,
    priority: Priority,
    component: ComponentId,
    parameters: Vec<Parameter>,
    source: String,
    revision: Option<Revision>,
    id: Option<DecisionId>,
}

impl DecisionRequestBuilder {
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn decision_type(&self) -> DecisionType {
        self.decision_type
    }

    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    /// Use an explicit id instead of allocating one.
    pub fn id(mut self, id: DecisionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Validate and build using the process-wide id allocator.
    pub fn build(self) -> Result<DecisionRequest, ValidationError> {
        self.build_with(&DecisionIdAllocator::global())
    }

    /// Validate and build using `allocator` for id issuance.
    pub fn build_with(
        self,
        allocator: &DecisionIdAllocator,
    ) -> Result<DecisionRequest, ValidationError> {
        if self.parameters.is_empty() {
            return Err(ValidationError::EmptyParameters);
        }

        let mut seen = HashSet::with_capacity(self.parameters.len());
        for parameter in &self.parameters {
            parameter.validate()?;
            if !seen.insert(parameter.name.as_str()) {
                return Err(ValidationError::DuplicateParameter(parameter.name.clone()));
            }
        }

        let created_at = Utc::now();
        let id = match self.id {
            Some(id) => allocator.register(id)?,
            None => allocator.allocate(self.decision_type, created_at),
        };

        Ok(DecisionRequest {
            id,
            decision_type: self.decision_type,
            priority: self.priority,
            component: self.component,
            parameters: self.parameters,
            source: self.source,
            revision: self.revision,
            created_at,
        })
    }
}

/// Outcome class of an evaluation. Exactly one per result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    AutoApproved,
    AutoRejected,
    PendingGuardian,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::AutoApproved => write!(f, "auto-approved"),
            Classification::AutoRejected => write!(f, "auto-rejected"),
            Classification::PendingGuardian => write!(f, "pending-guardian"),
        }
    }
}

/// Per-parameter breakdown shown to guardians and kept for audit replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterScore {
    pub name: String,
    pub kind: ParameterKind,
    pub observed_value: f64,
    pub threshold: Option<f64>,
    pub weight: f64,
    /// Weight after renormalization across the request.
    pub normalized_weight: f64,
    /// Score in [0, 1].
    pub score: f64,
}

/// Result of evaluating one [`DecisionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Id of the request this result answers.
    pub decision_id: DecisionId,
    pub decision_type: DecisionType,
    pub priority: Priority,
    pub component: ComponentId,
    pub revision: Option<Revision>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub classification: Classification,
    pub reasoning: String,
    pub requires_guardian: bool,
    pub parameter_scores: Vec<ParameterScore>,
    /// Recommended follow-up actions.
    pub actions: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

impl DecisionResult {
    pub fn is_auto_approved(&self) -> bool {
        self.classification == Classification::AutoApproved
    }

    pub fn is_pending_guardian(&self) -> bool {
        self.classification == Classification::PendingGuardian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_params() -> Vec<Parameter> {
        vec![
            Parameter::gate("health_check", true, 0.4),
            Parameter::higher_is_better("test_coverage", 0.85, 0.80, 0.3),
            Parameter::gate("security_scan", true, 0.3),
        ]
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn test_build_valid_request() {
        let allocator = DecisionIdAllocator::new();
        let request = DecisionRequest::builder(DecisionType::Deployment, Priority::Medium, "api")
            .parameters(healthy_params())
            .revision(Revision::new("v1.2.0"))
            .build_with(&allocator)
            .unwrap();

        assert!(request.id().as_str().starts_with("deployment_"));
        assert_eq!(request.parameters().len(), 3);
        assert_eq!(request.component().as_str(), "api");
        assert_eq!(request.revision(), Some(&Revision::new("v1.2.0")));
        assert!(request.parameter("security_scan").is_some());
    }

    #[test]
    fn test_empty_parameters_rejected() {
        let result = DecisionRequest::builder(DecisionType::Scaling, Priority::Low, "api")
            .build_with(&DecisionIdAllocator::new());
        assert_eq!(result.unwrap_err(), ValidationError::EmptyParameters);
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let result = DecisionRequest::builder(DecisionType::Scaling, Priority::Low, "api")
            .parameter(Parameter::ratio("cpu_headroom", 0.5, 1.0))
            .parameter(Parameter::ratio("cpu_headroom", 0.7, 1.0))
            .build_with(&DecisionIdAllocator::new());
        assert_eq!(
            result.unwrap_err(),
            ValidationError::DuplicateParameter("cpu_headroom".into())
        );
    }

    #[test]
    fn test_non_positive_weight_rejected() {
        for weight in [0.0, -0.5, f64::NAN] {
            let result = DecisionRequest::builder(DecisionType::Healing, Priority::High, "cache")
                .parameter(Parameter::ratio("process_health", 0.9, weight))
                .build_with(&DecisionIdAllocator::new());
            assert!(matches!(
                result,
                Err(ValidationError::NonPositiveWeight { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = DecisionRequest::builder(DecisionType::Deployment, Priority::Low, "api")
            .parameter(Parameter::higher_is_better("test_coverage", 0.9, 0.0, 1.0))
            .build_with(&DecisionIdAllocator::new());
        assert!(matches!(
            result,
            Err(ValidationError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_explicit_duplicate_id_is_fatal() {
        let allocator = DecisionIdAllocator::new();
        let id = DecisionId::new("deployment_1");

        DecisionRequest::builder(DecisionType::Deployment, Priority::Low, "api")
            .parameters(healthy_params())
            .id(id.clone())
            .build_with(&allocator)
            .unwrap();

        let second = DecisionRequest::builder(DecisionType::Deployment, Priority::Low, "api")
            .parameters(healthy_params())
            .id(id.clone())
            .build_with(&allocator);
        assert_eq!(second.unwrap_err(), ValidationError::DuplicateId(id));
    }

    #[test]
    fn test_rebuild_keeps_identity_fields() {
        let allocator = DecisionIdAllocator::new();
        let original = DecisionRequest::builder(DecisionType::Deployment, Priority::High, "api")
            .parameters(healthy_params())
            .source("ci")
            .revision(Revision::new("v2"))
            .build_with(&allocator)
            .unwrap();

        let follow_up = original
            .rebuild()
            .parameter(Parameter::gate("health_check", true, 1.0))
            .build_with(&allocator)
            .unwrap();

        assert_ne!(follow_up.id(), original.id());
        assert_eq!(follow_up.decision_type(), original.decision_type());
        assert_eq!(follow_up.priority(), original.priority());
        assert_eq!(follow_up.revision(), original.revision());
        assert_eq!(follow_up.parameters().len(), 1);
    }

    #[test]
    fn test_decision_type_serde_names() {
        let json = serde_json::to_string(&DecisionType::GuardianOverride).unwrap();
        assert_eq!(json, "\"guardian_override\"");
    }
}
