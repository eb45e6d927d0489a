//! Pure confidence scoring.

use keel_types::{Parameter, ParameterKind, ParameterScore};

/// Score a single parameter into [0, 1].
pub fn parameter_score(parameter: &Parameter) -> f64 {
    let raw = match (parameter.kind, parameter.threshold) {
        (ParameterKind::Gate, _) => {
            if parameter.observed_value > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        (ParameterKind::HigherIsBetter, Some(threshold)) => parameter.observed_value / threshold,
        (ParameterKind::HigherIsBetter, None) => parameter.observed_value,
        (ParameterKind::LowerIsBetter, Some(threshold)) => {
            1.0 - parameter.observed_value / threshold
        }
        (ParameterKind::LowerIsBetter, None) => 1.0 - parameter.observed_value,
    };
    clamp_unit(raw)
}

/// Score every parameter, renormalizing weights to sum to 1.
pub fn score_parameters(parameters: &[Parameter]) -> Vec<ParameterScore> {
    let total_weight: f64 = parameters.iter().map(|p| p.weight).sum();

    parameters
        .iter()
        .map(|p| ParameterScore {
            name: p.name.clone(),
            kind: p.kind,
            observed_value: p.observed_value,
            threshold: p.threshold,
            weight: p.weight,
            normalized_weight: if total_weight > 0.0 {
                p.weight / total_weight
            } else {
                0.0
            },
            score: parameter_score(p),
        })
        .collect()
}

/// Weighted mean of already-computed scores.
pub fn confidence(scores: &[ParameterScore]) -> f64 {
    let weighted: f64 = scores.iter().map(|s| s.score * s.normalized_weight).sum();
    clamp_unit(weighted)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
