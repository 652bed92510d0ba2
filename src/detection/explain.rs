//! Attribution engine: additive per-feature contributions.
//!
//! Contributions live in logit space and satisfy
//! `baseline + Σ contributions == raw_score` to within [`ADDITIVITY_TOLERANCE`].
//!
//! - Tree ensembles get exact path-dependent Shapley values (the quantity
//!   TreeSHAP computes). The baseline is the cover-weighted expected output,
//!   i.e. the prediction for the average training example.
//! - Linear models get `w_i * (x_i - mean_i)` against the training means.

use super::classifier::{RawContributions, ScoringArtifact, check_schema};
use super::error::{DetectionError, Result};
use super::model::{LogisticModel, TreeEnsemble, dot};
use super::types::{Attribution, Contribution, FeatureVector};

/// Maximum allowed |baseline + Σφ - raw| in logit units.
pub const ADDITIVITY_TOLERANCE: f64 = 1e-6;

/// Coalition enumeration is exponential in the feature count.
pub const MAX_SHAPLEY_FEATURES: usize = 16;

/// Explain the artifact's output for `features`, ranked by magnitude.
pub fn explain(artifact: &dyn ScoringArtifact, features: &FeatureVector) -> Result<Attribution> {
    check_schema(artifact, features)?;

    let values = features.values();
    let raw = artifact.contributions(&values)?;
    if raw.values.len() != features.len() {
        return Err(DetectionError::ExplainabilityUnsupported(format!(
            "artifact returned {} contributions for {} features",
            raw.values.len(),
            features.len()
        )));
    }

    let contributions = features
        .names()
        .zip(&raw.values)
        .map(|(name, value)| Contribution {
            feature: name.to_string(),
            value: *value,
        })
        .collect();
    let attribution = Attribution::new(raw.baseline, contributions, &artifact.fingerprint());

    let output = artifact.raw_score(&values).logit();
    let gap = attribution.additivity_gap(output);
    if !(gap < ADDITIVITY_TOLERANCE) {
        return Err(DetectionError::ExplainabilityUnsupported(format!(
            "contributions do not reconstruct the model output (gap {gap:e})"
        )));
    }

    log::debug!(
        "explained output {:.4} = baseline {:.4} + {:?}",
        output,
        attribution.baseline,
        attribution
            .ranked()
            .iter()
            .map(|c| (c.feature.as_str(), c.value))
            .collect::<Vec<_>>()
    );
    Ok(attribution)
}

/// Exact Shapley values for a tree ensemble, with the value of a coalition
/// defined as the cover-weighted conditional expectation of the ensemble.
pub fn tree_contributions(ensemble: &TreeEnsemble, x: &[f64]) -> Result<RawContributions> {
    let m = x.len();
    if m > MAX_SHAPLEY_FEATURES {
        return Err(DetectionError::ExplainabilityUnsupported(format!(
            "{m} features exceeds the {MAX_SHAPLEY_FEATURES}-feature limit"
        )));
    }
    if !ensemble.has_covers() {
        return Err(DetectionError::ExplainabilityUnsupported(
            "tree nodes carry no cover statistics".to_string(),
        ));
    }

    let coalitions = 1u32 << m;
    let mut value = Vec::with_capacity(coalitions as usize);
    for known in 0..coalitions {
        let v = ensemble.conditional_expectation(x, known).ok_or_else(|| {
            DetectionError::ExplainabilityUnsupported("zero-cover split".to_string())
        })?;
        value.push(v);
    }

    let weights = coalition_weights(m);
    let mut phi = vec![0.0; m];
    for (i, phi_i) in phi.iter_mut().enumerate() {
        let bit = 1u32 << i;
        for known in (0..coalitions).filter(|k| k & bit == 0) {
            let size = known.count_ones() as usize;
            *phi_i += weights[size] * (value[(known | bit) as usize] - value[known as usize]);
        }
    }

    Ok(RawContributions {
        baseline: value[0],
        values: phi,
    })
}

/// `|S|! (M - |S| - 1)! / M!` for every coalition size `|S|` in `0..M`.
fn coalition_weights(m: usize) -> Vec<f64> {
    let factorial = |n: usize| (1..=n).map(|k| k as f64).product::<f64>();
    let total = factorial(m);
    (0..m)
        .map(|s| factorial(s) * factorial(m - s - 1) / total)
        .collect()
}

/// Contributions of a linear logit relative to the training means.
pub fn linear_contributions(model: &LogisticModel, x: &[f64]) -> Result<RawContributions> {
    let means = model.feature_means.as_ref().ok_or_else(|| {
        DetectionError::ExplainabilityUnsupported(
            "logistic artifact has no feature_means baseline".to_string(),
        )
    })?;

    let values = model
        .weights
        .iter()
        .zip(x.iter().zip(means))
        .map(|(w, (xi, mean))| w * (xi - mean))
        .collect();

    Ok(RawContributions {
        baseline: dot(&model.weights, means) + model.bias,
        values,
    })
}
