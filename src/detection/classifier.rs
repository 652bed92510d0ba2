//! Boundary between the pipeline and an opaque trained scoring artifact.
//!
//! The pipeline never looks at how an artifact scores; it only sees the
//! [`ScoringArtifact`] capabilities and normalizes their output into a
//! canonical [`Prediction`].

use super::error::{DetectionError, Result};
use super::types::{FeatureSchema, FeatureVector, Prediction};

/// What an artifact hands back from a scoring call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawOutput {
    /// Pre-sigmoid score; positive leans `dga`
    Logit(f64),
    /// Class probabilities, not necessarily normalized
    Probabilities { p_dga: f64, p_legit: f64 },
}

impl RawOutput {
    /// The output as a logit, for attribution checks.
    pub fn logit(&self) -> f64 {
        match *self {
            Self::Logit(z) => z,
            Self::Probabilities { p_dga, p_legit } => {
                let total = p_dga + p_legit;
                if total <= 0.0 {
                    return 0.0;
                }
                let p = (p_dga / total).clamp(1e-15, 1.0 - 1e-15);
                (p / (1.0 - p)).ln()
            }
        }
    }
}

/// Contributions in schema order, relative to `baseline`, in logit space.
#[derive(Clone, Debug, PartialEq)]
pub struct RawContributions {
    pub baseline: f64,
    pub values: Vec<f64>,
}

/// A loaded, immutable scoring artifact. Implementations must be safe to
/// share across threads; no call may mutate the artifact.
pub trait ScoringArtifact: Send + Sync {
    /// `model_id@model_version#schema`, used to tie predictions and
    /// attributions back to the artifact that produced them.
    fn fingerprint(&self) -> String;

    /// Feature contract the artifact was trained against.
    fn schema(&self) -> &FeatureSchema;

    /// Score positional feature values (already schema-checked).
    fn raw_score(&self, values: &[f64]) -> RawOutput;

    /// Decompose the raw output into per-feature contributions.
    /// Fails with `ExplainabilityUnsupported` if the artifact cannot.
    fn contributions(&self, values: &[f64]) -> Result<RawContributions>;
}

/// Reject vectors that do not match the artifact's feature contract.
pub fn check_schema(artifact: &dyn ScoringArtifact, features: &FeatureVector) -> Result<()> {
    let schema = artifact.schema();
    if schema.matches(features) {
        return Ok(());
    }
    let got = format!(
        "{}[{}]",
        features.schema(),
        features.names().collect::<Vec<_>>().join(",")
    );
    Err(DetectionError::SchemaMismatch {
        expected: schema.describe(),
        got,
    })
}

/// Score `features` and normalize the result into a [`Prediction`].
pub fn score(artifact: &dyn ScoringArtifact, features: &FeatureVector) -> Result<Prediction> {
    check_schema(artifact, features)?;

    let raw = artifact.raw_score(&features.values());
    let fingerprint = artifact.fingerprint();
    let prediction = match raw {
        RawOutput::Logit(z) => Prediction::from_logit(z, &fingerprint),
        RawOutput::Probabilities { p_dga, p_legit } => {
            Prediction::from_probabilities(p_dga, p_legit, raw.logit(), &fingerprint)
        }
    };

    log::debug!(
        "scored {:?}: raw={:.4} p_dga={:.4} -> {}",
        features.values(),
        prediction.raw_score,
        prediction.p_dga,
        prediction.predicted_class
    );
    Ok(prediction)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-built artifacts for exercising the adapter boundary.

    use super::*;

    /// Returns a fixed probability pair and refuses to explain itself.
    pub struct FixedProbabilities {
        pub schema: FeatureSchema,
        pub p_dga: f64,
        pub p_legit: f64,
    }

    impl ScoringArtifact for FixedProbabilities {
        fn fingerprint(&self) -> String {
            "fixed@0#".to_string() + &self.schema.tag
        }

        fn schema(&self) -> &FeatureSchema {
            &self.schema
        }

        fn raw_score(&self, _values: &[f64]) -> RawOutput {
            RawOutput::Probabilities {
                p_dga: self.p_dga,
                p_legit: self.p_legit,
            }
        }

        fn contributions(&self, _values: &[f64]) -> Result<RawContributions> {
            Err(DetectionError::ExplainabilityUnsupported(
                "fixed-probability artifact".to_string(),
            ))
        }
    }
}
