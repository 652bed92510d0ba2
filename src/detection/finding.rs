use serde::Serialize;

use super::error::{DetectionError, Result};
use super::types::{Attribution, Contribution, FeatureVector, Prediction, Verdict};

/// Immutable snapshot of one analyzed domain.
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    domain: String,
    features: FeatureVector,
    prediction: Prediction,
    /// Absent when the artifact cannot decompose its output
    attribution: Option<Attribution>,
}

impl Finding {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn attribution(&self) -> Option<&Attribution> {
        self.attribution.as_ref()
    }

    pub fn verdict(&self) -> Verdict {
        self.prediction.predicted_class
    }

    /// Up to `n` strongest contributions; empty without an attribution.
    pub fn top_features(&self, n: usize) -> &[Contribution] {
        self.attribution.as_ref().map(|a| a.top(n)).unwrap_or(&[])
    }
}

/// Assemble a [`Finding`], checking that its parts describe the same
/// features and came from the same artifact.
pub fn build(
    domain: &str,
    features: FeatureVector,
    prediction: Prediction,
    attribution: Option<Attribution>,
) -> Result<Finding> {
    if let Some(attribution) = &attribution {
        if attribution.artifact != prediction.artifact {
            return Err(DetectionError::InconsistentFinding(format!(
                "attribution from {} does not match prediction from {}",
                attribution.artifact, prediction.artifact
            )));
        }
        if let Some(stray) = attribution
            .ranked()
            .iter()
            .find(|c| features.get(&c.feature).is_none())
        {
            return Err(DetectionError::InconsistentFinding(format!(
                "attribution names unknown feature {:?}",
                stray.feature
            )));
        }
    }

    Ok(Finding {
        domain: domain.to_string(),
        features,
        prediction,
        attribution,
    })
}
