use std::cmp::Ordering;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Ordered feature name -> value mapping produced by the extractor.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    schema: String,
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new(schema: &str, entries: Vec<(String, f64)>) -> Self {
        Self {
            schema: schema.to_string(),
            entries,
        }
    }

    /// Schema tag the vector was produced under (e.g. "dga-features/v1")
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Values in feature order, as consumed by the scoring artifact
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, value)| *value).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// The feature contract an artifact was trained against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub tag: String,
    pub names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(tag: &str, names: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// True if the vector carries exactly these features, in this order,
    /// under the same schema tag.
    pub fn matches(&self, features: &FeatureVector) -> bool {
        features.schema() == self.tag
            && features.len() == self.names.len()
            && features.names().zip(&self.names).all(|(a, b)| a == b)
    }

    pub fn describe(&self) -> String {
        format!("{}[{}]", self.tag, self.names.join(","))
    }
}

/// Binary verdict.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Dga,
    Legit,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dga => f.write_str("dga"),
            Self::Legit => f.write_str("legit"),
        }
    }
}

/// Canonical classifier output.
#[derive(Clone, Debug, Serialize)]
pub struct Prediction {
    pub predicted_class: Verdict,
    pub p_dga: f64,
    pub p_legit: f64,
    /// Pre-threshold model output (logit)
    pub raw_score: f64,
    /// Fingerprint of the artifact that produced this prediction
    pub artifact: String,
}

impl Prediction {
    /// Build from a raw logit. `p_dga = σ(raw)`.
    pub fn from_logit(raw_score: f64, artifact: &str) -> Self {
        let p_dga = sigmoid(raw_score);
        Self::from_probabilities(p_dga, 1.0 - p_dga, raw_score, artifact)
    }

    /// Normalize an arbitrary (non-negative) probability pair so it sums to 1.
    /// Exact ties resolve to `Legit`.
    pub fn from_probabilities(p_dga: f64, p_legit: f64, raw_score: f64, artifact: &str) -> Self {
        let p_dga = if p_dga.is_finite() { p_dga.max(0.0) } else { 0.0 };
        let p_legit = if p_legit.is_finite() { p_legit.max(0.0) } else { 0.0 };
        let total = p_dga + p_legit;
        let (p_dga, p_legit) = if total > 0.0 {
            let p_dga = (p_dga / total).clamp(0.0, 1.0);
            (p_dga, 1.0 - p_dga)
        } else {
            (0.5, 0.5)
        };

        let predicted_class = if p_dga > p_legit {
            Verdict::Dga
        } else {
            Verdict::Legit
        };

        Self {
            predicted_class,
            p_dga,
            p_legit,
            raw_score,
            artifact: artifact.to_string(),
        }
    }

    pub fn is_dga(&self) -> bool {
        self.predicted_class == Verdict::Dga
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

/// One feature's signed push toward `dga` (positive) or `legit` (negative).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f64,
}

impl Contribution {
    pub fn toward(&self) -> Verdict {
        if self.value >= 0.0 {
            Verdict::Dga
        } else {
            Verdict::Legit
        }
    }
}

/// Per-feature contributions relative to a fixed baseline, in logit space.
#[derive(Clone, Debug, Serialize)]
pub struct Attribution {
    /// Model output for the reference baseline (the "bias term")
    pub baseline: f64,
    /// Ranked by |value| descending, ties by feature name
    contributions: Vec<Contribution>,
    /// Fingerprint of the artifact that produced these contributions
    pub artifact: String,
}

impl Attribution {
    pub fn new(baseline: f64, mut contributions: Vec<Contribution>, artifact: &str) -> Self {
        contributions.sort_by(rank_order);
        Self {
            baseline,
            contributions,
            artifact: artifact.to_string(),
        }
    }

    pub fn ranked(&self) -> &[Contribution] {
        &self.contributions
    }

    pub fn top(&self, n: usize) -> &[Contribution] {
        &self.contributions[..n.min(self.contributions.len())]
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.contributions
            .iter()
            .find(|c| c.feature == feature)
            .map(|c| c.value)
    }

    /// `baseline + Σ contributions`
    pub fn reconstructed(&self) -> f64 {
        self.baseline + self.contributions.iter().map(|c| c.value).sum::<f64>()
    }

    /// Absolute difference between the reconstruction and `raw_output`.
    pub fn additivity_gap(&self, raw_output: f64) -> f64 {
        (self.reconstructed() - raw_output).abs()
    }
}

fn rank_order(a: &Contribution, b: &Contribution) -> Ordering {
    b.value
        .abs()
        .partial_cmp(&a.value.abs())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.feature.cmp(&b.feature))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(feature: &str, value: f64) -> Contribution {
        Contribution {
            feature: feature.to_string(),
            value,
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        for raw in [-40.0, -2.5, 0.0, 0.3, 7.0, 800.0] {
            let p = Prediction::from_logit(raw, "m");
            assert!((p.p_dga + p.p_legit - 1.0).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&p.p_dga));
        }
    }

    #[test]
    fn test_exact_tie_favors_legit() {
        let p = Prediction::from_logit(0.0, "m");
        assert_eq!(p.p_dga, 0.5);
        assert_eq!(p.predicted_class, Verdict::Legit);
    }

    #[test]
    fn test_unnormalized_probabilities_are_rescaled() {
        let p = Prediction::from_probabilities(3.0, 1.0, 0.0, "m");
        assert!((p.p_dga - 0.75).abs() < 1e-12);
        assert_eq!(p.predicted_class, Verdict::Dga);

        let degenerate = Prediction::from_probabilities(f64::NAN, 0.0, 0.0, "m");
        assert_eq!(degenerate.predicted_class, Verdict::Legit);
    }

    #[test]
    fn test_attribution_ranking() {
        let attribution = Attribution::new(
            0.1,
            vec![
                contribution("length", 0.5),
                contribution("entropy", -1.2),
                contribution("digits", 0.5),
            ],
            "m",
        );
        let order: Vec<&str> = attribution.ranked().iter().map(|c| c.feature.as_str()).collect();
        assert_eq!(order, vec!["entropy", "digits", "length"]);
        assert_eq!(attribution.top(1).len(), 1);
        assert_eq!(attribution.top(10).len(), 3);
        assert!((attribution.reconstructed() - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_feature_vector_serializes_in_order() {
        let fv = FeatureVector::new(
            "s",
            vec![("length".into(), 3.0), ("entropy".into(), 0.5)],
        );
        let json = serde_json::to_string(&fv).unwrap();
        assert_eq!(json, r#"{"length":3.0,"entropy":0.5}"#);
    }

    #[test]
    fn test_schema_match_is_order_sensitive() {
        let schema = FeatureSchema::new("s", &["length", "entropy"]);
        let good = FeatureVector::new("s", vec![("length".into(), 1.0), ("entropy".into(), 0.0)]);
        let swapped = FeatureVector::new("s", vec![("entropy".into(), 0.0), ("length".into(), 1.0)]);
        let retagged = FeatureVector::new("t", vec![("length".into(), 1.0), ("entropy".into(), 0.0)]);
        assert!(schema.matches(&good));
        assert!(!schema.matches(&swapped));
        assert!(!schema.matches(&retagged));
    }
}
