use serde::{Deserialize, Serialize};

/// Scoring function carried by an artifact. Both variants produce a logit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSpec {
    /// Additive tree ensemble (gradient boosting)
    Gbm(TreeEnsemble),
    /// Linear logit `w·x + b`
    Logistic(LogisticModel),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    /// Prior logit added to the sum of tree outputs
    #[serde(default)]
    pub init_score: f64,
    pub trees: Vec<TreeNode>,
}

/// A regression tree node. `x[feature] < threshold` descends left.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        /// Training samples reaching this node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover: Option<f64>,
    },
    Leaf {
        leaf: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// Mean of each feature over the training set; the attribution baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_means: Option<Vec<f64>>,
}

impl ModelSpec {
    /// Structural validation against the number of features in the schema.
    pub fn validate(&self, feature_count: usize) -> Result<(), String> {
        match self {
            Self::Gbm(ensemble) => ensemble.validate(feature_count),
            Self::Logistic(model) => model.validate(feature_count),
        }
    }

    /// Raw logit for positional feature values.
    pub fn raw_score(&self, x: &[f64]) -> f64 {
        match self {
            Self::Gbm(ensemble) => ensemble.raw_score(x),
            Self::Logistic(model) => model.raw_score(x),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Gbm(_) => "gbm",
            Self::Logistic(_) => "logistic",
        }
    }
}

impl TreeEnsemble {
    fn validate(&self, feature_count: usize) -> Result<(), String> {
        if !self.init_score.is_finite() {
            return Err(format!("non-finite init_score: {}", self.init_score));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(feature_count)
                .map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }

    pub fn raw_score(&self, x: &[f64]) -> f64 {
        self.init_score + self.trees.iter().map(|t| t.eval(x)).sum::<f64>()
    }

    /// Expected output when only the features in `known` (bit mask) are
    /// observed; the rest are marginalized by cover. `None` if a needed
    /// cover is missing.
    pub fn conditional_expectation(&self, x: &[f64], known: u32) -> Option<f64> {
        let mut total = self.init_score;
        for tree in &self.trees {
            total += tree.conditional_expectation(x, known)?;
        }
        Some(total)
    }

    /// True if every node carries a positive cover.
    pub fn has_covers(&self) -> bool {
        self.trees.iter().all(TreeNode::has_covers)
    }
}

impl TreeNode {
    fn validate(&self, feature_count: usize) -> Result<(), String> {
        match self {
            Self::Leaf { leaf, cover } => {
                if !leaf.is_finite() {
                    return Err(format!("non-finite leaf value: {leaf}"));
                }
                validate_cover(*cover)
            }
            Self::Split {
                feature,
                threshold,
                left,
                right,
                cover,
            } => {
                if *feature >= feature_count {
                    return Err(format!(
                        "split on feature index {feature}, schema has {feature_count}"
                    ));
                }
                if threshold.is_nan() {
                    return Err("NaN split threshold".to_string());
                }
                validate_cover(*cover)?;
                left.validate(feature_count)?;
                right.validate(feature_count)
            }
        }
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { leaf, .. } => return *leaf,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                }
            }
        }
    }

    pub fn cover(&self) -> Option<f64> {
        match self {
            Self::Leaf { cover, .. } | Self::Split { cover, .. } => *cover,
        }
    }

    fn has_covers(&self) -> bool {
        match self {
            Self::Leaf { cover, .. } => cover.is_some(),
            Self::Split {
                left, right, cover, ..
            } => cover.is_some() && left.has_covers() && right.has_covers(),
        }
    }

    fn conditional_expectation(&self, x: &[f64], known: u32) -> Option<f64> {
        match self {
            Self::Leaf { leaf, .. } => Some(*leaf),
            Self::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => {
                if known & (1 << *feature) != 0 {
                    let next = if x[*feature] < *threshold { left } else { right };
                    return next.conditional_expectation(x, known);
                }
                let left_cover = left.cover()?;
                let right_cover = right.cover()?;
                let total = left_cover + right_cover;
                if total <= 0.0 {
                    return None;
                }
                let left_value = left.conditional_expectation(x, known)?;
                let right_value = right.conditional_expectation(x, known)?;
                Some((left_cover * left_value + right_cover * right_value) / total)
            }
        }
    }
}

fn validate_cover(cover: Option<f64>) -> Result<(), String> {
    match cover {
        Some(c) if !c.is_finite() || c < 0.0 => Err(format!("invalid cover: {c}")),
        _ => Ok(()),
    }
}

impl LogisticModel {
    fn validate(&self, feature_count: usize) -> Result<(), String> {
        if self.weights.len() != feature_count {
            return Err(format!(
                "weight dimension mismatch: expected {feature_count}, got {}",
                self.weights.len()
            ));
        }
        if let Some((index, value)) = self.weights.iter().enumerate().find(|(_, w)| !w.is_finite()) {
            return Err(format!("non-finite weight at index {index}: {value}"));
        }
        if !self.bias.is_finite() {
            return Err(format!("non-finite bias: {}", self.bias));
        }
        if let Some(means) = &self.feature_means {
            if means.len() != feature_count {
                return Err(format!(
                    "feature_means dimension mismatch: expected {feature_count}, got {}",
                    means.len()
                ));
            }
            if means.iter().any(|m| !m.is_finite()) {
                return Err("non-finite feature mean".to_string());
            }
        }
        Ok(())
    }

    pub fn raw_score(&self, x: &[f64]) -> f64 {
        dot(&self.weights, x) + self.bias
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}
