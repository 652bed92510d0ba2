use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::classifier::{RawContributions, RawOutput, ScoringArtifact};
use super::error::{DetectionError, Result};
use super::explain::{linear_contributions, tree_contributions};
use super::features;
use super::model::ModelSpec;
use super::types::FeatureSchema;

/// On-disk artifact document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Human-readable model identifier.
    pub model_id: String,
    /// Version of the trained model.
    pub model_version: String,
    /// Schema tag of the features the model was trained on.
    pub feature_schema: String,
    /// Feature names in training order.
    pub features: Vec<String>,
    pub model: ModelSpec,
}

/// A validated artifact, ready to score. Immutable after load.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    model_id: String,
    model_version: String,
    schema: FeatureSchema,
    model: ModelSpec,
    source: PathBuf,
}

impl LoadedArtifact {
    /// Load and validate the artifact at `path`.
    ///
    /// The artifact's feature schema must equal the extractor's; a model
    /// trained on different features is refused here rather than allowed to
    /// score silently wrong.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DetectionError::ArtifactNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(DetectionError::corrupt(path, format!("unreadable: {e}"))),
        };

        let artifact = Self::from_json(&content, path)?;
        log::info!(
            "Loaded classifier artifact {} ({}, {} trees/weights) from {}",
            artifact.fingerprint(),
            artifact.model.kind(),
            artifact.model_size(),
            path.display()
        );
        Ok(artifact)
    }

    /// Parse and validate artifact JSON; `source` is only used in errors.
    pub fn from_json(json: &str, source: &Path) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)
            .map_err(|e| DetectionError::corrupt(source, format!("invalid JSON: {e}")))?;
        Self::from_file(file, source)
    }

    fn from_file(file: ArtifactFile, source: &Path) -> Result<Self> {
        let expected = features::schema();
        let schema = FeatureSchema {
            tag: file.feature_schema,
            names: file.features,
        };
        if schema != expected {
            return Err(DetectionError::SchemaMismatch {
                expected: expected.describe(),
                got: schema.describe(),
            });
        }

        file.model
            .validate(schema.names.len())
            .map_err(|reason| DetectionError::corrupt(source, reason))?;

        Ok(Self {
            model_id: file.model_id,
            model_version: file.model_version,
            schema,
            model: file.model,
            source: source.to_path_buf(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn model_size(&self) -> usize {
        match &self.model {
            ModelSpec::Gbm(ensemble) => ensemble.trees.len(),
            ModelSpec::Logistic(model) => model.weights.len(),
        }
    }
}

impl ScoringArtifact for LoadedArtifact {
    fn fingerprint(&self) -> String {
        format!("{}@{}#{}", self.model_id, self.model_version, self.schema.tag)
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn raw_score(&self, values: &[f64]) -> RawOutput {
        RawOutput::Logit(self.model.raw_score(values))
    }

    fn contributions(&self, values: &[f64]) -> Result<RawContributions> {
        match &self.model {
            ModelSpec::Gbm(ensemble) => tree_contributions(ensemble, values),
            ModelSpec::Logistic(model) => linear_contributions(model, values),
        }
    }
}
