use std::path::PathBuf;

use thiserror::Error;

/// Per-domain stage an error was raised in, for diagnostics. Artifact
/// loading happens before any domain and is reported untagged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Extract,
    Score,
    Explain,
    Build,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Score => "score",
            Self::Explain => "explain",
            Self::Build => "build",
        };
        f.write_str(name)
    }
}

/// Errors raised by feature extraction, scoring and explanation.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("invalid domain {domain:?}: {reason}")]
    Validation { domain: String, reason: String },

    #[error("classifier artifact not found at {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    #[error("classifier artifact at {} is corrupt: {reason}", path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("feature schema mismatch: expected {expected:?}, got {got:?}")]
    SchemaMismatch { expected: String, got: String },

    #[error("classifier artifact does not support contributions: {0}")]
    ExplainabilityUnsupported(String),

    #[error("inconsistent finding: {0}")]
    InconsistentFinding(String),

    /// Wraps any of the above with the domain and stage it came from.
    #[error("analysis of {domain:?} failed during {stage}: {source}")]
    Analysis {
        domain: String,
        stage: Stage,
        #[source]
        source: Box<DetectionError>,
    },
}

impl DetectionError {
    pub fn validation(domain: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArtifactCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Tag this error with the domain and stage being processed.
    pub fn in_stage(self, domain: &str, stage: Stage) -> Self {
        match self {
            already @ Self::Analysis { .. } => already,
            other => Self::Analysis {
                domain: domain.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error, looking through any stage tagging.
    pub fn root(&self) -> &DetectionError {
        match self {
            Self::Analysis { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_artifact_failure(&self) -> bool {
        matches!(
            self.root(),
            Self::ArtifactNotFound { .. } | Self::ArtifactCorrupt { .. } | Self::SchemaMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging_is_idempotent() {
        let err = DetectionError::validation("", "empty")
            .in_stage("", Stage::Extract)
            .in_stage("", Stage::Score);
        match &err {
            DetectionError::Analysis { stage, .. } => assert_eq!(*stage, Stage::Extract),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root(), DetectionError::Validation { .. }));
    }

    #[test]
    fn test_stage_names() {
        let names: Vec<String> = [Stage::Extract, Stage::Score, Stage::Explain, Stage::Build]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(names, vec!["extract", "score", "explain", "build"]);
    }

    #[test]
    fn test_message_names_domain_and_stage() {
        let err = DetectionError::SchemaMismatch {
            expected: "a".into(),
            got: "b".into(),
        }
        .in_stage("evil.biz", Stage::Score);
        let msg = err.to_string();
        assert!(msg.contains("evil.biz"));
        assert!(msg.contains("score"));
        assert!(err.is_artifact_failure());
    }
}
