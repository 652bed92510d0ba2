pub mod types;
pub mod error;
pub mod features;
pub mod model;
pub mod classifier;
pub mod artifact;
pub mod explain;
pub mod finding;

// Re-export commonly used items
pub use types::{Attribution, Contribution, FeatureSchema, FeatureVector, Prediction, Verdict};
pub use error::{DetectionError, Stage};
pub use features::{FEATURE_NAMES, FEATURE_SCHEMA, extract};
pub use classifier::{RawContributions, RawOutput, ScoringArtifact, score};
pub use artifact::LoadedArtifact;
pub use explain::{ADDITIVITY_TOLERANCE, explain};
pub use finding::{Finding, build};
