use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::detection::{Finding, Verdict};

/// Payload sent to the playbook generator. Derived only from a [`Finding`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionRequest {
    pub domain: String,
    pub verdict: Verdict,
    /// P(dga) in [0, 1]
    pub probability: f64,
    /// Strongest contributions, ranked; empty if attribution was unavailable
    pub top_features: Vec<RankedFeature>,
    /// Attribution baseline (bias term), if attribution was available
    pub baseline: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RankedFeature {
    pub name: String,
    /// Observed feature value
    pub value: f64,
    pub contribution: f64,
}

impl PrescriptionRequest {
    pub fn from_finding(finding: &Finding, top_n: usize) -> Self {
        let top_features = finding
            .top_features(top_n)
            .iter()
            .map(|c| RankedFeature {
                name: c.feature.clone(),
                value: finding.features().get(&c.feature).unwrap_or(f64::NAN),
                contribution: c.value,
            })
            .collect();

        Self {
            domain: finding.domain().to_string(),
            verdict: finding.verdict(),
            probability: finding.prediction().p_dga,
            top_features,
            baseline: finding.attribution().map(|a| a.baseline),
        }
    }

    /// Render the structured findings block handed to the generator.
    pub fn to_prompt(&self) -> String {
        let mut lines = vec![];
        lines.push("- Alert: Potential DGA domain detected.".to_string());
        lines.push(format!("- Domain: '{}'", self.domain));

        if self.top_features.is_empty() {
            lines.push(
                "- NOTE: SHAP contributions unavailable. Proceeding with probability only."
                    .to_string(),
            );
            lines.push(format!("- Confidence P(dga) = {:.1}%", self.probability * 100.0));
            return lines.join("\n");
        }

        lines.push("- AI Model Explanation (local SHAP / contributions):".to_string());
        lines.push(format!("  - Confidence P(dga) = {:.1}%", self.probability * 100.0));
        for feature in &self.top_features {
            lines.push(format!(
                "  - {} = {} → contribution {:+.4} ({})",
                feature.name,
                format_value(feature.value),
                feature.contribution,
                push_direction(feature.contribution)
            ));
        }
        if let Some(baseline) = self.baseline {
            lines.push(format!("  - bias/intercept = {:+.4}", baseline));
        }
        lines.join("\n")
    }
}

pub(crate) fn push_direction(contribution: f64) -> &'static str {
    if contribution >= 0.0 {
        "↑ toward DGA"
    } else {
        "↓ toward legit"
    }
}

/// Integers print bare, everything else with three decimals.
pub(crate) fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.3}", value)
    }
}

/// Ordered incident-response plan.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Playbook {
    #[serde(default)]
    pub summary: String,
    pub steps: Vec<PlaybookStep>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlaybookStep {
    /// e.g. "Immediate Containment", "Investigation"
    #[serde(default)]
    pub phase: String,
    pub action: String,
    #[serde(default)]
    pub rationale: String,
}

/// Why a local fallback was used instead of the remote generator.
#[derive(Clone, Copy, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Explicit opt-out; honored even when a credential is present
    OptedOut,
    /// No credential configured
    NoCredential,
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OptedOut => f.write_str("playbook generation disabled"),
            Self::NoCredential => f.write_str("no GenAI credential configured"),
        }
    }
}

/// Failures of the remote playbook call. Never retried here.
#[derive(Debug, Error)]
pub enum PrescriptionError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected (HTTP {status}): {body}")]
    Authentication { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("malformed playbook: {0}")]
    MalformedPlaybook(String),

    #[error("playbook worker exited without a result")]
    WorkerLost,
}

/// Lifecycle of the prescription stage for one finding.
#[derive(Clone, Copy, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionState {
    NotRequested,
    Requesting,
    Skipped,
    Fulfilled,
    Degraded,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PrescriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotRequested => "not_requested",
            Self::Requesting => "requesting",
            Self::Skipped => "skipped",
            Self::Fulfilled => "fulfilled",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Terminal result of the prescription stage.
#[derive(Debug)]
pub enum PrescriptionOutcome {
    /// Verdict was legit; nothing requested
    Skipped,
    /// Remote generator returned a well-formed playbook
    Fulfilled(Playbook),
    /// Remote call not attempted; deterministic local playbook
    Degraded {
        playbook: Playbook,
        reason: DegradedReason,
    },
    /// Remote call attempted and failed
    Failed(PrescriptionError),
    /// Caller abandoned the in-flight request
    Cancelled,
}

impl PrescriptionOutcome {
    pub fn state(&self) -> PrescriptionState {
        match self {
            Self::Skipped => PrescriptionState::Skipped,
            Self::Fulfilled(_) => PrescriptionState::Fulfilled,
            Self::Degraded { .. } => PrescriptionState::Degraded,
            Self::Failed(_) => PrescriptionState::Failed,
            Self::Cancelled => PrescriptionState::Cancelled,
        }
    }

    pub fn playbook(&self) -> Option<&Playbook> {
        match self {
            Self::Fulfilled(playbook) | Self::Degraded { playbook, .. } => Some(playbook),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PrescriptionError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl Serialize for PrescriptionOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PrescriptionOutcome", 4)?;
        s.serialize_field("state", &self.state())?;
        s.serialize_field("playbook", &self.playbook())?;
        let reason = match self {
            Self::Degraded { reason, .. } => Some(*reason),
            _ => None,
        };
        s.serialize_field("degraded_reason", &reason)?;
        s.serialize_field("error", &self.error().map(|e| e.to_string()))?;
        s.end()
    }
}

/// Playbook generation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescriptionConfig {
    /// Call the remote generator; `false` forces the local fallback
    pub enabled: bool,
    /// GenAI API key; falls back to `GOOGLE_API_KEY`
    pub api_key: Option<String>,
    /// Base URL of the Generative Language API
    pub endpoint: String,
    /// Generator model name
    pub model: String,
    /// Timeout for the single remote attempt
    pub timeout_secs: u64,
    /// Contributions included in the request
    pub top_n: usize,
}

impl Default for PrescriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            timeout_secs: 60,
            top_n: 3,
        }
    }
}

impl PrescriptionConfig {
    pub fn effective_top_n(&self) -> usize {
        self.top_n.clamp(1, 5)
    }
}
