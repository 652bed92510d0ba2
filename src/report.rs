use std::fmt::Write;

use crate::detection::DetectionError;
use crate::pipeline::Analysis;
use crate::prescription::PrescriptionOutcome;
use crate::prescription::types::{format_value, push_direction};

/// Human-readable report for one analysis.
pub fn render_text(analysis: &Analysis) -> String {
    let finding = &analysis.finding;
    let prediction = finding.prediction();
    let mut out = String::new();

    let _ = writeln!(out, "=== {} ===", finding.domain());
    let _ = writeln!(out, "Feature vector:");
    for (name, value) in finding.features().iter() {
        let _ = writeln!(out, "  {}: {}", name, format_value(value));
    }
    let _ = writeln!(
        out,
        "Predicted class: {}  |  P(dga)={:.4}  P(legit)={:.4}",
        prediction.predicted_class, prediction.p_dga, prediction.p_legit
    );

    match finding.attribution() {
        Some(attribution) => {
            let _ = writeln!(out, "Contributions (ranked):");
            for c in attribution.ranked() {
                let _ = writeln!(
                    out,
                    "  {:<10} {:+.4} ({})",
                    c.feature,
                    c.value,
                    push_direction(c.value)
                );
            }
            let _ = writeln!(out, "  {:<10} {:+.4}", "bias", attribution.baseline);
        }
        None => {
            let _ = writeln!(out, "Contributions: unavailable for this artifact");
        }
    }

    let outcome = &analysis.prescription;
    let _ = writeln!(out, "Playbook: {}", outcome.state());
    match outcome {
        PrescriptionOutcome::Skipped => {
            let _ = writeln!(out, "  No playbook generated (domain predicted legit).");
        }
        PrescriptionOutcome::Degraded { reason, .. } => {
            let _ = writeln!(out, "  Local fallback ({reason}).");
        }
        PrescriptionOutcome::Failed(e) => {
            let _ = writeln!(out, "  GenAI request failed: {e}");
        }
        PrescriptionOutcome::Cancelled => {
            let _ = writeln!(out, "  Request cancelled.");
        }
        PrescriptionOutcome::Fulfilled(_) => {}
    }
    if let Some(playbook) = outcome.playbook() {
        if !playbook.summary.is_empty() {
            let _ = writeln!(out, "  {}", playbook.summary);
        }
        for (i, step) in playbook.steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. [{}] {}", i + 1, step.phase, step.action);
            if !step.rationale.is_empty() {
                let _ = writeln!(out, "     - {}", step.rationale);
            }
        }
    }
    out
}

/// JSON document for a batch; failed domains carry their error message.
pub fn render_json(domains: &[String], results: &[Result<Analysis, DetectionError>]) -> serde_json::Value {
    let entries = domains
        .iter()
        .zip(results)
        .map(|(domain, result)| match result {
            Ok(analysis) => serde_json::json!({ "domain": domain, "analysis": analysis }),
            Err(e) => serde_json::json!({ "domain": domain, "error": e.to_string() }),
        })
        .collect();
    serde_json::Value::Array(entries)
}
