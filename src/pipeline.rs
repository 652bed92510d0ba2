//! Per-domain analysis: extract -> score -> explain -> build -> prescribe.
//!
//! The artifact is loaded once and shared read-only; each domain runs on a
//! single thread with no state shared between domains.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, never, unbounded};
use serde::Serialize;

use crate::detection::error::Result;
use crate::detection::{
    DetectionError, Finding, LoadedArtifact, ScoringArtifact, Stage, build, explain, extract, score,
};
use crate::prescription::{Prescriber, PrescriptionOutcome};

/// Everything produced for one domain.
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub finding: Finding,
    pub prescription: PrescriptionOutcome,
}

#[derive(Clone)]
pub struct Pipeline {
    artifact: Arc<dyn ScoringArtifact>,
    prescriber: Prescriber,
}

impl Pipeline {
    pub fn new(artifact: Arc<dyn ScoringArtifact>, prescriber: Prescriber) -> Self {
        Self {
            artifact,
            prescriber,
        }
    }

    /// Load the artifact at `model_path` and build a pipeline around it.
    /// Fails before any domain is touched if the artifact is unusable.
    pub fn load(model_path: &Path, prescriber: Prescriber) -> Result<Self> {
        let artifact = LoadedArtifact::load(model_path)?;
        Ok(Self::new(Arc::new(artifact), prescriber))
    }

    pub fn artifact(&self) -> &dyn ScoringArtifact {
        self.artifact.as_ref()
    }

    /// Run the detection stages and assemble the finding.
    ///
    /// An artifact that cannot explain itself yields a finding without an
    /// attribution; every other failure aborts this domain.
    pub fn assess(&self, domain: &str) -> Result<Finding> {
        let artifact = self.artifact.as_ref();

        let features = extract(domain).map_err(|e| e.in_stage(domain, Stage::Extract))?;
        let prediction = score(artifact, &features).map_err(|e| e.in_stage(domain, Stage::Score))?;

        let attribution = match explain(artifact, &features) {
            Ok(attribution) => Some(attribution),
            Err(DetectionError::ExplainabilityUnsupported(reason)) => {
                log::warn!("No contributions for {}: {}", domain, reason);
                None
            }
            Err(e) => return Err(e.in_stage(domain, Stage::Explain)),
        };

        let finding = build(domain, features, prediction, attribution)
            .map_err(|e| e.in_stage(domain, Stage::Build))?;
        log::info!(
            "{} -> {} (P(dga)={:.4})",
            domain,
            finding.verdict(),
            finding.prediction().p_dga
        );
        Ok(finding)
    }

    pub fn analyze(&self, domain: &str) -> Result<Analysis> {
        self.analyze_with_cancel(domain, &never())
    }

    /// Like [`Pipeline::analyze`], but the prescription stage gives up when
    /// `cancel` fires. The finding is returned either way.
    pub fn analyze_with_cancel(&self, domain: &str, cancel: &Receiver<()>) -> Result<Analysis> {
        let finding = self.assess(domain)?;
        let prescription = self.prescriber.request_with_cancel(&finding, cancel);
        Ok(Analysis {
            finding,
            prescription,
        })
    }

    /// Analyze `domains` on `jobs` worker threads. Results are in input
    /// order; one domain failing does not affect the others.
    pub fn analyze_batch(&self, domains: &[String], jobs: usize) -> Vec<Result<Analysis>> {
        let jobs = jobs.clamp(1, domains.len().max(1));
        let (job_tx, job_rx) = unbounded::<(usize, &str)>();

        for (index, domain) in domains.iter().enumerate() {
            // Receiver is alive until the scope below ends.
            let _ = job_tx.send((index, domain.as_str()));
        }
        drop(job_tx);

        // Workers drain the queue until it is empty, so every index comes
        // back exactly once; a worker panic is re-raised here.
        let mut indexed: Vec<(usize, Result<Analysis>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..jobs)
                .map(|_| {
                    let job_rx = job_rx.clone();
                    scope.spawn(move || {
                        job_rx
                            .iter()
                            .map(|(index, domain)| (index, self.analyze(domain)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        });

        indexed.sort_by_key(|(index, _)| *index);
        debug_assert_eq!(indexed.len(), domains.len());
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}
