use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, after, bounded, never, select};

use super::fallback::generate_fallback;
use super::genai::{GenAiClient, PlaybookService};
use super::types::{
    DegradedReason, PrescriptionConfig, PrescriptionError, PrescriptionOutcome, PrescriptionRequest,
    PrescriptionState,
};
use crate::detection::{Finding, Verdict};

/// Environment variable consulted when the config carries no key.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Turns positive findings into playbooks. One attempt per finding.
#[derive(Clone)]
pub struct Prescriber {
    config: Arc<PrescriptionConfig>,
    service: Option<Arc<dyn PlaybookService>>,
}

impl Prescriber {
    /// Build from config, resolving the credential from the config or
    /// `GOOGLE_API_KEY`. No client is built when disabled.
    pub fn from_config(config: PrescriptionConfig) -> Self {
        let service: Option<Arc<dyn PlaybookService>> = if config.enabled {
            resolve_api_key(&config)
                .map(|key| Arc::new(GenAiClient::new(&config, key)) as Arc<dyn PlaybookService>)
        } else {
            None
        };

        log::info!(
            "Prescriber ready (enabled: {}, GenAI available: {})",
            config.enabled,
            service.is_some()
        );
        Self {
            config: Arc::new(config),
            service,
        }
    }

    /// Use a specific playbook service.
    pub fn with_service(config: PrescriptionConfig, service: Arc<dyn PlaybookService>) -> Self {
        Self {
            config: Arc::new(config),
            service: Some(service),
        }
    }

    /// Always answer with the local fallback.
    pub fn disabled() -> Self {
        Self {
            config: Arc::new(PrescriptionConfig {
                enabled: false,
                ..Default::default()
            }),
            service: None,
        }
    }

    pub fn config(&self) -> &PrescriptionConfig {
        &self.config
    }

    pub fn request(&self, finding: &Finding) -> PrescriptionOutcome {
        self.request_with_cancel(finding, &never())
    }

    /// Run the prescription stage for `finding`.
    ///
    /// Any message on `cancel`, or its sender being dropped, abandons the
    /// in-flight remote call and yields `Cancelled`.
    pub fn request_with_cancel(&self, finding: &Finding, cancel: &Receiver<()>) -> PrescriptionOutcome {
        let domain = finding.domain();
        if finding.verdict() == Verdict::Legit {
            transition(domain, PrescriptionState::NotRequested, PrescriptionState::Skipped);
            return PrescriptionOutcome::Skipped;
        }

        let request = PrescriptionRequest::from_finding(finding, self.config.effective_top_n());
        transition(domain, PrescriptionState::NotRequested, PrescriptionState::Requesting);

        let service = match (&self.service, self.config.enabled) {
            (_, false) => return self.degrade(request, DegradedReason::OptedOut),
            (None, true) => return self.degrade(request, DegradedReason::NoCredential),
            (Some(service), true) => Arc::clone(service),
        };

        let (result_tx, result_rx) = bounded(1);
        thread::spawn(move || {
            let result = service.generate(&request);
            // The caller may have given up already; that's fine.
            let _ = result_tx.send(result);
        });

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let outcome = select! {
            recv(result_rx) -> msg => match msg {
                Ok(Ok(playbook)) => PrescriptionOutcome::Fulfilled(playbook),
                Ok(Err(e)) => PrescriptionOutcome::Failed(e),
                Err(_) => PrescriptionOutcome::Failed(PrescriptionError::WorkerLost),
            },
            recv(cancel) -> _ => PrescriptionOutcome::Cancelled,
            recv(after(timeout)) -> _ => {
                PrescriptionOutcome::Failed(PrescriptionError::Timeout(self.config.timeout_secs))
            }
        };

        match &outcome {
            PrescriptionOutcome::Failed(e) => {
                log::warn!("Playbook generation failed for {}: {}", domain, e)
            }
            PrescriptionOutcome::Fulfilled(playbook) => log::info!(
                "Playbook generated for {} ({} steps)",
                domain,
                playbook.steps.len()
            ),
            _ => {}
        }
        transition(domain, PrescriptionState::Requesting, outcome.state());
        outcome
    }

    fn degrade(&self, request: PrescriptionRequest, reason: DegradedReason) -> PrescriptionOutcome {
        log::info!("{}; using local playbook for {}", reason, request.domain);
        transition(&request.domain, PrescriptionState::Requesting, PrescriptionState::Degraded);
        PrescriptionOutcome::Degraded {
            playbook: generate_fallback(&request),
            reason,
        }
    }
}

fn transition(domain: &str, from: PrescriptionState, to: PrescriptionState) {
    log::debug!("prescription for {}: {} -> {}", domain, from, to);
}

fn resolve_api_key(config: &PrescriptionConfig) -> Option<String> {
    pick_api_key(config.api_key.as_deref(), std::env::var(API_KEY_ENV).ok())
}

/// Configured key first, then the environment; blank keys don't count.
fn pick_api_key(configured: Option<&str>, env: Option<String>) -> Option<String> {
    let configured = configured
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string);
    configured.or_else(|| {
        env.map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    })
}
