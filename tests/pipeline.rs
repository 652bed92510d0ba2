//! End-to-end scenarios against the bundled classifier artifact.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use dgalens::Pipeline;
use dgalens::detection::{
    ADDITIVITY_TOLERANCE, DetectionError, LoadedArtifact, ScoringArtifact, Verdict, explain,
    extract, score,
};
use dgalens::prescription::{
    DegradedReason, Playbook, PlaybookService, Prescriber, PrescriptionConfig, PrescriptionError,
    PrescriptionOutcome, PrescriptionRequest, PrescriptionState,
};
use proptest::prelude::*;

fn model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("model/dga_leader.json")
}

fn load_artifact() -> LoadedArtifact {
    LoadedArtifact::load(&model_path()).unwrap()
}

/// Records every call; must never be reached in the opt-out scenarios.
struct CountingService {
    calls: AtomicUsize,
}

impl PlaybookService for CountingService {
    fn generate(&self, _request: &PrescriptionRequest) -> Result<Playbook, PrescriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PrescriptionError::Transport("network disabled in tests".to_string()))
    }
}

#[test]
fn high_entropy_domain_is_dga_with_entropy_leading() {
    let pipeline = Pipeline::load(&model_path(), Prescriber::disabled()).unwrap();
    let analysis = pipeline.analyze("kq3v9z7j1x5f8g2h.info").unwrap();
    let finding = &analysis.finding;

    assert_eq!(finding.verdict(), Verdict::Dga);
    assert!(finding.prediction().p_dga > 0.5);

    let attribution = finding.attribution().expect("bundled model is explainable");
    let top: Vec<&str> = attribution.top(2).iter().map(|c| c.feature.as_str()).collect();
    assert!(top.contains(&"entropy"), "top contributors: {top:?}");
    assert_eq!(attribution.ranked()[0].feature, "entropy");
    assert!(attribution.get("entropy").unwrap() > 0.0);
}

#[test]
fn short_common_domain_is_legit_and_skipped() {
    let pipeline = Pipeline::load(&model_path(), Prescriber::disabled()).unwrap();
    let analysis = pipeline.analyze("cnn.com").unwrap();
    assert_eq!(analysis.finding.verdict(), Verdict::Legit);
    assert_eq!(analysis.prescription.state(), PrescriptionState::Skipped);
    assert!(analysis.prescription.playbook().is_none());
}

#[test]
fn opt_out_degrades_without_network_even_with_credentials() {
    let service = Arc::new(CountingService {
        calls: AtomicUsize::new(0),
    });
    let config = PrescriptionConfig {
        enabled: false,
        api_key: Some("configured-key".to_string()),
        ..Default::default()
    };
    let pipeline = Pipeline::load(&model_path(), Prescriber::with_service(config, service.clone())).unwrap();

    let first = pipeline.analyze("kq3v9z7j1x5f8g2h.info").unwrap();
    let second = pipeline.analyze("kq3v9z7j1x5f8g2h.info").unwrap();

    match (&first.prescription, &second.prescription) {
        (
            PrescriptionOutcome::Degraded { playbook: a, reason },
            PrescriptionOutcome::Degraded { playbook: b, .. },
        ) => {
            assert_eq!(*reason, DegradedReason::OptedOut);
            assert!(!a.steps.is_empty());
            assert_eq!(a, b);
        }
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);

    let from_config = Prescriber::from_config(PrescriptionConfig {
        enabled: false,
        api_key: Some("configured-key".to_string()),
        ..Default::default()
    });
    let pipeline = Pipeline::load(&model_path(), from_config).unwrap();
    let analysis = pipeline.analyze("kq3v9z7j1x5f8g2h.info").unwrap();
    assert_eq!(analysis.prescription.state(), PrescriptionState::Degraded);
}

#[test]
fn remote_failure_is_distinct_from_degraded() {
    let service = Arc::new(CountingService {
        calls: AtomicUsize::new(0),
    });
    let config = PrescriptionConfig {
        timeout_secs: 5,
        ..Default::default()
    };
    let pipeline = Pipeline::load(&model_path(), Prescriber::with_service(config, service.clone())).unwrap();
    let analysis = pipeline.analyze("kq3v9z7j1x5f8g2h.info").unwrap();

    assert_eq!(analysis.prescription.state(), PrescriptionState::Failed);
    assert!(matches!(
        analysis.prescription.error(),
        Some(PrescriptionError::Transport(_))
    ));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_artifact_fails_before_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("DGA_Leader.json");
    let err = match Pipeline::load(&missing, Prescriber::disabled()) {
        Ok(_) => panic!("load should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, DetectionError::ArtifactNotFound { .. }), "{err}");
    assert!(err.is_artifact_failure());
    assert!(!missing.exists());
}

#[test]
fn shared_artifact_scores_identically_across_threads() {
    let artifact: Arc<dyn ScoringArtifact> = Arc::new(load_artifact());
    let domains = ["kq3v9z7j1x5f8g2h.info", "cnn.com", "stackoverflow.com", "xjw9q2kd8z.biz"];

    let expected: Vec<f64> = domains
        .iter()
        .map(|d| score(artifact.as_ref(), &extract(d).unwrap()).unwrap().p_dga)
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let artifact = Arc::clone(&artifact);
            thread::spawn(move || {
                domains
                    .iter()
                    .map(|d| score(artifact.as_ref(), &extract(d).unwrap()).unwrap().p_dga)
                    .collect::<Vec<f64>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn batch_analysis_with_shared_pipeline() {
    let pipeline = Pipeline::load(&model_path(), Prescriber::disabled()).unwrap();
    let domains: Vec<String> = ["cnn.com", "kq3v9z7j1x5f8g2h.info", ".", "google.com"]
        .iter()
        .map(|d| d.to_string())
        .collect();
    let results = pipeline.analyze_batch(&domains, 2);

    let states: Vec<Option<PrescriptionState>> = results
        .iter()
        .map(|r| r.as_ref().ok().map(|a| a.prescription.state()))
        .collect();
    assert_eq!(
        states,
        vec![
            Some(PrescriptionState::Skipped),
            Some(PrescriptionState::Degraded),
            None,
            Some(PrescriptionState::Skipped),
        ]
    );
}

#[test]
fn cancelled_prescription_keeps_finding() {
    struct Slow;
    impl PlaybookService for Slow {
        fn generate(&self, _request: &PrescriptionRequest) -> Result<Playbook, PrescriptionError> {
            thread::sleep(std::time::Duration::from_secs(5));
            Err(PrescriptionError::Transport("too slow".to_string()))
        }
    }

    let pipeline = Pipeline::load(
        &model_path(),
        Prescriber::with_service(PrescriptionConfig::default(), Arc::new(Slow)),
    )
    .unwrap();
    let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
    let canceller = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(50));
        let _ = cancel_tx.send(());
    });

    let analysis = pipeline
        .analyze_with_cancel("kq3v9z7j1x5f8g2h.info", &cancel_rx)
        .unwrap();
    canceller.join().unwrap();

    assert_eq!(analysis.prescription.state(), PrescriptionState::Cancelled);
    assert_eq!(analysis.finding.verdict(), Verdict::Dga);
}

proptest! {
    #[test]
    fn probabilities_sum_to_one(domain in "[a-z0-9]{1,30}\\.(com|net|info|biz|io)") {
        let artifact = load_artifact();
        let prediction = score(&artifact, &extract(&domain).unwrap()).unwrap();
        prop_assert!((prediction.p_dga + prediction.p_legit - 1.0).abs() < 1e-6);
        prop_assert_eq!(prediction.predicted_class == Verdict::Dga, prediction.p_dga > prediction.p_legit);
    }

    #[test]
    fn attributions_reconstruct_raw_output(domain in "[a-z0-9-]{1,40}\\.[a-z]{2,5}") {
        let artifact = load_artifact();
        let features = extract(&domain).unwrap();
        let prediction = score(&artifact, &features).unwrap();
        let attribution = explain(&artifact, &features).unwrap();
        prop_assert!(attribution.additivity_gap(prediction.raw_score) < ADDITIVITY_TOLERANCE);
        prop_assert_eq!(&attribution.artifact, &prediction.artifact);
    }
}
