use super::types::{Playbook, PlaybookStep, PrescriptionRequest, push_direction};

/// Build a deterministic playbook locally when the generator is not used.
pub fn generate_fallback(request: &PrescriptionRequest) -> Playbook {
    let domain = &request.domain;
    let evidence = describe_evidence(request);

    let steps = vec![
        step(
            "Immediate Containment",
            format!("Block {domain} at the internal DNS resolver and sinkhole its lookups"),
            format!("Cuts the command-and-control channel; {evidence}"),
        ),
        step(
            "Immediate Containment",
            "Isolate hosts that resolved the domain from the network".to_string(),
            "A DGA lookup implies malware already running on the querying host".to_string(),
        ),
        step(
            "Investigation",
            format!("Query DNS and proxy logs for every client that resolved {domain}"),
            "Scopes which hosts are infected".to_string(),
        ),
        step(
            "Investigation",
            "Search the same hosts' lookups for other high-entropy or NXDOMAIN-heavy names"
                .to_string(),
            "DGA families rotate through many generated domains".to_string(),
        ),
        step(
            "Eradication/Recovery",
            "Collect and analyze the process issuing the lookups, then reimage affected hosts"
                .to_string(),
            "Removes the generator at its source".to_string(),
        ),
        step(
            "Follow-Up",
            "Escalate to the incident response team with this finding attached".to_string(),
            "Local fallback plan; review and tailor before closing the incident".to_string(),
        ),
    ];

    Playbook {
        summary: format!(
            "Suspected DGA domain {domain} (P(dga) = {:.1}%): contain, scope, eradicate.",
            request.probability * 100.0
        ),
        steps,
    }
}

fn step(phase: &str, action: String, rationale: String) -> PlaybookStep {
    PlaybookStep {
        phase: phase.to_string(),
        action,
        rationale,
    }
}

fn describe_evidence(request: &PrescriptionRequest) -> String {
    match request.top_features.first() {
        Some(top) => format!(
            "model confidence {:.1}%, strongest signal {} ({})",
            request.probability * 100.0,
            top.name,
            push_direction(top.contribution)
        ),
        None => format!("model confidence {:.1}%", request.probability * 100.0),
    }
}
