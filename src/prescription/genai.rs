use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{Playbook, PrescriptionConfig, PrescriptionError, PrescriptionRequest};

/// A remote capability that turns a request into a playbook.
pub trait PlaybookService: Send + Sync {
    fn generate(&self, request: &PrescriptionRequest) -> Result<Playbook, PrescriptionError>;
}

const API_KEY_HEADER: &str = "x-goog-api-key";

const SYSTEM_PROMPT: &str = "You are a senior SOC incident responder. \
Given short, structured XAI findings from a DGA detection model, output a concise, prescriptive response plan.";

/// Google Generative Language API client
pub struct GenAiClient {
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenAiClient {
    pub fn new(config: &PrescriptionConfig, api_key: String) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Request URL. The key travels in a header, never in the URL, since
    /// transport errors echo the URL.
    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl PlaybookService for GenAiClient {
    fn generate(&self, request: &PrescriptionRequest) -> Result<Playbook, PrescriptionError> {
        let body = GenerateRequest {
            contents: vec![
                Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        text: build_playbook_prompt(request),
                    }],
                },
            ],
        };
        let request_body = serde_json::to_string(&body)
            .map_err(|e| PrescriptionError::Transport(format!("failed to serialize request: {e}")))?;

        log::debug!(
            "Calling GenAI model {} for: {}",
            self.model,
            request.domain
        );

        let response = match ureq::post(&self.url())
            .set("Content-Type", "application/json")
            .set(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .send_string(&request_body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let body = truncate(&body, 400);
                return Err(if status == 401 || status == 403 {
                    PrescriptionError::Authentication { status, body }
                } else {
                    PrescriptionError::Http { status, body }
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(PrescriptionError::Transport(describe_transport(&transport)));
            }
        };

        let response_text = response
            .into_string()
            .map_err(|e| PrescriptionError::Transport(format!("failed to read response: {e}")))?;
        let text = first_candidate_text(&response_text)?;
        parse_playbook(&text)
    }
}

/// Kind and message of a transport failure, without the request URL.
fn describe_transport(transport: &ureq::Transport) -> String {
    match transport.message() {
        Some(message) => format!("{}: {}", transport.kind(), message),
        None => transport.kind().to_string(),
    }
}

fn build_playbook_prompt(request: &PrescriptionRequest) -> String {
    format!(
        r#"Create a prescriptive incident response playbook for a suspected DGA domain.

Constraints:
- Keep to 6-10 concrete steps grouped under phases: Immediate Containment, Investigation, Eradication/Recovery, and Follow-Up.
- Each step should be actionable (with commands, queries, or owners when relevant).
- Tailor recommendations to the provided model explanation and observed features.
- Avoid generic boilerplate; be specific to DGA/command-and-control risk.

XAI Findings:
{}

Return ONLY a JSON object (no markdown) with these exact fields:
{{
  "summary": "One sentence describing the threat",
  "steps": [
    {{"phase": "Immediate Containment", "action": "What to do", "rationale": "Why, tied to the findings"}}
  ]
}}"#,
        request.to_prompt()
    )
}

fn first_candidate_text(response_text: &str) -> Result<String, PrescriptionError> {
    let response: GenerateResponse = serde_json::from_str(response_text)
        .map_err(|e| PrescriptionError::MalformedPlaybook(format!("invalid response JSON: {e}")))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PrescriptionError::EmptyResponse(truncate(response_text, 400)))
}

/// Parse the generator's text into a playbook with at least one step.
pub fn parse_playbook(text: &str) -> Result<Playbook, PrescriptionError> {
    let json = extract_json(text).ok_or_else(|| {
        PrescriptionError::MalformedPlaybook(format!(
            "no JSON object in response: {}",
            truncate(text, 200)
        ))
    })?;
    let playbook: Playbook = serde_json::from_str(json)
        .map_err(|e| PrescriptionError::MalformedPlaybook(e.to_string()))?;

    if playbook.steps.is_empty() || playbook.steps.iter().any(|s| s.action.trim().is_empty()) {
        return Err(PrescriptionError::MalformedPlaybook(
            "playbook has no actionable steps".to_string(),
        ));
    }
    Ok(playbook)
}

/// Locate a JSON object in model output that may wrap it in prose or
/// markdown fences.
fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Some(&trimmed[..=end]);
        }
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = find_matching_brace(&trimmed[start..])?;
    Some(&trimmed[start..=start + end])
}

/// Byte index of the brace closing the object that opens `s`.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
