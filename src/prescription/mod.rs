pub mod types;
pub mod genai;
pub mod fallback;
pub mod requester;

// Re-export commonly used items
pub use types::{
    DegradedReason, Playbook, PlaybookStep, PrescriptionConfig, PrescriptionError,
    PrescriptionOutcome, PrescriptionRequest, PrescriptionState,
};
pub use genai::{GenAiClient, PlaybookService};
pub use fallback::generate_fallback;
pub use requester::Prescriber;
