// KYC verification workflow

pub mod attachments;
pub mod orchestrator;
pub mod webhook;

pub use attachments::{KycSubmission, SubmissionBuilder};
pub use orchestrator::{KycOrchestrator, KycStatusView, WebhookOutcome};
pub use webhook::WebhookEvent;
