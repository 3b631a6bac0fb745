//! Error types for the audit harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Browser failed to launch: {0}")]
    BrowserLaunch(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Interaction failed on {selector}: {reason}")]
    InteractionFailed { selector: String, reason: String },

    #[error("Accessibility audit error: {0}")]
    Audit(String),

    #[error("Duplicate check id: {0}")]
    DuplicateCheck(String),

    #[error("Invalid session state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;
