//! Capability interfaces to the browser driver and the external auditors
//!
//! The harness never talks to a concrete browser or audit engine directly;
//! everything goes through these traits so the session can be exercised with
//! in-memory fakes and shipped with the Playwright/pa11y adapters.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuditResult;

/// How long navigation waits before the page counts as loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Resolve on the `load` event.
    Load,
    /// Resolve once the network has been idle.
    #[default]
    NetworkIdle,
    /// Resolve on `DOMContentLoaded`.
    DomContentLoaded,
}

impl WaitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitPolicy::Load => "load",
            WaitPolicy::NetworkIdle => "networkidle",
            WaitPolicy::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// Browser automation capability.
///
/// One live page at a time; all calls are strictly sequential. Element
/// addressing is by CSS selector plus an index into the match set, which is
/// enough for the harness (it never holds element handles across calls).
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to `url`.
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> AuditResult<()>;

    /// URL the page is currently on.
    async fn current_url(&self) -> AuditResult<String>;

    /// Resize the viewport. Scale is the device scale factor.
    async fn set_viewport(&self, width: u32, height: u32, scale: f64) -> AuditResult<()>;

    /// The page title.
    async fn title(&self) -> AuditResult<String>;

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> AuditResult<usize>;

    /// DOM attribute/property of the first element matching `selector`.
    /// `Ok(None)` when no element matches.
    async fn attribute(&self, selector: &str, attribute: &str) -> AuditResult<Option<String>>;

    /// Computed style property of the nth element matching `selector`.
    /// `Ok(None)` when no element matches.
    async fn computed_style(
        &self,
        selector: &str,
        index: usize,
        property: &str,
    ) -> AuditResult<Option<String>>;

    /// Hover over the nth element matching `selector`.
    async fn hover(&self, selector: &str, index: usize) -> AuditResult<()>;

    /// Focus the nth element matching `selector`.
    async fn focus(&self, selector: &str, index: usize) -> AuditResult<()>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> AuditResult<()>;

    /// Type text into the first element matching `selector`.
    async fn type_text(&self, selector: &str, text: &str) -> AuditResult<()>;

    /// Capture a screenshot of the page to `path`.
    async fn screenshot(&self, path: &Path, full_page: bool) -> AuditResult<()>;

    /// Inner markup of the page's `<head>` element.
    async fn head_markup(&self) -> AuditResult<String>;

    /// Close the page and the browser behind it.
    async fn close(&self) -> AuditResult<()>;
}

/// Options passed to the accessibility auditor.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Accessibility standard to audit against.
    pub standard: String,
    /// CSS selectors to hide from the audit.
    pub hide_selectors: String,
    /// Settle time before the audit runs.
    pub wait_ms: u64,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            standard: "WCAG2AA".to_string(),
            hide_selectors: String::new(),
            wait_ms: 10_000,
        }
    }
}

/// One issue reported by the accessibility auditor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessibilityIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    #[serde(rename = "typeCode", default)]
    pub type_code: u32,
    pub code: String,
    #[serde(default)]
    pub context: String,
    pub message: String,
    #[serde(default)]
    pub selector: String,
}

/// Black-box accessibility audit engine (e.g. pa11y).
#[async_trait]
pub trait AccessibilityAuditor: Send + Sync {
    /// Audit the page at `url`, returning its issue list.
    async fn audit(&self, url: &str, options: &AuditOptions) -> AuditResult<Vec<AccessibilityIssue>>;
}

/// Black-box page-quality flow auditor (e.g. a Lighthouse user flow).
#[async_trait]
pub trait FlowAuditor: Send + Sync {
    /// Take a snapshot of the current page, labelled `step`.
    async fn snapshot(&self, step: &str) -> AuditResult<()>;

    /// Start a timespan measurement labelled `step`.
    async fn start_timespan(&self, step: &str) -> AuditResult<()>;

    /// End the current timespan measurement.
    async fn end_timespan(&self) -> AuditResult<()>;

    /// Produce the aggregate flow report document.
    async fn generate_report(&self) -> AuditResult<Vec<u8>>;

    /// Accessibility category score for the page at `url`, in `0.0..=1.0`.
    /// Engines without per-page scoring return `None`.
    async fn accessibility_score(&self, _url: &str) -> AuditResult<Option<f64>> {
        Ok(None)
    }
}
