//! pa11y-backed accessibility auditor
//!
//! Shells out to the pa11y CLI through npx and parses its JSON reporter
//! output. pa11y exits non-zero when it finds issues, so the exit code is
//! not a failure signal; only unparseable output is.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::driver::{AccessibilityAuditor, AccessibilityIssue, AuditOptions};
use crate::error::{AuditError, AuditResult};

/// Runs `npx pa11y` against a URL.
#[derive(Debug, Clone, Default)]
pub struct Pa11yCli;

impl Pa11yCli {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessibilityAuditor for Pa11yCli {
    async fn audit(&self, url: &str, options: &AuditOptions) -> AuditResult<Vec<AccessibilityIssue>> {
        let mut cmd = Command::new("npx");
        cmd.arg("pa11y")
            .args(["--reporter", "json"])
            .args(["--standard", &options.standard]);
        if !options.hide_selectors.is_empty() {
            cmd.args(["--hide-elements", &options.hide_selectors]);
        }
        if options.wait_ms > 0 {
            cmd.arg("--wait").arg(options.wait_ms.to_string());
        }
        cmd.arg(url);

        debug!(url, standard = %options.standard, "running pa11y");
        let output = cmd.output().await?;

        // Exit code 2 means issues were found; stdout carries the issue
        // list either way.
        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str::<Vec<AccessibilityIssue>>(stdout.trim()) {
            Ok(issues) => {
                debug!(url, issues = issues.len(), "pa11y finished");
                Ok(issues)
            }
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(AuditError::Audit(format!(
                    "pa11y produced no issue list for {url}: {}",
                    stderr.trim()
                )))
            }
        }
    }
}
