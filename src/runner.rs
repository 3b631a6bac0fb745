//! Check runner: evaluates one descriptor against the live page
//!
//! Dispatch is by `CheckKind`. Failures follow the harness taxonomy: a
//! missing element or a failed interaction skips that single check (logged,
//! no record), a false condition is the normal "test failed" outcome, and
//! only transport-level driver failures propagate.

use rand::Rng;
use tracing::{debug, warn};

use crate::checks::{CheckDescriptor, CheckKind, Reachability};
use crate::driver::PageDriver;
use crate::error::AuditResult;
use crate::report::CheckValue;

/// Why a check produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The page is in an error state and the check opted out of those.
    ErrorStatePage,
    /// No element matched the selector.
    ElementNotFound,
    /// Hover/focus failed (e.g. the element detached).
    InteractionFailed,
    /// The attribute read failed.
    ReadFailed,
}

/// Outcome of evaluating one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran; `passed` is the condition result.
    Measured { value: CheckValue, passed: bool },
    /// The check was skipped; no record is emitted.
    Skipped(SkipReason),
}

/// Evaluates descriptors against the current page. Holds only borrows; the
/// session passes itself in per call and keeps ownership of the handles.
pub struct CheckRunner<'a> {
    driver: &'a dyn PageDriver,
    probe: &'a dyn Reachability,
}

impl<'a> CheckRunner<'a> {
    pub fn new(driver: &'a dyn PageDriver, probe: &'a dyn Reachability) -> Self {
        Self { driver, probe }
    }

    /// Evaluate one descriptor. Applies the descriptor's viewport resize
    /// first; the viewport is deliberately not restored afterwards, so
    /// check ordering is viewport-significant.
    pub async fn evaluate(
        &self,
        check: &CheckDescriptor,
        lang: &str,
        is_error_page: bool,
    ) -> AuditResult<CheckOutcome> {
        if check.kind == CheckKind::RandomComputedStyle && is_error_page && !check.run_on_error {
            debug!(id = %check.id, "skipping interaction check on error-state page");
            return Ok(CheckOutcome::Skipped(SkipReason::ErrorStatePage));
        }

        if let Some(viewport) = check.resize {
            debug!(id = %check.id, width = viewport.width, height = viewport.height, "resize");
            self.driver
                .set_viewport(viewport.width, viewport.height, 1.0)
                .await?;
        }

        let value = match check.kind {
            CheckKind::Attribute => match self.driver.attribute(&check.selector, &check.attribute).await {
                Ok(Some(value)) => CheckValue::Text(value),
                Ok(None) => {
                    warn!(id = %check.id, selector = %check.selector, "element not found");
                    return Ok(CheckOutcome::Skipped(SkipReason::ElementNotFound));
                }
                Err(e) => {
                    warn!(id = %check.id, selector = %check.selector, error = %e, "attribute read failed");
                    return Ok(CheckOutcome::Skipped(SkipReason::ReadFailed));
                }
            },
            CheckKind::Title => CheckValue::Text(self.driver.title().await?),
            CheckKind::Count => CheckValue::Count(self.driver.count(&check.selector).await?),
            CheckKind::ComputedStyle => {
                match self.driver.computed_style(&check.selector, 0, &check.attribute).await? {
                    Some(value) => CheckValue::Text(value),
                    // Best-effort: some pages legitimately lack the element.
                    None => {
                        debug!(id = %check.id, selector = %check.selector, "no element for style check");
                        return Ok(CheckOutcome::Skipped(SkipReason::ElementNotFound));
                    }
                }
            }
            CheckKind::RandomComputedStyle => {
                match self.random_computed_style(check).await? {
                    Ok(value) => value,
                    Err(reason) => return Ok(CheckOutcome::Skipped(reason)),
                }
            }
        };

        let passed = check.condition.evaluate(&value, lang, self.probe).await;
        Ok(CheckOutcome::Measured { value, passed })
    }

    /// Sample the computed style of a uniformly random element in the match
    /// set, optionally hovering then focusing it first. Interaction failure
    /// aborts only this check, with its own skip reason.
    async fn random_computed_style(
        &self,
        check: &CheckDescriptor,
    ) -> AuditResult<Result<CheckValue, SkipReason>> {
        let matches = self.driver.count(&check.selector).await?;
        if matches == 0 {
            debug!(id = %check.id, selector = %check.selector, "no elements to sample");
            return Ok(Err(SkipReason::ElementNotFound));
        }

        let index = rand::thread_rng().gen_range(0..matches);
        debug!(id = %check.id, index, matches, "sampling random element");

        if check.hover {
            if let Err(e) = self.driver.hover(&check.selector, index).await {
                warn!(id = %check.id, selector = %check.selector, error = %e, "hover failed");
                return Ok(Err(SkipReason::InteractionFailed));
            }
        }
        if check.focus {
            if let Err(e) = self.driver.focus(&check.selector, index).await {
                warn!(id = %check.id, selector = %check.selector, error = %e, "focus failed");
                return Ok(Err(SkipReason::InteractionFailed));
            }
        }

        Ok(self
            .driver
            .computed_style(&check.selector, index, &check.attribute)
            .await?
            .map(CheckValue::Text)
            .ok_or(SkipReason::ElementNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Condition, Viewport};
    use crate::driver::WaitPolicy;
    use crate::error::AuditError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct NeverReachable;

    #[async_trait]
    impl Reachability for NeverReachable {
        async fn validate_reachable(&self, _url: &str, _relative: bool) -> bool {
            false
        }
    }

    /// Minimal scripted driver: fixed title, one selector with styled
    /// matches, everything else empty.
    #[derive(Default)]
    struct ScriptedDriver {
        matches: usize,
        style: Option<String>,
        hover_fails: bool,
        focus_fails: bool,
        viewports: Mutex<Vec<(u32, u32)>>,
    }

    #[async_trait]
    impl PageDriver for ScriptedDriver {
        async fn navigate(&self, _url: &str, _wait: WaitPolicy) -> AuditResult<()> {
            Ok(())
        }
        async fn current_url(&self) -> AuditResult<String> {
            Ok("http://localhost/".to_string())
        }
        async fn set_viewport(&self, width: u32, height: u32, _scale: f64) -> AuditResult<()> {
            self.viewports.lock().unwrap().push((width, height));
            Ok(())
        }
        async fn title(&self) -> AuditResult<String> {
            Ok("Sample page".to_string())
        }
        async fn count(&self, _selector: &str) -> AuditResult<usize> {
            Ok(self.matches)
        }
        async fn attribute(&self, _selector: &str, _attribute: &str) -> AuditResult<Option<String>> {
            Ok(None)
        }
        async fn computed_style(
            &self,
            _selector: &str,
            _index: usize,
            _property: &str,
        ) -> AuditResult<Option<String>> {
            Ok(self.style.clone())
        }
        async fn hover(&self, selector: &str, _index: usize) -> AuditResult<()> {
            if self.hover_fails {
                Err(AuditError::InteractionFailed {
                    selector: selector.to_string(),
                    reason: "detached".to_string(),
                })
            } else {
                Ok(())
            }
        }
        async fn focus(&self, selector: &str, _index: usize) -> AuditResult<()> {
            if self.focus_fails {
                Err(AuditError::InteractionFailed {
                    selector: selector.to_string(),
                    reason: "detached".to_string(),
                })
            } else {
                Ok(())
            }
        }
        async fn click(&self, _selector: &str) -> AuditResult<()> {
            Ok(())
        }
        async fn type_text(&self, _selector: &str, _text: &str) -> AuditResult<()> {
            Ok(())
        }
        async fn screenshot(&self, _path: &Path, _full_page: bool) -> AuditResult<()> {
            Ok(())
        }
        async fn head_markup(&self) -> AuditResult<String> {
            Ok(String::new())
        }
        async fn close(&self) -> AuditResult<()> {
            Ok(())
        }
    }

    fn random_style_check() -> CheckDescriptor {
        CheckDescriptor {
            id: "style".to_string(),
            kind: CheckKind::RandomComputedStyle,
            selector: "main h1".to_string(),
            attribute: "color".to_string(),
            version_range: None,
            min_level: 0,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::HexColorIs("#272525"),
        }
    }

    #[tokio::test]
    async fn random_style_with_zero_matches_skips() {
        let driver = ScriptedDriver::default();
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let outcome = runner.evaluate(&random_style_check(), "el", false).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::ElementNotFound));
    }

    #[tokio::test]
    async fn random_style_samples_and_passes_condition() {
        let driver = ScriptedDriver {
            matches: 3,
            style: Some("rgb(39, 37, 37)".to_string()),
            ..Default::default()
        };
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let outcome = runner.evaluate(&random_style_check(), "el", false).await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Measured {
                value: CheckValue::Text("rgb(39, 37, 37)".to_string()),
                passed: true,
            }
        );
    }

    #[tokio::test]
    async fn interaction_checks_skip_on_error_state_pages() {
        let driver = ScriptedDriver {
            matches: 3,
            style: Some("rgb(39, 37, 37)".to_string()),
            ..Default::default()
        };
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let outcome = runner.evaluate(&random_style_check(), "el", true).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::ErrorStatePage));

        let mut opted_in = random_style_check();
        opted_in.run_on_error = true;
        let outcome = runner.evaluate(&opted_in, "el", true).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Measured { .. }));
    }

    #[tokio::test]
    async fn hover_failure_reports_an_interaction_skip() {
        let driver = ScriptedDriver {
            matches: 1,
            style: Some("rgb(39, 37, 37)".to_string()),
            hover_fails: true,
            ..Default::default()
        };
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let mut check = random_style_check();
        check.hover = true;
        let outcome = runner.evaluate(&check, "el", false).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::InteractionFailed));
    }

    #[tokio::test]
    async fn focus_failure_reports_an_interaction_skip() {
        let driver = ScriptedDriver {
            matches: 1,
            style: Some("rgb(39, 37, 37)".to_string()),
            focus_fails: true,
            ..Default::default()
        };
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let mut check = random_style_check();
        check.focus = true;
        let outcome = runner.evaluate(&check, "el", false).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::InteractionFailed));
    }

    #[tokio::test]
    async fn attribute_check_skips_when_element_missing() {
        let driver = ScriptedDriver::default();
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let check = CheckDescriptor {
            id: "attr".to_string(),
            kind: CheckKind::Attribute,
            selector: "html".to_string(),
            attribute: "lang".to_string(),
            version_range: None,
            min_level: 1,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::MatchesLanguage,
        };
        let outcome = runner.evaluate(&check, "el", false).await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped(SkipReason::ElementNotFound));
    }

    #[tokio::test]
    async fn resize_is_applied_before_dispatch() {
        let driver = ScriptedDriver {
            style: Some("1280px".to_string()),
            matches: 1,
            ..Default::default()
        };
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let check = CheckDescriptor {
            id: "width".to_string(),
            kind: CheckKind::ComputedStyle,
            selector: "#mainContainer".to_string(),
            attribute: "width".to_string(),
            version_range: None,
            min_level: 0,
            run_on_error: false,
            resize: Some(Viewport { width: 2200, height: 3000 }),
            hover: false,
            focus: false,
            condition: Condition::EqualsIgnoreCase("1280px"),
        };
        let outcome = runner.evaluate(&check, "el", false).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Measured { passed: true, .. }));
        assert_eq!(*driver.viewports.lock().unwrap(), vec![(2200, 3000)]);
    }

    #[tokio::test]
    async fn title_check_measures_the_page_title() {
        let driver = ScriptedDriver::default();
        let runner = CheckRunner::new(&driver, &NeverReachable);
        let check = CheckDescriptor {
            id: "title".to_string(),
            kind: CheckKind::Title,
            selector: String::new(),
            attribute: String::new(),
            version_range: None,
            min_level: 1,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::NonEmpty,
        };
        let outcome = runner.evaluate(&check, "el", false).await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Measured {
                value: CheckValue::Text("Sample page".to_string()),
                passed: true,
            }
        );
    }
}
