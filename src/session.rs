//! Session controller: owns the live handles and the growing report
//!
//! One session drives one browser through a sequence of already-navigated
//! pages, runs the per-page check battery, and re-renders the aggregate
//! report after every page so a crash loses at most the in-flight check.
//!
//! Lifecycle: `Idle -> Running` (start_run) `-> Ended` (end_run, terminal).
//! Calling operations out of order fails fast with `InvalidState`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use tracing::{info, warn};

use crate::checks::{CheckKind, CheckRegistry, Reachability, Viewport};
use crate::driver::{AccessibilityAuditor, AuditOptions, FlowAuditor, PageDriver, WaitPolicy};
use crate::error::{AuditError, AuditResult};
use crate::render::render_report;
use crate::report::{CheckValue, RunReport, TYPE_A11Y_ISSUES, TYPE_HEAD, TYPE_SCREENSHOT};
use crate::runner::{CheckOutcome, CheckRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Running,
    Ended,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Ended => "ended",
        }
    }
}

/// Immutable run configuration, decoupled from the live handles.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory for all report artifacts. Created by `start_run`.
    pub output_dir: PathBuf,

    /// Full-page screenshot widths captured per page.
    pub screenshot_widths: Vec<u32>,

    /// Fixed settle delay before each page-test batch, for late layout and
    /// async content.
    pub settle_delay: Duration,

    /// Baseline viewport for reading the page.
    pub reading_viewport: Viewport,

    /// Taller viewport restored after each page-test; some click targets
    /// need the extra height to be scrollable into view.
    pub interaction_viewport: Viewport,

    /// 0 runs everything including deployment-specific checks, 1 runs only
    /// the mandatory battery.
    pub check_level: u8,

    /// Declared design-system version of the service under test; gates
    /// version-ranged descriptors.
    pub system_version: Version,

    /// Capture the `<head>` markup to a side file per page.
    pub capture_head: bool,

    /// Run the descriptor battery.
    pub run_checks: bool,

    /// Run the external accessibility audit per page.
    pub run_accessibility: bool,

    /// Take a flow-audit snapshot per page.
    pub run_flow_audit: bool,

    /// Report only failed conditions and file artifacts.
    pub show_only_errors: bool,

    /// Options handed to the accessibility auditor.
    pub accessibility: AuditOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("audit-results"),
            screenshot_widths: vec![1200, 800, 360],
            settle_delay: Duration::from_secs(5),
            reading_viewport: Viewport { width: 1200, height: 2000 },
            interaction_viewport: Viewport { width: 1200, height: 3000 },
            check_level: 1,
            system_version: Version::new(3, 0, 0),
            capture_head: true,
            run_checks: true,
            run_accessibility: true,
            run_flow_audit: true,
            show_only_errors: false,
            accessibility: AuditOptions::default(),
        }
    }
}

/// Reachability probe resolving relative URLs against the current page.
/// TLS certificate errors are accepted; every failure becomes `false`.
struct UrlProber<'a> {
    client: &'a reqwest::Client,
    base: Option<&'a str>,
}

#[async_trait]
impl Reachability for UrlProber<'_> {
    async fn validate_reachable(&self, url: &str, relative: bool) -> bool {
        let target = if relative {
            let resolved = self
                .base
                .and_then(|base| reqwest::Url::parse(base).ok())
                .and_then(|base| base.join(url).ok());
            match resolved {
                Some(resolved) => resolved.to_string(),
                None => {
                    warn!(url, "could not resolve relative url");
                    return false;
                }
            }
        } else {
            url.to_string()
        };

        match self.client.get(&target).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(url = %target, status = %response.status(), "url probe returned non-success");
                false
            }
            Err(e) => {
                warn!(url = %target, error = %e, "url probe failed");
                false
            }
        }
    }
}

/// Owns the browser handle, the optional auditors, and the run report.
/// All operations are strictly sequential; the report mutates only through
/// the accumulator from this single control flow.
pub struct AuditSession {
    config: SessionConfig,
    registry: CheckRegistry,
    driver: Box<dyn PageDriver>,
    accessibility: Option<Box<dyn AccessibilityAuditor>>,
    flow: Option<Box<dyn FlowAuditor>>,
    client: reqwest::Client,
    report: RunReport,
    state: SessionState,
}

impl AuditSession {
    /// Create a session over a connected driver. The session is `Idle`
    /// until `start_run`.
    pub fn new(
        config: SessionConfig,
        registry: CheckRegistry,
        driver: Box<dyn PageDriver>,
    ) -> AuditResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(10))
            .build()?;

        let show_only_errors = config.show_only_errors;
        Ok(Self {
            config,
            registry,
            driver,
            accessibility: None,
            flow: None,
            client,
            report: RunReport::new("", show_only_errors),
            state: SessionState::Idle,
        })
    }

    pub fn with_accessibility(mut self, auditor: Box<dyn AccessibilityAuditor>) -> Self {
        self.accessibility = Some(auditor);
        self
    }

    pub fn with_flow(mut self, auditor: Box<dyn FlowAuditor>) -> Self {
        self.flow = Some(auditor);
        self
    }

    /// The accumulated report so far.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    fn expect_state(&self, expected: SessionState) -> AuditResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AuditError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    /// Begin a run: creates the output directory and resets the report.
    pub async fn start_run(&mut self, test_name: &str) -> AuditResult<()> {
        self.expect_state(SessionState::Idle)?;
        std::fs::create_dir_all(&self.config.output_dir)?;
        self.report = RunReport::new(test_name, self.config.show_only_errors);
        self.state = SessionState::Running;
        info!(test_name, output = %self.config.output_dir.display(), "run started");
        Ok(())
    }

    /// Caller-driven navigation between page-tests. Failures are fatal to
    /// the run and propagate.
    pub async fn goto(&self, url: &str) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        self.driver.navigate(url, WaitPolicy::NetworkIdle).await
    }

    /// Run the full check battery against the current, already-navigated
    /// page and re-render the aggregate report to disk.
    pub async fn run_page_checks(
        &mut self,
        page_id: &str,
        lang: &str,
        is_error_page: bool,
        excluded_check_ids: &[String],
    ) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        info!(page = page_id, "checking page");

        tokio::time::sleep(self.config.settle_delay).await;

        let reading = self.config.reading_viewport;
        self.driver
            .set_viewport(reading.width, reading.height, 1.0)
            .await?;

        for width in self.config.screenshot_widths.clone() {
            self.capture_screenshot(page_id, width).await?;
        }

        if self.config.capture_head {
            self.capture_head_section(page_id).await?;
        }

        if self.config.run_checks {
            self.run_descriptor_battery(page_id, lang, is_error_page, excluded_check_ids)
                .await?;
        }

        if self.config.run_accessibility {
            if let Some(auditor) = &self.accessibility {
                let url = self.driver.current_url().await?;
                match auditor.audit(&url, &self.config.accessibility).await {
                    Ok(issues) => {
                        let passed = issues.is_empty();
                        self.report.record(
                            page_id,
                            TYPE_A11Y_ISSUES,
                            &format!("{page_id}.pa11y"),
                            CheckValue::Issues(issues),
                            Some(passed),
                            None,
                            None,
                        );
                    }
                    Err(e) => warn!(page = page_id, error = %e, "accessibility audit failed"),
                }
            }
        }

        if self.config.run_flow_audit {
            if let Some(flow) = &self.flow {
                let url = self.driver.current_url().await?;
                if let Err(e) = flow.snapshot(&url).await {
                    warn!(page = page_id, error = %e, "flow snapshot failed");
                }
            }
        }

        let interaction = self.config.interaction_viewport;
        self.driver
            .set_viewport(interaction.width, interaction.height, 1.0)
            .await?;

        // Full re-render every page: a crash later in the run still leaves
        // a consistent artifact covering everything up to here.
        self.write_report()?;
        info!(page = page_id, "page done");
        Ok(())
    }

    /// End the run and close the browser. Terminal.
    pub async fn end_run(&mut self) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        self.driver.close().await?;
        self.state = SessionState::Ended;
        info!("run ended");
        Ok(())
    }

    /// Begin a flow-audit timespan labelled `step`. No-op when flow
    /// auditing is disabled or absent.
    pub async fn start_flow_timespan(&self, step: &str) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        match &self.flow {
            Some(flow) if self.config.run_flow_audit => flow.start_timespan(step).await,
            _ => Ok(()),
        }
    }

    /// End the current flow-audit timespan.
    pub async fn end_flow_timespan(&self) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        match &self.flow {
            Some(flow) if self.config.run_flow_audit => flow.end_timespan().await,
            _ => Ok(()),
        }
    }

    /// Accessibility score for the page at `url` from the flow auditor,
    /// scaled to 0-100. `None` when flow auditing is disabled or the
    /// engine reports no score.
    pub async fn accessibility_score(&self, url: &str) -> AuditResult<Option<f64>> {
        self.expect_state(SessionState::Running)?;
        match &self.flow {
            Some(flow) if self.config.run_flow_audit => {
                let score = flow.accessibility_score(url).await?;
                Ok(score.map(|s| s * 100.0))
            }
            _ => Ok(None),
        }
    }

    /// Persist the flow auditor's aggregate report and link it from the
    /// run report. No-op when flow auditing is disabled or absent.
    pub async fn write_flow_report(&mut self, file_name: &str) -> AuditResult<()> {
        self.expect_state(SessionState::Running)?;
        if !self.config.run_flow_audit {
            return Ok(());
        }
        let Some(flow) = &self.flow else {
            return Ok(());
        };
        let document = flow.generate_report().await?;
        std::fs::write(self.config.output_dir.join(file_name), document)?;
        self.report.lighthouse = Some(file_name.to_string());
        self.write_report()
    }

    /// Probe a URL, resolved against the current page when `relative`.
    /// Never raises; every failure is logged and folded to `false`.
    pub async fn validate_reachable(&self, url: &str, relative: bool) -> bool {
        let base = if relative {
            self.driver.current_url().await.ok()
        } else {
            None
        };
        let prober = UrlProber {
            client: &self.client,
            base: base.as_deref(),
        };
        prober.validate_reachable(url, relative).await
    }

    async fn capture_screenshot(&mut self, page_id: &str, width: u32) -> AuditResult<()> {
        self.driver.set_viewport(width, 100, 1.0).await?;
        let key = format!("{}.{width}", sanitize_page_id(page_id));
        let file_name = format!("{key}.png");
        self.driver
            .screenshot(&self.config.output_dir.join(&file_name), true)
            .await?;
        self.report.record(
            page_id,
            TYPE_SCREENSHOT,
            &key,
            CheckValue::File(file_name),
            None,
            None,
            None,
        );
        Ok(())
    }

    async fn capture_head_section(&mut self, page_id: &str) -> AuditResult<()> {
        let markup = match self.driver.head_markup().await {
            Ok(markup) => markup,
            Err(e) => {
                warn!(page = page_id, error = %e, "head capture failed");
                return Ok(());
            }
        };
        let key = format!("{}.head", sanitize_page_id(page_id));
        let file_name = format!("{key}.txt");
        std::fs::write(self.config.output_dir.join(&file_name), markup)?;
        self.report.record(
            page_id,
            TYPE_HEAD,
            &key,
            CheckValue::File(file_name),
            None,
            None,
            None,
        );
        Ok(())
    }

    async fn run_descriptor_battery(
        &mut self,
        page_id: &str,
        lang: &str,
        is_error_page: bool,
        excluded_check_ids: &[String],
    ) -> AuditResult<()> {
        let current_url = self.driver.current_url().await.ok();
        let prober = UrlProber {
            client: &self.client,
            base: current_url.as_deref(),
        };
        let runner = CheckRunner::new(self.driver.as_ref(), &prober);

        let applicable = self.registry.applicable(
            self.config.check_level,
            &self.config.system_version,
            excluded_check_ids,
        );

        for check in applicable {
            let outcome = runner.evaluate(check, lang, is_error_page).await?;
            let CheckOutcome::Measured { value, passed } = outcome else {
                continue;
            };

            let selector = (!check.selector.is_empty()).then_some(check.selector.as_str());
            let attribute = match check.kind {
                CheckKind::Attribute | CheckKind::ComputedStyle | CheckKind::RandomComputedStyle => {
                    (!check.attribute.is_empty()).then_some(check.attribute.as_str())
                }
                CheckKind::Title | CheckKind::Count => None,
            };

            self.report.record(
                page_id,
                &check.id,
                &format!("{page_id}.{}", check.id),
                value,
                Some(passed),
                selector,
                attribute,
            );
        }
        Ok(())
    }

    /// Write the rendered report and its JSON form to the output directory.
    fn write_report(&self) -> AuditResult<()> {
        let html = render_report(&self.report);
        std::fs::write(self.config.output_dir.join("index.html"), html)?;
        let json = serde_json::to_string_pretty(&self.report)?;
        std::fs::write(self.config.output_dir.join("report.json"), json)?;
        Ok(())
    }
}

/// Page ids may be URL paths; keep artifact names filesystem-safe.
fn sanitize_page_id(page_id: &str) -> String {
    page_id.replace(['/', '?'], "_")
}
