//! Check registry: the declarative table of page checks
//!
//! Each check is a `CheckDescriptor`: pure data plus one pass/fail
//! `Condition`. The built-in table mirrors the design-system conformance
//! battery: head-section metadata, social-card tags, favicon reachability,
//! and computed-style color checks with hover/focus variants.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use semver::{Version, VersionReq};

use crate::error::{AuditError, AuditResult};
use crate::report::CheckValue;

/// Viewport dimensions applied before a single check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// What a check measures. Each variant only reads the descriptor fields it
/// needs; `hover`/`focus`/`run_on_error` are meaningful only for
/// `RandomComputedStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// DOM attribute/property of the first matching element.
    Attribute,
    /// The page title; ignores selector and attribute.
    Title,
    /// Number of elements matching the selector.
    Count,
    /// Computed style of the first matching element; best-effort.
    ComputedStyle,
    /// Computed style of a uniformly random matching element, optionally
    /// after hover/focus interaction.
    RandomComputedStyle,
}

/// Capability for probing URL reachability. Conditions that validate links
/// receive this as an argument instead of capturing a live session.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// `true` only for a 2xx-class response; never raises.
    async fn validate_reachable(&self, url: &str, relative: bool) -> bool;
}

/// Pass/fail predicate of a check, evaluated against the measured value and
/// the expected language code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Lowercased, whitespace-stripped value equals the expected string.
    NormalizedEquals(&'static str),
    /// Case-insensitive equality.
    EqualsIgnoreCase(&'static str),
    /// Value equals the page's expected language code.
    MatchesLanguage,
    /// Non-empty text.
    NonEmpty,
    /// Exact element count.
    CountIs(usize),
    /// `rgb(r, g, b)` value converted to hex equals the expected color.
    HexColorIs(&'static str),
    /// Value is an absolute URL answering with a success status.
    Reachable,
    /// Value is a URL, possibly relative to the current page, answering
    /// with a success status.
    ReachableRelative,
}

impl Condition {
    /// Evaluate against a measured value. Shape mismatches (e.g. a count
    /// condition against a text value) fail rather than panic.
    pub async fn evaluate(
        &self,
        value: &CheckValue,
        lang: &str,
        probe: &dyn Reachability,
    ) -> bool {
        match self {
            Condition::NormalizedEquals(expected) => match value {
                CheckValue::Text(s) => {
                    let normalized: String =
                        s.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
                    normalized == *expected
                }
                _ => false,
            },
            Condition::EqualsIgnoreCase(expected) => match value {
                CheckValue::Text(s) => s.eq_ignore_ascii_case(expected),
                _ => false,
            },
            Condition::MatchesLanguage => match value {
                CheckValue::Text(s) => s.to_lowercase() == lang.to_lowercase(),
                _ => false,
            },
            Condition::NonEmpty => match value {
                CheckValue::Text(s) => !s.is_empty(),
                _ => false,
            },
            Condition::CountIs(expected) => match value {
                CheckValue::Count(n) => n == expected,
                _ => false,
            },
            Condition::HexColorIs(expected) => match value {
                CheckValue::Text(s) => rgb2hex(s).eq_ignore_ascii_case(expected),
                _ => false,
            },
            Condition::Reachable => match value {
                CheckValue::Text(url) => probe.validate_reachable(url, false).await,
                _ => false,
            },
            Condition::ReachableRelative => match value {
                CheckValue::Text(url) => probe.validate_reachable(url, true).await,
                _ => false,
            },
        }
    }
}

/// Convert an `rgb(r, g, b)` color string to `#rrggbb` hex.
/// Unparsable input falls back to `#ffffff`.
pub fn rgb2hex(rgb: &str) -> String {
    static RGB_RE: OnceLock<Regex> = OnceLock::new();
    let re = RGB_RE
        .get_or_init(|| Regex::new(r"^rgb\((\d+),\s*(\d+),\s*(\d+)\)$").expect("valid regex"));

    let Some(caps) = re.captures(rgb.trim()) else {
        return "#ffffff".to_string();
    };
    let channel = |i: usize| caps[i].parse::<u32>().unwrap_or(255).min(255);
    format!("#{:02x}{:02x}{:02x}", channel(1), channel(2), channel(3))
}

/// One entry in the check table. Immutable after registration.
#[derive(Debug, Clone)]
pub struct CheckDescriptor {
    /// Unique key within the registry.
    pub id: String,
    pub kind: CheckKind,
    /// CSS selector; empty for title checks.
    pub selector: String,
    /// DOM attribute or CSS property name; empty when not applicable.
    pub attribute: String,
    /// Applies only when the system version satisfies this range.
    pub version_range: Option<VersionReq>,
    /// The check runs when the configured check level is <= this threshold.
    /// Level 0 checks are the advanced ones that usually need per-deployment
    /// selector overrides; level 1 checks are mandatory.
    pub min_level: u8,
    /// RandomComputedStyle only: still run on error-state pages.
    pub run_on_error: bool,
    /// Viewport applied immediately before this one check.
    pub resize: Option<Viewport>,
    /// RandomComputedStyle only: hover the element before sampling.
    pub hover: bool,
    /// RandomComputedStyle only: focus the element before sampling.
    pub focus: bool,
    pub condition: Condition,
}

fn req(range: &str) -> Option<VersionReq> {
    Some(VersionReq::parse(range).expect("valid built-in version range"))
}

impl CheckDescriptor {
    fn head_attribute(id: &str, selector: &str, attribute: &str, condition: Condition) -> Self {
        Self {
            id: id.to_string(),
            kind: CheckKind::Attribute,
            selector: selector.to_string(),
            attribute: attribute.to_string(),
            version_range: req(">=1"),
            min_level: 1,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition,
        }
    }

    fn head_count(id: &str, selector: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: CheckKind::Count,
            selector: selector.to_string(),
            attribute: String::new(),
            version_range: req(">=1"),
            min_level: 1,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::CountIs(1),
        }
    }

    fn page_title(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: CheckKind::Title,
            selector: String::new(),
            attribute: String::new(),
            version_range: req(">=1"),
            min_level: 1,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::NonEmpty,
        }
    }

    fn style(id: &str, selector: &str, property: &str, condition: Condition) -> Self {
        Self {
            id: id.to_string(),
            kind: CheckKind::ComputedStyle,
            selector: selector.to_string(),
            attribute: property.to_string(),
            version_range: req(">=1, <3"),
            min_level: 0,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition,
        }
    }

    fn random_style(id: &str, selector: &str, property: &str, hex: &'static str) -> Self {
        Self {
            id: id.to_string(),
            kind: CheckKind::RandomComputedStyle,
            selector: selector.to_string(),
            attribute: property.to_string(),
            version_range: req(">=1, <3"),
            min_level: 0,
            run_on_error: false,
            resize: None,
            hover: false,
            focus: false,
            condition: Condition::HexColorIs(hex),
        }
    }

    fn with_hover(mut self) -> Self {
        self.hover = true;
        self
    }

    fn with_focus(mut self) -> Self {
        self.focus = true;
        self
    }

    fn on_error_pages(mut self) -> Self {
        self.run_on_error = true;
        self
    }

    fn with_resize(mut self, width: u32, height: u32) -> Self {
        self.resize = Some(Viewport { width, height });
        self
    }
}

/// The check table. Insertion order is evaluation order.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    checks: Vec<CheckDescriptor>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Duplicate ids are rejected rather than
    /// silently shadowing an earlier entry.
    pub fn register(&mut self, descriptor: CheckDescriptor) -> AuditResult<()> {
        if self.checks.iter().any(|c| c.id == descriptor.id) {
            return Err(AuditError::DuplicateCheck(descriptor.id));
        }
        self.checks.push(descriptor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckDescriptor> {
        self.checks.iter()
    }

    /// Descriptors applicable for this run, in insertion order: not
    /// excluded by id, level threshold met, and version range (when
    /// present) satisfied by the system version.
    pub fn applicable<'a>(
        &'a self,
        check_level: u8,
        system_version: &Version,
        excluded_ids: &[String],
    ) -> Vec<&'a CheckDescriptor> {
        self.checks
            .iter()
            .filter(|c| !excluded_ids.iter().any(|e| e == &c.id))
            .filter(|c| check_level <= c.min_level)
            .filter(|c| {
                c.version_range
                    .as_ref()
                    .map(|r| r.matches(system_version))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// The built-in design-system conformance battery.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for check in builtin_checks() {
            registry
                .register(check)
                .expect("built-in check ids are unique");
        }
        registry
    }
}

fn builtin_checks() -> Vec<CheckDescriptor> {
    use CheckDescriptor as D;

    let mut checks = vec![
        D::head_attribute(
            "4.3.1.viewport",
            r#"head > meta[name="viewport"]"#,
            "content",
            Condition::NormalizedEquals("width=device-width,initial-scale=1"),
        ),
        D::head_attribute("4.3.1.lang", "html", "lang", Condition::MatchesLanguage),
        D::page_title("4.3.2.title"),
        D::head_attribute(
            "4.3.2.description",
            r#"head > meta[name="description"]"#,
            "content",
            Condition::NonEmpty,
        ),
        D::head_count("4.3.2.description.count", r#"head > meta[name="description"]"#),
        D::head_count("4.3.2.title.count", "head > title"),
    ];

    // Exactly one of each social-card tag.
    for property in [
        "og:url",
        "og:type",
        "og:image",
        "og:site_name",
        "og:title",
        "og:description",
        "twitter:title",
        "twitter:description",
        "twitter:card",
        "twitter:url",
        "twitter:image",
    ] {
        checks.push(D::head_count(
            &format!("4.3.3.meta.{property}.count"),
            &format!(r#"head > meta[property="{property}"]"#),
        ));
    }

    checks.push(D::head_attribute(
        "4.3.4.manifest.exists",
        r#"head > link[rel="manifest"]"#,
        "href",
        Condition::Reachable,
    ));
    checks.push(D::head_attribute(
        "4.3.4.theme.color",
        r#"head > meta[name="theme-color"]"#,
        "content",
        Condition::EqualsIgnoreCase("#31576f"),
    ));
    checks.push(D::head_attribute(
        "4.3.5.meta.og:image.exists",
        r#"head > meta[property="og:image"]"#,
        "content",
        Condition::ReachableRelative,
    ));
    checks.push(D::head_attribute(
        "4.3.5.meta.twitter:image.exists",
        r#"head > meta[property="twitter:image"]"#,
        "content",
        Condition::ReachableRelative,
    ));

    for sizes in ["48x48", "32x32", "16x16"] {
        checks.push(D::head_attribute(
            &format!("4.3.5.meta.favicon.{sizes}.exists"),
            &format!(r#"head > link[rel="icon"][sizes="{sizes}"]"#),
            "href",
            Condition::Reachable,
        ));
    }
    for sizes in ["144x144", "120x120", "114x114", "72x72"] {
        checks.push(D::head_attribute(
            &format!("4.3.5.meta.favicon.{sizes}.exists"),
            &format!(r#"head > link[rel="apple-touch-icon-precomposed"][sizes="{sizes}"]"#),
            "href",
            Condition::Reachable,
        ));
    }
    checks.push(D::head_attribute(
        "4.3.5.meta.favicon.apple.exists",
        r#"head > link[rel="apple-touch-icon-precomposed"]"#,
        "href",
        Condition::Reachable,
    ));

    // Layout and color checks against design-system v1/v2 tokens. These are
    // level 0: deployments with custom shells usually override the selectors.
    checks.push(
        D::style(
            "4.3.7.width.v1",
            "#mainContainer",
            "width",
            Condition::EqualsIgnoreCase("1280px"),
        )
        .with_resize(2200, 3000),
    );

    for heading in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        checks.push(D::random_style(
            &format!("4.3.6.{heading}.color.v1"),
            &format!("main {heading}"),
            "color",
            "#272525",
        ));
    }
    checks.push(D::random_style("4.3.6.p.color.v1", "main", "color", "#272525"));
    checks.push(D::random_style(
        "4.3.6.button-primary.background-color.v1",
        "main button.govcy-btn-primary",
        "background-color",
        "#31576f",
    ));
    checks.push(D::random_style("4.3.6.a.color.v1", "main a", "color", "#1d70b8"));
    checks.push(
        D::random_style("4.3.6.a.color.hover.v1", "main a", "color", "#003078").with_hover(),
    );
    checks.push(
        D::random_style("4.3.6.a.color.focus.v1", "main a", "color", "#272525").with_focus(),
    );
    checks.push(
        D::random_style(
            "4.3.6.error-link.color.v1",
            ".govcy-alert-error a",
            "color",
            "#d4351c",
        )
        .on_error_pages(),
    );
    checks.push(
        D::random_style(
            "4.3.6.error-link.color.hover.v1",
            ".govcy-alert-error a",
            "color",
            "#942514",
        )
        .on_error_pages()
        .with_hover(),
    );
    checks.push(
        D::random_style(
            "4.3.6.error-link.color.focus.v1",
            ".govcy-alert-error a",
            "background-color",
            "#ffdd00",
        )
        .on_error_pages()
        .with_focus(),
    );
    checks.push(D::random_style(
        "4.3.6.hint.color.v1",
        "main .govcy-hint",
        "color",
        "#6d6e70",
    ));
    checks.push(D::random_style(
        "4.3.6.header.color.v1",
        "header .govcy-bg-primary",
        "background-color",
        "#31576f",
    ));
    checks.push(D::random_style(
        "4.3.6.footer.color.v1",
        ".govcy-container-fluid.govcy-br-top-8.govcy-br-top-primary.govcy-p-3.govcy-bg-light.govcy-d-print-none",
        "background-color",
        "#ebf1f3",
    ));
    checks.push(D::random_style(
        "4.3.6.footer-link.color.v1",
        "footer a",
        "color",
        "#000000",
    ));
    checks.push(
        D::random_style(
            "4.3.6.footer-link.color.focus.v1",
            "footer a",
            "background-color",
            "#ffdd00",
        )
        .with_focus(),
    );
    checks.push(D::random_style(
        "4.3.6.back-link.color.v1",
        "#beforeMainContainer a",
        "color",
        "#272525",
    ));
    checks.push(
        D::random_style(
            "4.3.6.back-link.color.focus.v1",
            "#beforeMainContainer a",
            "background-color",
            "#ffdd00",
        )
        .with_focus(),
    );

    checks
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverReachable;

    #[async_trait]
    impl Reachability for NeverReachable {
        async fn validate_reachable(&self, _url: &str, _relative: bool) -> bool {
            false
        }
    }

    #[test]
    fn builtin_registry_has_unique_ids() {
        let registry = CheckRegistry::builtin();
        assert!(registry.len() > 40);
        let mut ids: Vec<_> = registry.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), registry.len());
    }

    #[test]
    fn register_rejects_duplicate_id() {
        let mut registry = CheckRegistry::new();
        registry
            .register(CheckDescriptor::page_title("4.3.2.title"))
            .unwrap();
        let err = registry
            .register(CheckDescriptor::page_title("4.3.2.title"))
            .unwrap_err();
        assert!(matches!(err, AuditError::DuplicateCheck(id) if id == "4.3.2.title"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn applicable_filters_by_level() {
        let registry = CheckRegistry::builtin();
        let version = Version::parse("1.3.2").unwrap();

        let mandatory = registry.applicable(1, &version, &[]);
        assert!(mandatory.iter().all(|c| c.min_level >= 1));
        assert!(mandatory.iter().any(|c| c.id == "4.3.1.viewport"));
        assert!(!mandatory.iter().any(|c| c.id == "4.3.6.h1.color.v1"));

        let everything = registry.applicable(0, &version, &[]);
        assert!(everything.len() > mandatory.len());
        assert!(everything.iter().any(|c| c.id == "4.3.6.h1.color.v1"));
    }

    #[test]
    fn applicable_filters_by_version() {
        let registry = CheckRegistry::builtin();

        // Style checks only apply to design-system v1/v2.
        let v3 = Version::parse("3.0.0").unwrap();
        let checks = registry.applicable(0, &v3, &[]);
        assert!(!checks.iter().any(|c| c.id == "4.3.6.h1.color.v1"));
        assert!(checks.iter().any(|c| c.id == "4.3.1.viewport"));

        // An absurdly new version still runs nothing versioned below it.
        let v100 = Version::parse("100.0.0").unwrap();
        let checks = registry.applicable(0, &v100, &[]);
        assert!(!checks.iter().any(|c| c.id == "4.3.6.h1.color.v1"));
    }

    #[test]
    fn applicable_honors_exclusions() {
        let registry = CheckRegistry::builtin();
        let version = Version::parse("1.0.0").unwrap();
        let excluded = vec!["4.3.1.viewport".to_string()];

        let checks = registry.applicable(1, &version, &excluded);
        assert!(!checks.iter().any(|c| c.id == "4.3.1.viewport"));
        assert!(checks.iter().any(|c| c.id == "4.3.1.lang"));
    }

    #[test]
    fn applicable_preserves_insertion_order() {
        let registry = CheckRegistry::builtin();
        let version = Version::parse("1.0.0").unwrap();
        let checks = registry.applicable(0, &version, &[]);

        let all_ids: Vec<_> = registry.iter().map(|c| c.id.as_str()).collect();
        let mut last_pos = 0;
        for check in checks {
            let pos = all_ids.iter().position(|id| *id == check.id).unwrap();
            assert!(pos >= last_pos);
            last_pos = pos;
        }
    }

    #[test]
    fn rgb2hex_converts_valid_colors() {
        assert_eq!(rgb2hex("rgb(255, 99, 71)"), "#ff6347");
        assert_eq!(rgb2hex("rgb(39, 37, 37)"), "#272525");
        assert_eq!(rgb2hex("rgb(0,0,0)"), "#000000");
    }

    #[test]
    fn rgb2hex_falls_back_to_white_on_invalid_input() {
        assert_eq!(rgb2hex("rgb(255, 99"), "#ffffff");
        assert_eq!(rgb2hex("#31576f"), "#ffffff");
        assert_eq!(rgb2hex(""), "#ffffff");
    }

    #[tokio::test]
    async fn normalized_equals_ignores_case_and_whitespace() {
        let condition = Condition::NormalizedEquals("width=device-width,initial-scale=1");
        let value = CheckValue::Text("Width=device-width, Initial-Scale=1".to_string());
        assert!(condition.evaluate(&value, "el", &NeverReachable).await);

        let wrong = CheckValue::Text("width=1200".to_string());
        assert!(!condition.evaluate(&wrong, "el", &NeverReachable).await);
    }

    #[tokio::test]
    async fn condition_shape_mismatch_fails() {
        let condition = Condition::CountIs(1);
        let value = CheckValue::Text("1".to_string());
        assert!(!condition.evaluate(&value, "el", &NeverReachable).await);

        let count = CheckValue::Count(1);
        assert!(condition.evaluate(&count, "el", &NeverReachable).await);
    }

    #[tokio::test]
    async fn hex_color_condition_matches_rgb_values() {
        let condition = Condition::HexColorIs("#272525");
        let value = CheckValue::Text("rgb(39, 37, 37)".to_string());
        assert!(condition.evaluate(&value, "el", &NeverReachable).await);
    }
}
