//! Report model and accumulator
//!
//! Heterogeneous check outcomes are normalized into `CheckRecord`s and
//! appended to per-page reports inside one `RunReport`. The model is
//! append-only and always serializable, so a crash mid-run still leaves a
//! valid partial report on disk.

use serde::{Deserialize, Serialize};

use crate::driver::AccessibilityIssue;

/// Check types with special rendering treatment. Everything else is a
/// plain text check.
pub const TYPE_SCREENSHOT: &str = "screenshoot";
pub const TYPE_HEAD: &str = "head";
pub const TYPE_A11Y: &str = "pa11y";
pub const TYPE_A11Y_ISSUES: &str = "pa11y.issues";

/// The measured value of a check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CheckValue {
    Text(String),
    Count(usize),
    /// Relative path of a persisted artifact.
    File(String),
    /// Accessibility issue list.
    Issues(Vec<AccessibilityIssue>),
}

/// Classification flags derived from a check type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindFlags {
    pub is_text: bool,
    pub is_file: bool,
    pub is_screenshot: bool,
    pub is_a11y_issues: bool,
}

/// Classify a check type into its rendering flags. The table is fixed:
/// screenshot/audit/head-dump kinds are files whose value is a relative
/// path, the issue-list kind carries structured data, everything else is
/// text.
pub fn classify(check_type: &str) -> KindFlags {
    let is_file = matches!(check_type, TYPE_A11Y | TYPE_SCREENSHOT | TYPE_HEAD);
    let is_a11y_issues = check_type == TYPE_A11Y_ISSUES;
    KindFlags {
        is_text: !is_file && !is_a11y_issues,
        is_file,
        is_screenshot: check_type == TYPE_SCREENSHOT,
        is_a11y_issues,
    }
}

/// One executed check. Absent fields carry explicit `has_*` markers so the
/// renderer can branch on presence uniformly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    #[serde(rename = "type")]
    pub check_type: String,
    pub key: String,
    pub value: CheckValue,
    pub is_text: bool,
    pub is_file: bool,
    #[serde(rename = "isScreenshoot")]
    pub is_screenshot: bool,
    #[serde(rename = "isPa11y")]
    pub is_a11y_issues: bool,
    pub has_condition: bool,
    pub condition: Option<bool>,
    pub has_selector: bool,
    #[serde(rename = "HTMLselector")]
    pub selector: Option<String>,
    pub has_attribute: bool,
    pub attribute: Option<String>,
}

/// All checks recorded for one logical page, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageReport {
    pub id: String,
    pub checks: Vec<CheckRecord>,
}

/// The accumulated report for a whole run. Created when the run starts,
/// mutated throughout, serialized repeatedly; never rolled back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub test_name: String,
    /// Relative path of the flow-audit report, once written.
    pub lighthouse: Option<String>,
    pub show_only_errors: bool,
    /// When the run started, for the report header.
    pub generated_at: String,
    pub pages: Vec<PageReport>,
}

impl RunReport {
    pub fn new(test_name: impl Into<String>, show_only_errors: bool) -> Self {
        Self {
            test_name: test_name.into(),
            lighthouse: None,
            show_only_errors,
            generated_at: chrono::Utc::now().to_rfc3339(),
            pages: Vec::new(),
        }
    }

    /// Append a check record for `page_id`, creating the page report on
    /// first use. Pages stay in first-seen order; records are never
    /// deduplicated. This operation cannot fail.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        page_id: &str,
        check_type: &str,
        key: &str,
        value: CheckValue,
        condition: Option<bool>,
        selector: Option<&str>,
        attribute: Option<&str>,
    ) {
        let flags = classify(check_type);
        let record = CheckRecord {
            check_type: check_type.to_string(),
            key: key.to_string(),
            value,
            is_text: flags.is_text,
            is_file: flags.is_file,
            is_screenshot: flags.is_screenshot,
            is_a11y_issues: flags.is_a11y_issues,
            has_condition: condition.is_some(),
            condition,
            has_selector: selector.is_some(),
            selector: selector.map(String::from),
            has_attribute: attribute.is_some(),
            attribute: attribute.map(String::from),
        };

        // Linear scan is fine: runs hold tens of pages, not thousands.
        match self.pages.iter_mut().find(|p| p.id == page_id) {
            Some(page) => page.checks.push(record),
            None => self.pages.push(PageReport {
                id: page_id.to_string(),
                checks: vec![record],
            }),
        }
    }

    /// Look up a page report by id.
    pub fn page(&self, page_id: &str) -> Option<&PageReport> {
        self.pages.iter().find(|p| p.id == page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("screenshoot", false, true, true, false; "screenshot is a file")]
    #[test_case("head", false, true, false, false; "head dump is a file")]
    #[test_case("pa11y", false, true, false, false; "audit artifact is a file")]
    #[test_case("pa11y.issues", false, false, false, true; "issue list is neither file nor text")]
    #[test_case("4.3.1.viewport", true, false, false, false; "check ids are text")]
    #[test_case("anything-else", true, false, false, false; "unknown types are text")]
    fn classification_table(
        check_type: &str,
        is_text: bool,
        is_file: bool,
        is_screenshot: bool,
        is_a11y_issues: bool,
    ) {
        let flags = classify(check_type);
        assert_eq!(flags.is_text, is_text);
        assert_eq!(flags.is_file, is_file);
        assert_eq!(flags.is_screenshot, is_screenshot);
        assert_eq!(flags.is_a11y_issues, is_a11y_issues);
    }

    #[test]
    fn records_for_same_page_share_one_page_report() {
        let mut report = RunReport::new("t", false);
        report.record(
            "home",
            "4.3.2.title",
            "home.4.3.2.title",
            CheckValue::Text("Home".into()),
            Some(true),
            None,
            None,
        );
        report.record(
            "home",
            "4.3.2.title.count",
            "home.4.3.2.title.count",
            CheckValue::Count(1),
            Some(true),
            Some("head > title"),
            None,
        );

        assert_eq!(report.pages.len(), 1);
        let page = report.page("home").unwrap();
        assert_eq!(page.checks.len(), 2);
        assert_eq!(page.checks[0].check_type, "4.3.2.title");
        assert_eq!(page.checks[1].check_type, "4.3.2.title.count");
    }

    #[test]
    fn pages_appear_in_first_seen_order() {
        let mut report = RunReport::new("t", false);
        for id in ["b", "a", "b", "c"] {
            report.record(id, "x", "k", CheckValue::Count(0), None, None, None);
        }
        let ids: Vec<_> = report.pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(report.page("b").unwrap().checks.len(), 2);
    }

    #[test]
    fn identical_records_are_both_kept() {
        let mut report = RunReport::new("t", false);
        for _ in 0..2 {
            report.record(
                "p",
                "4.3.1.lang",
                "p.4.3.1.lang",
                CheckValue::Text("el".into()),
                Some(true),
                Some("html"),
                Some("lang"),
            );
        }
        assert_eq!(report.page("p").unwrap().checks.len(), 2);
    }

    #[test]
    fn absent_fields_carry_explicit_markers() {
        let mut report = RunReport::new("t", false);
        report.record(
            "p",
            TYPE_SCREENSHOT,
            "p.1200",
            CheckValue::File("p.1200.png".into()),
            None,
            None,
            None,
        );
        let record = &report.page("p").unwrap().checks[0];
        assert!(!record.has_condition);
        assert!(record.condition.is_none());
        assert!(!record.has_selector);
        assert!(record.selector.is_none());
        assert!(!record.has_attribute);
        assert!(record.attribute.is_none());
        assert!(record.is_file);
        assert!(record.is_screenshot);
        assert!(!record.is_text);
    }

    #[test]
    fn report_serializes_with_renderer_field_names() {
        let mut report = RunReport::new("suite", false);
        report.record(
            "p",
            "4.3.1.viewport",
            "p.4.3.1.viewport",
            CheckValue::Text("width=device-width, initial-scale=1".into()),
            Some(true),
            Some(r#"head > meta[name="viewport"]"#),
            Some("content"),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["testName"], "suite");
        let check = &json["pages"][0]["checks"][0];
        assert_eq!(check["type"], "4.3.1.viewport");
        assert_eq!(check["isScreenshoot"], false);
        assert_eq!(check["isPa11y"], false);
        assert_eq!(check["hasCondition"], true);
        assert_eq!(check["HTMLselector"], r#"head > meta[name="viewport"]"#);
    }
}
