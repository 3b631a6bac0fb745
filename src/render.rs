//! HTML rendering of the accumulated report
//!
//! A pure function from the report model to markup: a page index, then one
//! section per page listing its checks. When `show_only_errors` is set, a
//! check renders only if it is file-kind or its condition is not a pass.

use crate::report::{CheckRecord, CheckValue, RunReport};

/// Render the full report document.
pub fn render_report(report: &RunReport) -> String {
    let mut html = String::with_capacity(16 * 1024);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>{} - UI Test</title>\n",
        escape(&report.test_name)
    ));
    html.push_str("<style>\n");
    html.push_str(STYLESHEET);
    html.push_str("</style>\n</head>\n<body>\n");

    // Page index.
    html.push_str("<nav><ul>\n");
    for page in &report.pages {
        html.push_str(&format!(
            "<li><a href=\"#{0}\">{0}</a></li>\n",
            escape(&page.id)
        ));
    }
    html.push_str("</ul></nav>\n");

    html.push_str(&format!("<h1>{}</h1>\n", escape(&report.test_name)));
    html.push_str(&format!(
        "<p class=\"generated\">Generated {}</p>\n",
        escape(&report.generated_at)
    ));
    if let Some(path) = &report.lighthouse {
        html.push_str(&format!(
            "<p><a href=\"{}\">Lighthouse report</a></p>\n",
            escape(path)
        ));
    }

    for page in &report.pages {
        html.push_str(&format!(
            "<h2 id=\"{0}\">Page: {0}</h2>\n<h3>Checks</h3>\n",
            escape(&page.id)
        ));
        if page.checks.is_empty() {
            html.push_str("<div class=\"card\">No checks were made.</div>\n");
            continue;
        }
        html.push_str("<ul>\n");
        for check in &page.checks {
            if report.show_only_errors && !check.is_file && check.condition == Some(true) {
                continue;
            }
            render_check(&mut html, check);
        }
        html.push_str("</ul>\n<hr class=\"page-break\">\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_check(html: &mut String, check: &CheckRecord) {
    html.push_str("<li>\n");
    html.push_str(&format!("<b>{}</b><br>\n", escape(&check.check_type)));

    if check.is_file {
        if let CheckValue::File(path) = &check.value {
            if check.is_screenshot {
                html.push_str(&format!(
                    "<a href=\"{0}\"><img class=\"thumb\" src=\"{0}\" alt=\"{1}\"> {1}</a><br>\n",
                    escape(path),
                    escape(&check.key)
                ));
            } else {
                html.push_str(&format!(
                    "<a href=\"{}\">{}</a><br>\n",
                    escape(path),
                    escape(&check.key)
                ));
            }
        }
    } else if check.is_a11y_issues {
        if let CheckValue::Issues(issues) = &check.value {
            for issue in issues {
                html.push_str("<div class=\"issue\">\n");
                let type_code = issue.type_code.to_string();
                for (label, text) in [
                    ("type", issue.issue_type.as_str()),
                    ("typeCode", type_code.as_str()),
                    ("code", issue.code.as_str()),
                    ("message", issue.message.as_str()),
                ] {
                    html.push_str(&format!(
                        "<div class=\"row\"><b>{}</b> {}</div>\n",
                        label,
                        escape(text)
                    ));
                }
                html.push_str(&format!(
                    "<div class=\"row\"><b>context</b> <pre><code>{}</code></pre></div>\n",
                    escape(&issue.context)
                ));
                html.push_str(&format!(
                    "<div class=\"row\"><b>selector</b> <pre><code>{}</code></pre></div>\n",
                    escape(&issue.selector)
                ));
                html.push_str("</div>\n<hr>\n");
            }
        }
    } else {
        let value = match &check.value {
            CheckValue::Text(s) => escape(s),
            CheckValue::Count(n) => n.to_string(),
            CheckValue::File(p) => escape(p),
            CheckValue::Issues(_) => String::new(),
        };
        html.push_str(&format!("Value: <b>{value}</b><br>\n"));
    }

    if check.has_selector {
        if let Some(selector) = &check.selector {
            html.push_str(&format!(
                "Selector: <span class=\"code\">{}</span><br>\n",
                escape(selector)
            ));
        }
    }
    if check.has_attribute {
        if let Some(attribute) = &check.attribute {
            html.push_str(&format!(
                "Attribute: <span class=\"code\">{}</span><br>\n",
                escape(attribute)
            ));
        }
    }
    if check.has_condition {
        let (class, label) = match check.condition {
            Some(true) => ("pass", "Pass"),
            _ => ("fail", "Fail"),
        };
        html.push_str(&format!(
            "Condition: <b class=\"condition-{class}\">{label}</b>\n"
        ));
    }
    html.push_str("</li>\n");
}

/// Escape text for safe interpolation into HTML.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLESHEET: &str = "\
body{max-width:60em;padding:1em;margin:auto;font:1em/1.6 sans-serif}\
pre{overflow:auto;padding:1em;border:solid #eee}\
.card{padding:1em;border:solid #eee}\
.thumb{width:100px}\
.code{font-family:monospace}\
.condition-pass{background-color:green;color:white;padding:0 .3em}\
.condition-fail{background-color:red;color:white;padding:0 .3em}\
.generated{color:#666}\
.issue .row{margin:.2em 0}\
td,th{padding:1em;text-align:left;border-bottom:solid #eee}\
@media print{.page-break{page-break-after:always}}\
";
