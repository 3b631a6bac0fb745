//! Design-system conformance audit harness
//!
//! This crate drives a real browser through a service's pages and checks
//! each one against a declarative battery of design-system rules:
//! - Captures full-page screenshots at several widths plus the `<head>` markup
//! - Runs attribute/title/count/computed-style checks from a built-in registry
//! - Runs an external accessibility audit (pa11y) per page
//! - Accumulates everything into one self-contained HTML + JSON report
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     AuditSession (Rust)                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  AuditSession                                                │
//! │    ├── start_run(name)         Idle -> Running               │
//! │    ├── goto(url)                                             │
//! │    ├── run_page_checks(page)   screenshots, head, battery,   │
//! │    │                           a11y audit, flow snapshot     │
//! │    ├── write_flow_report(file)                               │
//! │    └── end_run()               Running -> Ended              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  CheckRegistry -> CheckRunner -> RunReport -> render_report  │
//! │    descriptors     dispatch on    append-only    pure HTML   │
//! │    (id, kind,      CheckKind,     accumulator    builder     │
//! │     condition)     skip/measure                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Capability traits (swappable with in-memory fakes)          │
//! │    ├── PageDriver            <- PlaywrightDriver (Node child)│
//! │    ├── AccessibilityAuditor  <- Pa11yCli (npx pa11y)         │
//! │    ├── FlowAuditor                                           │
//! │    └── Reachability          <- UrlProber (reqwest)          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod checks;
pub mod driver;
pub mod error;
pub mod playwright;
pub mod render;
pub mod report;
pub mod runner;
pub mod session;

pub use audit::Pa11yCli;
pub use checks::{CheckDescriptor, CheckKind, CheckRegistry, Condition, Reachability, Viewport};
pub use driver::{AccessibilityAuditor, AccessibilityIssue, AuditOptions, FlowAuditor, PageDriver, WaitPolicy};
pub use error::{AuditError, AuditResult};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
pub use render::render_report;
pub use report::{CheckRecord, CheckValue, PageReport, RunReport};
pub use session::{AuditSession, SessionConfig};
