//! Grade code translation.
//!
//! The server stores grades as codes (`0`, `"2"`, ...). Everything the UI
//! shows goes through a [`GradeLookup`] first.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Label shown for a code the lookup does not know.
pub const UNKNOWN_GRADE_LABEL: &str = "N/A";

/// A raw grade code as delivered by the server.
///
/// Doubtfire sends integers, but older payloads carry strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum GradeCode {
    Number(i64),
    Text(String),
}

impl fmt::Display for GradeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeCode::Number(n) => write!(f, "{}", n),
            GradeCode::Text(s) => write!(f, "{}", s.trim()),
        }
    }
}

/// Read-only code → label mapping, injected into the engine.
pub trait GradeLookup: Send + Sync {
    fn label(&self, code: &str) -> Option<&str>;
}

/// Translate a raw code into its display label.
///
/// Unknown codes become [`UNKNOWN_GRADE_LABEL`] so an internal value never
/// reaches the screen.
pub fn translate(lookup: &dyn GradeLookup, code: &GradeCode) -> String {
    lookup
        .label(&code.to_string())
        .unwrap_or(UNKNOWN_GRADE_LABEL)
        .to_string()
}

/// Map-backed lookup, usually built from the `[grades]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeTable {
    labels: BTreeMap<String, String>,
}

impl GradeTable {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// The Doubtfire grade scale.
    pub fn doubtfire() -> Self {
        Self::new(default_grade_labels())
    }
}

impl Default for GradeTable {
    fn default() -> Self {
        Self::doubtfire()
    }
}

impl GradeLookup for GradeTable {
    fn label(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }
}

pub fn default_grade_labels() -> BTreeMap<String, String> {
    [
        ("-1", "Fail"),
        ("0", "Pass"),
        ("1", "Credit"),
        ("2", "Distinction"),
        ("3", "High Distinction"),
    ]
    .into_iter()
    .map(|(code, label)| (code.to_string(), label.to_string()))
    .collect()
}
