//! Run error classification
//!
//! Every failure surfaced by a run falls into one of three kinds, and each kind
//! is reported differently:
//!
//! - [`RunError::Content`]: the content author's setup code is broken. Sent to
//!   the host as `SETUP_FAIL`.
//! - [`RunError::Test`]: a hidden test rejected the learner's program.
//! - [`RunError::Runtime`]: anything else raised while running code.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

/// Shown when an error carries no text of its own.
pub const UNDEFINED_ERROR: &str =
    "Undefined error (sorry, this particular code snippet may be broken)";

/// Secondary line printed after every test failure.
pub const FAILED_TEST_SUMMARY: &str = "Your code failed at least one test!";

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum RunError {
    #[error("{0}")]
    Content(String),

    #[error("{0}")]
    Test(String),

    #[error("{}", .0.as_deref().unwrap_or(UNDEFINED_ERROR))]
    Runtime(Option<String>),
}

impl RunError {
    pub fn runtime(message: impl Into<String>) -> Self {
        RunError::Runtime(Some(message.into()))
    }

    pub fn is_test(&self) -> bool {
        matches!(self, RunError::Test(_))
    }

    pub fn is_content(&self) -> bool {
        matches!(self, RunError::Content(_))
    }

    /// Raw error text, as recorded in the IO event log.
    pub fn raw_message(&self) -> String {
        self.to_string()
    }

    /// Text shown to the learner.
    ///
    /// Test errors lose their first `on line N` fragment: those line numbers
    /// point into generated test source the learner never sees.
    pub fn display_message(&self) -> String {
        match self {
            RunError::Test(message) => strip_line_reference(message),
            other => other.to_string(),
        }
    }

    /// Reinterpret a setup-phase failure as the author's fault.
    pub fn into_content(self) -> Self {
        match self {
            RunError::Content(_) => self,
            other => RunError::Content(other.to_string()),
        }
    }
}

fn line_reference() -> &'static Regex {
    static LINE_REF: OnceLock<Regex> = OnceLock::new();
    LINE_REF.get_or_init(|| Regex::new(r" on line \d+").expect("static pattern"))
}

/// Remove the first ` on line <n>` fragment from `message`.
pub fn strip_line_reference(message: &str) -> String {
    line_reference().replace(message, "").into_owned()
}
