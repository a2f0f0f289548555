use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/* ===================== Languages ===================== */

/// Language of the predefined code block.
///
/// Hosts may send languages this build knows nothing about; those decode to
/// `Unknown` so the failure is reported at run time rather than dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Javascript,
    Sql,
    #[serde(other)]
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ===================== IO Events ===================== */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IoEventType {
    Output,
    Error,
}

/// One line of run output or error text, in the order it was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IoEvent {
    pub text: String,
    #[serde(rename = "type")]
    pub event_type: IoEventType,
    pub time: DateTime<Utc>,
}

/* ===================== Feedback ===================== */

/// A pass/fail line for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub succeeded: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_test: bool,
}

impl Feedback {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
            is_test: false,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            is_test: false,
        }
    }

    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }
}

/* ===================== Logs ===================== */

/// Immutable record of one run attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub snapshot: String,
    pub compiled: bool,
    pub timestamp: DateTime<Utc>,
    pub io: Vec<IoEvent>,
}

/// Editor change record. The editor widget owns its shape; the core only
/// buffers and forwards it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EditorChange(pub JsonValue);

/* ===================== Predefined Code ===================== */

/// Content-author supplied code block, replaced wholesale on every initialise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedCode {
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap_code_in_main: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

impl PredefinedCode {
    /// Placeholder shown before the host has initialised the sandbox.
    pub fn loading() -> Self {
        Self {
            language: Language::Python,
            code: "# Loading...".to_string(),
            ..Default::default()
        }
    }

    pub fn has_tests(&self) -> bool {
        self.test.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn wraps_in_main(&self) -> bool {
        self.wrap_code_in_main.unwrap_or(false)
    }
}

/* ===================== Run State ===================== */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Checking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Run,
    Check,
}

impl RunMode {
    pub fn is_check(&self) -> bool {
        matches!(self, RunMode::Check)
    }

    pub fn active_state(&self) -> RunState {
        match self {
            RunMode::Run => RunState::Running,
            RunMode::Check => RunState::Checking,
        }
    }
}

/// Which controls the presentation layer should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub run_enabled: bool,
    pub check_visible: bool,
    pub check_enabled: bool,
    /// The check button doubles as a stop button while tests run.
    pub check_shows_stop: bool,
}

/* ===================== Query Output ===================== */

/// Raw result of a SQL query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Vec<String>>,
    pub column_names: Vec<String>,
    pub changes: usize,
}

/// What the table view renders after a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    pub rows: Vec<Vec<String>>,
    pub column_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl From<QueryResult> for QueryOutput {
    fn from(result: QueryResult) -> Self {
        let message = if result.rows.is_empty() {
            format!(
                "Query succeeded, {} row{} affected",
                result.changes,
                plural(result.changes)
            )
        } else {
            format!(
                "Query returned {} row{}",
                result.rows.len(),
                plural(result.rows.len())
            )
        };
        Self {
            rows: result.rows,
            column_names: result.column_names,
            error: None,
            message: Some(message),
        }
    }
}

impl QueryOutput {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Plain-text rendering for headless surfaces.
    pub fn render_text(&self) -> String {
        if let Some(error) = &self.error {
            return format!("{error}\n");
        }
        let mut out = String::new();
        if !self.column_names.is_empty() {
            out.push_str(&self.column_names.join(" | "));
            out.push('\n');
        }
        for row in &self.rows {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
        if let Some(message) = &self.message {
            out.push_str(message);
            out.push('\n');
        }
        out
    }
}
