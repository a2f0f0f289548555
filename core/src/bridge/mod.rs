//! Host messaging bridge
//!
//! Messages are JSON objects discriminated by `"type"` and addressed with the
//! session `"uid"`. Incoming messages for other sessions are ignored; outgoing
//! ones are stamped with this session's uid.

pub mod transport;

#[cfg(test)]
mod tests;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::sandbox::{RunAttempt, Sandbox};
use crate::types::{EditorChange, EditorSnapshot, Feedback, Language, RunMode};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed host message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("host message is not a JSON object")]
    NotAnObject,
}

/* ===================== Wire Messages ===================== */

/// Payload of an INITIALISE message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialiseParams {
    #[serde(default)]
    pub code: String,
    pub setup: Option<String>,
    pub test: Option<String>,
    pub wrap_code_in_main: Option<bool>,
    pub data_url: Option<String>,
    /// Missing languages run as unknown.
    pub language: Option<Language>,
    pub log_changes: Option<bool>,
    pub fullscreen: Option<bool>,
}

/// Host → core.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    Initialise(InitialiseParams),
    Feedback {
        succeeded: bool,
        message: String,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Logs,
    #[serde(rename_all = "camelCase")]
    ToggleRun {
        disable_run: bool,
    },
    #[serde(rename_all = "camelCase")]
    ToggleReadOnlyCode {
        read_only_code: bool,
    },
    /// Headless stand-in for the run and check buttons.
    Run {
        #[serde(default)]
        check: bool,
    },
}

/// Core → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CoreMessage {
    ConfirmInitialised,
    Ping {
        timestamp: i64,
    },
    Logs {
        changes: Vec<EditorChange>,
        snapshots: Vec<EditorSnapshot>,
    },
    /// A plugin run has finished.
    ToggleRun,
    Resize {
        height: u32,
    },
    Checker {
        result: String,
    },
    SetupFail {
        message: String,
    },
}

/* ===================== Bridge ===================== */

/// Decodes host messages and applies them to one [`Sandbox`].
#[derive(Debug, Clone)]
pub struct Bridge {
    uid: String,
    sandbox: Arc<Sandbox>,
}

impl Bridge {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            uid: sandbox.session_id().to_string(),
            sandbox,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }

    /// Parse one wire message. `Ok(None)` means it was addressed elsewhere.
    pub fn decode(&self, line: &str) -> Result<Option<HostMessage>, BridgeError> {
        let Value::Object(mut fields) = serde_json::from_str::<Value>(line)? else {
            return Err(BridgeError::NotAnObject);
        };
        match fields.remove("uid") {
            Some(Value::String(uid)) if uid == self.uid => {}
            other => {
                debug!(uid = ?other, "ignoring message for another session");
                return Ok(None);
            }
        }
        Ok(Some(serde_json::from_value(Value::Object(fields))?))
    }

    /// Serialise an outgoing message, stamped with the session uid.
    pub fn encode(&self, message: &CoreMessage) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(message)?;
        if let Value::Object(fields) = &mut value {
            fields.insert("uid".to_string(), Value::String(self.uid.clone()));
        }
        serde_json::to_string(&value)
    }

    pub fn handle_line(
        &self,
        line: &str,
        runs: &mut JoinSet<RunAttempt>,
    ) -> Result<(), BridgeError> {
        if let Some(message) = self.decode(line)? {
            self.dispatch(message, runs);
        }
        Ok(())
    }

    /// Apply one host message. Runs are spawned into `runs` so later
    /// messages, including stop requests, are handled while they execute.
    pub fn dispatch(&self, message: HostMessage, runs: &mut JoinSet<RunAttempt>) {
        match message {
            HostMessage::Initialise(params) => self.sandbox.initialise(params),
            HostMessage::Feedback { succeeded, message } => {
                self.sandbox.print_feedback(&Feedback {
                    succeeded,
                    message,
                    is_test: false,
                });
            }
            HostMessage::Ping { .. } => self.sandbox.send(CoreMessage::Ping {
                timestamp: Utc::now().timestamp_millis(),
            }),
            HostMessage::Logs => {
                let (changes, snapshots) = self.sandbox.take_logs();
                self.sandbox.send(CoreMessage::Logs { changes, snapshots });
            }
            HostMessage::ToggleRun { disable_run } => self.sandbox.set_run_disabled(disable_run),
            HostMessage::ToggleReadOnlyCode { read_only_code } => {
                self.sandbox.set_read_only(read_only_code)
            }
            HostMessage::Run { check } => {
                let mode = if check { RunMode::Check } else { RunMode::Run };
                info!(?mode, "run requested by host");
                let sandbox = self.sandbox.clone();
                runs.spawn(async move { sandbox.run(mode).await });
            }
        }
    }
}
