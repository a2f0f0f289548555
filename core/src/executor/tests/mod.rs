//! Executor scenario tests
//!
//! Each test drives `execute` with the scripted plugin and inspects what the
//! run wrote to the terminal, the snapshots it produced and the notifications
//! it raised.


use std::sync::Arc;

use super::{execute, RunContext, RunJob, RunOutcome};
use crate::cancellation::StopToken;
use crate::io_log::IoEventLog;
use crate::plugin::ExecConfig;
use crate::test_helpers::{RecordingEvents, RecordingTerminal, ScriptPlugin};
use crate::types::{Language, PredefinedCode, RunMode};

pub(super) struct Rig {
    pub terminal: Arc<RecordingTerminal>,
    pub events: Arc<RecordingEvents>,
    pub io_log: Arc<IoEventLog>,
    pub ctx: RunContext,
}

pub(super) fn rig() -> Rig {
    rig_with_terminal(RecordingTerminal::new())
}

pub(super) fn rig_with_terminal(terminal: RecordingTerminal) -> Rig {
    let terminal = Arc::new(terminal);
    let events = Arc::new(RecordingEvents::default());
    let io_log = Arc::new(IoEventLog::new());
    let ctx = RunContext {
        terminal: terminal.clone(),
        io_log: io_log.clone(),
        stop: StopToken::new(),
        exec: ExecConfig::default(),
        events: events.clone(),
    };
    Rig {
        terminal,
        events,
        io_log,
        ctx,
    }
}

pub(super) fn predefined(setup: Option<&str>, test: Option<&str>) -> PredefinedCode {
    PredefinedCode {
        language: Language::Python,
        code: String::new(),
        setup: setup.map(str::to_string),
        test: test.map(str::to_string),
        ..Default::default()
    }
}

pub(super) async fn run(
    rig: &Rig,
    plugin: &ScriptPlugin,
    code: &str,
    predefined: &PredefinedCode,
    mode: RunMode,
) -> RunOutcome {
    let job = RunJob::new(code, predefined, mode);
    execute(&rig.ctx, plugin, &job).await
}
