//! # Sandbox - Session Context
//!
//! A [`Sandbox`] is one embedded editor session. It owns the predefined code,
//! the editor buffer, the run state machine, the stop token, the IO event log
//! and the change/snapshot logs, and it is the only thing that talks to the
//! host channel. Several sandboxes can live in one process.
//!
//! ## Run state
//!
//! `stopped → running | checking → stopped`. A run only starts from
//! `stopped`; asking for a run while one is active is a stop request.
//!
//! Every INITIALISE starts a new generation. A run still finishing from an
//! earlier generation can no longer record snapshots or report to the host.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::bridge::{CoreMessage, InitialiseParams};
use crate::cancellation::StopToken;
use crate::executor::{self, RunContext, RunEvents, RunJob, RunOutcome};
use crate::io_log::IoEventLog;
use crate::plugin::{ExecConfig, PluginRegistry};
use crate::query::{QueryRunner, SqliteQueryRunner};
use crate::terminal::{
    logged_output, FeedbackPrinter, QueryView, StderrQueryView, StderrTerminal, Terminal,
};
use crate::types::{
    Controls, EditorChange, EditorSnapshot, Feedback, Language, PredefinedCode, QueryOutput,
    RunMode, RunState,
};

pub const UNKNOWN_LANGUAGE: &str = "Unknown programming language - unable to run code!";

/// What a call to [`Sandbox::run`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAttempt {
    Executed(RunOutcome),
    Queried(QueryOutput),
    /// A run was already active; the call was turned into a stop request.
    StopRequested,
    NotLoaded,
    /// Run mode while the host has disabled the run control.
    Disabled,
    UnknownLanguage,
}

#[derive(Debug)]
struct SessionState {
    run_state: RunState,
    generation: u64,
    loaded: bool,
    predefined: PredefinedCode,
    code: String,
    record_logs: bool,
    fullscreen: bool,
    run_disabled: bool,
    read_only: bool,
    change_log: Vec<EditorChange>,
    snapshot_log: Vec<EditorSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        let predefined = PredefinedCode::loading();
        Self {
            run_state: RunState::Stopped,
            generation: 0,
            loaded: false,
            code: predefined.code.clone(),
            predefined,
            record_logs: false,
            fullscreen: false,
            run_disabled: false,
            read_only: false,
            change_log: Vec::new(),
            snapshot_log: Vec::new(),
        }
    }
}

pub struct Sandbox {
    session_id: String,
    registry: PluginRegistry,
    query_runner: Arc<dyn QueryRunner>,
    terminal: Arc<dyn Terminal>,
    query_view: Arc<dyn QueryView>,
    outbox: UnboundedSender<CoreMessage>,
    exec: ExecConfig,
    stop: StopToken,
    io_log: Arc<IoEventLog>,
    state: Mutex<SessionState>,
}

impl Sandbox {
    pub fn builder(
        session_id: impl Into<String>,
        outbox: UnboundedSender<CoreMessage>,
    ) -> SandboxBuilder {
        SandboxBuilder {
            session_id: session_id.into(),
            outbox,
            registry: PluginRegistry::new(),
            query_runner: None,
            terminal: None,
            query_view: None,
            exec: ExecConfig::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn send(&self, message: CoreMessage) {
        if self.outbox.send(message).is_err() {
            debug!(session = %self.session_id, "host channel closed, dropping message");
        }
    }

    /* ===================== Host Commands ===================== */

    /// Apply an INITIALISE message and acknowledge it.
    pub fn initialise(&self, params: InitialiseParams) {
        if self.run_state() != RunState::Stopped {
            self.stop();
        }

        let language = params.language.unwrap_or(Language::Unknown);
        {
            let mut state = self.state();
            state.predefined = PredefinedCode {
                language,
                code: params.code.clone(),
                setup: Some(params.setup.unwrap_or_default()),
                test: params.test,
                wrap_code_in_main: params.wrap_code_in_main,
                data_url: params.data_url,
            };
            state.code = params.code;
            state.record_logs = params.log_changes.unwrap_or(false);
            state.fullscreen = params.fullscreen.unwrap_or(false);
            state.loaded = true;
            state.generation += 1;
            state.change_log.clear();
            state.snapshot_log.clear();
        }
        self.io_log.clear_events();
        self.terminal.clear();
        self.query_view.clear();

        info!(session = %self.session_id, %language, "sandbox initialised");
        self.send(CoreMessage::ConfirmInitialised);
    }

    /// Start a run of the current editor buffer.
    pub async fn run(self: &Arc<Self>, mode: RunMode) -> RunAttempt {
        let (predefined, code, generation) = {
            let mut state = self.state();
            if !state.loaded {
                return RunAttempt::NotLoaded;
            }
            if state.run_state != RunState::Stopped {
                drop(state);
                self.stop();
                return RunAttempt::StopRequested;
            }
            if mode == RunMode::Run && state.run_disabled {
                return RunAttempt::Disabled;
            }
            self.stop.reset();

            let language = state.predefined.language;
            if language == Language::Sql {
                state.run_state = RunState::Running;
            } else if self.registry.get(language).is_some() {
                state.run_state = mode.active_state();
            }
            (state.predefined.clone(), state.code.clone(), state.generation)
        };

        if predefined.language == Language::Sql {
            let output = self.run_query(&code, predefined.data_url.as_deref()).await;
            self.state().run_state = RunState::Stopped;
            return RunAttempt::Queried(output);
        }

        let Some(plugin) = self.registry.get(predefined.language) else {
            warn!(language = %predefined.language, "no plugin registered");
            self.send(CoreMessage::SetupFail {
                message: UNKNOWN_LANGUAGE.to_string(),
            });
            return RunAttempt::UnknownLanguage;
        };

        let ctx = RunContext {
            terminal: self.terminal.clone(),
            io_log: self.io_log.clone(),
            stop: self.stop.clone(),
            exec: self.exec,
            events: Arc::new(RunScope {
                sandbox: self.clone(),
                generation,
            }),
        };
        let job = RunJob::new(code, &predefined, mode);
        let outcome = executor::execute(&ctx, plugin.as_ref(), &job).await;

        self.state().run_state = RunState::Stopped;
        self.send(CoreMessage::ToggleRun);
        RunAttempt::Executed(outcome)
    }

    async fn run_query(&self, query: &str, data_url: Option<&str>) -> QueryOutput {
        let output = match self.query_runner.run_query(query, data_url).await {
            Ok(result) => QueryOutput::from(result),
            Err(err) => {
                debug!(error = %err, "query failed");
                QueryOutput::failed(err.to_string())
            }
        };
        self.query_view.show(output.clone());
        output
    }

    /// Request that the active run stops.
    pub fn stop(&self) {
        self.stop.request_stop();
        if self.run_state() != RunState::Stopped {
            info!(session = %self.session_id, "stop requested");
            self.terminal.interrupt_input();
        }
    }

    /// Replace the editor buffer. Returns `false` when the code is read-only.
    pub fn update_code(&self, code: impl Into<String>, change: Option<EditorChange>) -> bool {
        let mut state = self.state();
        if state.read_only {
            return false;
        }
        state.code = code.into();
        if let (true, Some(change)) = (state.record_logs, change) {
            state.change_log.push(change);
        }
        true
    }

    /// Drain the change and snapshot logs.
    pub fn take_logs(&self) -> (Vec<EditorChange>, Vec<EditorSnapshot>) {
        let mut state = self.state();
        (
            std::mem::take(&mut state.change_log),
            std::mem::take(&mut state.snapshot_log),
        )
    }

    pub fn set_run_disabled(&self, disabled: bool) {
        self.state().run_disabled = disabled;
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state().read_only = read_only;
    }

    pub fn notify_resize(&self, height: u32) {
        if self.state().loaded {
            self.send(CoreMessage::Resize { height });
        }
    }

    /// Print a feedback line to the terminal.
    pub fn print_feedback(&self, feedback: &Feedback) {
        FeedbackPrinter::new(logged_output(self.terminal.clone(), self.io_log.clone()))
            .print(feedback);
    }

    /* ===================== Queries ===================== */

    pub fn controls(&self) -> Controls {
        let state = self.state();
        Controls {
            run_enabled: state.loaded
                && state.run_state == RunState::Stopped
                && !state.run_disabled,
            check_visible: state.predefined.has_tests(),
            check_enabled: state.loaded && state.run_state != RunState::Running,
            check_shows_stop: state.run_state == RunState::Checking,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn run_state(&self) -> RunState {
        self.state().run_state
    }

    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state().fullscreen
    }

    pub fn is_read_only(&self) -> bool {
        self.state().read_only
    }

    pub fn code(&self) -> String {
        self.state().code.clone()
    }

    pub fn predefined(&self) -> PredefinedCode {
        self.state().predefined.clone()
    }
}

/// Event sink for one run, bound to the generation it started in.
struct RunScope {
    sandbox: Arc<Sandbox>,
    generation: u64,
}

impl RunScope {
    fn is_current(&self) -> bool {
        let current = self.sandbox.state().generation == self.generation;
        if !current {
            debug!(session = %self.sandbox.session_id, "dropping event from a replaced session");
        }
        current
    }
}

impl RunEvents for RunScope {
    fn snapshot(&self, snapshot: EditorSnapshot) {
        let mut state = self.sandbox.state();
        if state.generation == self.generation && state.record_logs {
            state.snapshot_log.push(snapshot);
        }
    }

    fn checker_result(&self, result: String) {
        if self.is_current() {
            self.sandbox.send(CoreMessage::Checker { result });
        }
    }

    fn setup_failed(&self, message: String) {
        if self.is_current() {
            self.sandbox.send(CoreMessage::SetupFail { message });
        }
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("session_id", &self.session_id)
            .field("registry", &self.registry)
            .field("run_state", &self.run_state())
            .finish_non_exhaustive()
    }
}

/* ===================== Builder ===================== */

pub struct SandboxBuilder {
    session_id: String,
    outbox: UnboundedSender<CoreMessage>,
    registry: PluginRegistry,
    query_runner: Option<Arc<dyn QueryRunner>>,
    terminal: Option<Arc<dyn Terminal>>,
    query_view: Option<Arc<dyn QueryView>>,
    exec: ExecConfig,
}

impl SandboxBuilder {
    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn query_runner(mut self, runner: Arc<dyn QueryRunner>) -> Self {
        self.query_runner = Some(runner);
        self
    }

    pub fn terminal(mut self, terminal: Arc<dyn Terminal>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn query_view(mut self, view: Arc<dyn QueryView>) -> Self {
        self.query_view = Some(view);
        self
    }

    pub fn exec_config(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }

    /// Surfaces left unset default to stderr, the query runner to SQLite.
    pub fn build(self) -> Arc<Sandbox> {
        Arc::new(Sandbox {
            session_id: self.session_id,
            registry: self.registry,
            query_runner: self
                .query_runner
                .unwrap_or_else(|| Arc::new(SqliteQueryRunner::new())),
            terminal: self.terminal.unwrap_or_else(|| Arc::new(StderrTerminal)),
            query_view: self.query_view.unwrap_or_else(|| Arc::new(StderrQueryView)),
            outbox: self.outbox,
            exec: self.exec,
            stop: StopToken::new(),
            io_log: Arc::new(IoEventLog::new()),
            state: Mutex::new(SessionState::default()),
        })
    }
}
