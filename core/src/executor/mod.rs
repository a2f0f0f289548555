//! # Executor - Run Phase Sequencer
//!
//! Drives one run of learner code through a plugin.
//!
//! ## Phases
//!
//! Unbundled plugins run `Setup → Main → Tests`, each as a separate plugin
//! call sharing interpreter state. Bundled plugins get setup, learner code and
//! (when checking) test code spliced into one unit and run it as the single
//! `Bundled` phase.
//!
//! Every phase returns a tagged result that picks the next phase. On failure
//! the error is classified, logged and reported once; `execute` itself never
//! fails.
//!
//! ## Snapshots
//!
//! A compiled [`EditorSnapshot`] is taken as soon as the learner's code has
//! run, before any unbundled test phase. Every failure appends the error to
//! the IO event log and emits a `compiled = false` snapshot, so a failing
//! unbundled check produces both. The IO event log is cleared when the run
//! starts and drained into each snapshot.

#[cfg(test)]
mod tests;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::StopToken;
use crate::error::{RunError, FAILED_TEST_SUMMARY};
use crate::harness::TestHarness;
use crate::io_log::IoEventLog;
use crate::plugin::{ExecConfig, Input, InterpreterPlugin, Output, TestCallbacks};
use crate::terminal::{logged_output, FeedbackPrinter, Terminal};
use crate::types::{EditorSnapshot, Feedback, IoEventType, PredefinedCode, RunMode};

pub const RUNNING_TESTS_BANNER: &str = "\x1b[1mRunning tests...\r\n";

/* ===================== Collaborators ===================== */

/// Notifications a run produces for its owner.
pub trait RunEvents: Send + Sync {
    fn snapshot(&self, snapshot: EditorSnapshot);
    fn checker_result(&self, result: String);
    fn setup_failed(&self, message: String);
}

/// Everything a run needs from the session that owns it.
#[derive(Clone)]
pub struct RunContext {
    pub terminal: Arc<dyn Terminal>,
    pub io_log: Arc<IoEventLog>,
    pub stop: StopToken,
    pub exec: ExecConfig,
    pub events: Arc<dyn RunEvents>,
}

/// Code for one run, read once when the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunJob {
    pub code: String,
    pub setup: Option<String>,
    pub test: Option<String>,
    pub wrap_code_in_main: bool,
    pub mode: RunMode,
}

impl RunJob {
    pub fn new(code: impl Into<String>, predefined: &PredefinedCode, mode: RunMode) -> Self {
        Self {
            code: code.into(),
            setup: predefined.setup.clone(),
            test: predefined.test.clone(),
            wrap_code_in_main: predefined.wraps_in_main(),
            mode,
        }
    }
}

/* ===================== Outcome ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Main,
    Tests,
    Bundled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { checker_result: Option<String> },
    Failed { phase: Phase, error: RunError },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

enum Transition {
    Next(Phase),
    Finish(Option<String>),
}

/* ===================== Execute ===================== */

/// Run `job` through `plugin`. Always resolves.
pub async fn execute(ctx: &RunContext, plugin: &dyn InterpreterPlugin, job: &RunJob) -> RunOutcome {
    let run_id = Uuid::new_v4();
    let span = info_span!(
        "run",
        %run_id,
        language = %plugin.language(),
        check = job.mode.is_check()
    );
    Sequencer::new(ctx, plugin, job).run().instrument(span).await
}

struct Sequencer<'a> {
    ctx: &'a RunContext,
    plugin: &'a dyn InterpreterPlugin,
    job: &'a RunJob,
    output: Output,
    printer: FeedbackPrinter,
    harness: Arc<TestHarness>,
    final_output: String,
}

impl<'a> Sequencer<'a> {
    fn new(ctx: &'a RunContext, plugin: &'a dyn InterpreterPlugin, job: &'a RunJob) -> Self {
        let output = logged_output(ctx.terminal.clone(), ctx.io_log.clone());
        let printer = FeedbackPrinter::new(output.clone());
        let harness = Arc::new(TestHarness::new(printer.clone()));
        Self {
            ctx,
            plugin,
            job,
            output,
            printer,
            harness,
            final_output: String::new(),
        }
    }

    async fn run(mut self) -> RunOutcome {
        self.ctx.io_log.clear_events();
        self.ctx.terminal.clear();
        if self.is_check() {
            self.output.write(RUNNING_TESTS_BANNER);
        }

        let mut phase = if self.plugin.requires_bundled_code() {
            Phase::Bundled
        } else {
            Phase::Setup
        };

        let outcome = loop {
            debug!(?phase, "entering phase");
            let step = match phase {
                Phase::Setup => self.setup().await.map_err(RunError::into_content),
                Phase::Main => self.main().await,
                Phase::Tests => self.tests().await,
                Phase::Bundled => self.bundled().await,
            };
            match step {
                Ok(Transition::Next(next)) => phase = next,
                Ok(Transition::Finish(checker_result)) => {
                    if let Some(result) = &checker_result {
                        self.ctx.events.checker_result(result.clone());
                    }
                    break RunOutcome::Completed { checker_result };
                }
                Err(error) => {
                    self.fail(&error);
                    break RunOutcome::Failed { phase, error };
                }
            }
        };

        self.ctx.io_log.clear_events();
        info!(success = outcome.is_success(), "run finished");
        outcome
    }

    /* ===================== Phases ===================== */

    async fn setup(&mut self) -> Result<Transition, RunError> {
        let code = self.setup_code();
        self.plugin
            .run_setup_code(
                self.output.clone(),
                self.terminal_input(),
                &code,
                self.callbacks(),
            )
            .await?;
        Ok(Transition::Next(Phase::Main))
    }

    async fn main(&mut self) -> Result<Transition, RunError> {
        let code = self.learner_code();
        let (output, input) = if self.is_check() {
            (Output::discard(), self.test_input())
        } else {
            (self.output.clone(), self.terminal_input())
        };
        let final_output = self
            .plugin
            .run_code(&code, output, input, self.ctx.stop.clone(), self.ctx.exec)
            .await?;
        self.record_snapshot(true);

        if self.is_check() {
            self.final_output = final_output;
            Ok(Transition::Next(Phase::Tests))
        } else {
            Ok(Transition::Finish(None))
        }
    }

    async fn tests(&mut self) -> Result<Transition, RunError> {
        let test_code = self.job.test.clone().unwrap_or_default();
        let result = self
            .plugin
            .run_tests(
                &self.final_output,
                self.test_input(),
                self.ctx.stop.clone(),
                &test_code,
                self.callbacks(),
            )
            .await?;
        Ok(Transition::Finish(Some(result)))
    }

    async fn bundled(&mut self) -> Result<Transition, RunError> {
        let bundle = format!("{}\n{}", self.setup_code(), self.learner_code());
        if self.is_check() {
            let bundle = format!("{bundle}\n{}", self.job.test.as_deref().unwrap_or_default());
            let result = self
                .plugin
                .run_tests(
                    "",
                    self.test_input(),
                    self.ctx.stop.clone(),
                    &bundle,
                    self.callbacks(),
                )
                .await?;
            self.record_snapshot(true);
            Ok(Transition::Finish(Some(result)))
        } else {
            self.plugin
                .run_code(
                    &bundle,
                    self.output.clone(),
                    self.terminal_input(),
                    self.ctx.stop.clone(),
                    self.ctx.exec,
                )
                .await?;
            self.record_snapshot(true);
            Ok(Transition::Finish(None))
        }
    }

    /* ===================== Reporting ===================== */

    fn fail(&self, error: &RunError) {
        self.ctx
            .io_log
            .add_line(error.raw_message(), IoEventType::Error);
        self.record_snapshot(false);

        self.printer.print(&Feedback {
            succeeded: false,
            message: error.display_message(),
            is_test: error.is_test(),
        });
        match error {
            RunError::Test(_) => self.printer.print(&Feedback::fail(FAILED_TEST_SUMMARY)),
            RunError::Content(message) => {
                warn!(%message, "setup code failed");
                self.ctx.events.setup_failed(message.clone());
            }
            RunError::Runtime(_) => debug!(%error, "learner code failed"),
        }
    }

    fn record_snapshot(&self, compiled: bool) {
        let snapshot = EditorSnapshot {
            snapshot: self.job.code.clone(),
            compiled,
            timestamp: Utc::now(),
            io: self.ctx.io_log.take_events(),
        };
        self.ctx.events.snapshot(snapshot);
    }

    /* ===================== Plumbing ===================== */

    fn is_check(&self) -> bool {
        self.job.mode.is_check()
    }

    fn setup_code(&self) -> String {
        format!(
            "{}\n{}",
            self.plugin.testing_library(),
            self.job.setup.as_deref().unwrap_or_default()
        )
    }

    fn learner_code(&self) -> String {
        if self.job.wrap_code_in_main {
            self.plugin.wrap_in_main(&self.job.code, self.is_check())
        } else {
            self.job.code.clone()
        }
    }

    fn terminal_input(&self) -> Input {
        let terminal = self.ctx.terminal.clone();
        Input::new(move || terminal.input())
    }

    fn test_input(&self) -> Input {
        self.harness.input(self.plugin.test_input_mode())
    }

    fn callbacks(&self) -> Arc<dyn TestCallbacks> {
        self.harness.clone()
    }
}
