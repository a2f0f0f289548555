//! Interpreter plugin contract
//!
//! The orchestrator never runs code itself. Each supported language is an
//! [`InterpreterPlugin`]; the orchestrator sequences its phases and feeds it
//! output, input, cancellation and test callbacks.

pub mod registry;

pub use registry::PluginRegistry;

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cancellation::StopToken;
use crate::error::RunError;
use crate::types::Language;

/* ===================== Output ===================== */

/// Where a plugin writes text.
#[derive(Clone)]
pub struct Output(Arc<dyn Fn(&str) + Send + Sync>);

impl Output {
    pub fn new(write: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(write))
    }

    /// Sink that drops everything (learner output during checks).
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn write(&self, text: &str) {
        (self.0)(text)
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Output")
    }
}

/* ===================== Input ===================== */

pub type InputFuture = Pin<Box<dyn Future<Output = Result<String, RunError>> + Send + 'static>>;

/// Answer to one input request: either immediate or deferred.
pub enum InputReply {
    Ready(Result<String, RunError>),
    Deferred(InputFuture),
}

impl InputReply {
    pub fn deferred(fut: impl Future<Output = Result<String, RunError>> + Send + 'static) -> Self {
        InputReply::Deferred(Box::pin(fut))
    }

    pub async fn resolve(self) -> Result<String, RunError> {
        match self {
            InputReply::Ready(result) => result,
            InputReply::Deferred(fut) => fut.await,
        }
    }

    /// The immediate answer, if there is one.
    pub fn now(self) -> Option<Result<String, RunError>> {
        match self {
            InputReply::Ready(result) => Some(result),
            InputReply::Deferred(_) => None,
        }
    }
}

/// Callback a plugin invokes whenever the learner's program asks for input.
#[derive(Clone)]
pub struct Input(Arc<dyn Fn() -> InputReply + Send + Sync>);

impl Input {
    pub fn new(request: impl Fn() -> InputReply + Send + Sync + 'static) -> Self {
        Self(Arc::new(request))
    }

    pub fn request(&self) -> InputReply {
        (self.0)()
    }

    pub async fn read_line(&self) -> Result<String, RunError> {
        self.request().resolve().await
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Input")
    }
}

/// Calling convention a plugin needs from the test input handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Input must be answered before the callback returns.
    Sync,
    /// Input may be answered later.
    Suspending,
}

/* ===================== Run Configuration ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Keep globals defined by setup code visible to learner code.
    pub retain_globals: bool,
    /// Wall-clock budget in milliseconds. Enforced by the plugin.
    pub exec_limit_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            retain_globals: true,
            exec_limit_ms: 30_000,
        }
    }
}

/* ===================== Test Callbacks ===================== */

/// Hooks test code uses to drive one check run.
pub trait TestCallbacks: Send + Sync {
    /// Seed the inputs handed out, in order, to the learner's input calls.
    fn set_test_inputs(&self, inputs: Option<Vec<String>>);

    /// Install (or with `None`, remove) the pattern the output must match.
    fn set_test_regex(&self, pattern: Option<&str>) -> Result<(), RunError>;

    /// Evaluate the configured checks against `current_output`.
    fn run_current_test(
        &self,
        current_output: &str,
        all_inputs_must_be_used: bool,
        success_message: Option<&str>,
        fail_message: Option<&str>,
    ) -> Result<(), RunError>;
}

/* ===================== Plugin ===================== */

#[async_trait]
pub trait InterpreterPlugin: Send + Sync {
    fn language(&self) -> Language;

    /// Whether setup, main and test code must be spliced into one unit.
    fn requires_bundled_code(&self) -> bool;

    fn test_input_mode(&self) -> InputMode;

    /// Preamble prepended to the author's setup code.
    fn testing_library(&self) -> &str;

    /// Run the author's setup code. A broken setup is a content error.
    async fn run_setup_code(
        &self,
        output: Output,
        input: Input,
        code: &str,
        callbacks: Arc<dyn TestCallbacks>,
    ) -> Result<(), RunError>;

    /// Run learner code, returning its final output.
    async fn run_code(
        &self,
        code: &str,
        output: Output,
        input: Input,
        stop: StopToken,
        config: ExecConfig,
    ) -> Result<String, RunError>;

    /// Run hidden test code against `final_output`, returning the checker result.
    async fn run_tests(
        &self,
        final_output: &str,
        input: Input,
        stop: StopToken,
        test_code: &str,
        callbacks: Arc<dyn TestCallbacks>,
    ) -> Result<String, RunError>;

    /// Make a designated entry function run automatically. Must be pure.
    fn wrap_in_main(&self, code: &str, is_check: bool) -> String;
}
