//! Test helpers shared by executor, sandbox and bridge tests
//!
//! `ScriptPlugin` interprets a tiny line-oriented language so orchestration
//! scenarios run without any real interpreter:
//!
//! ```text
//! x = 1              # integer, "string", input(), str(x) or another name
//! print(x)
//! raise Some message # runtime error
//! loop               # spin until a stop is requested
//! @inputs a,b        # seed test inputs
//! @regex ^42$        # install output pattern
//! @check [all]       # run the current test
//! @fail message      # test error
//! checkerResult = str(x)
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancellation::StopToken;
use crate::error::RunError;
use crate::executor::RunEvents;
use crate::plugin::{
    ExecConfig, Input, InputMode, InputReply, InterpreterPlugin, Output, TestCallbacks,
};
use crate::terminal::{QueryView, Terminal};
use crate::types::{EditorSnapshot, Language, QueryOutput};

/* ===================== Script Plugin ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginCall {
    Setup(String),
    Run(String),
    Tests { final_output: String, code: String },
}

#[derive(Default)]
struct ScriptState {
    globals: HashMap<String, String>,
    printed: String,
}

pub struct ScriptPlugin {
    language: Language,
    bundled: bool,
    input_mode: InputMode,
    state: Mutex<ScriptState>,
    calls: Mutex<Vec<PluginCall>>,
}

pub const TESTING_LIBRARY: &str = "# testing library";

impl ScriptPlugin {
    pub fn unbundled(language: Language) -> Self {
        Self {
            language,
            bundled: false,
            input_mode: InputMode::Suspending,
            state: Mutex::new(ScriptState::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn bundled(language: Language) -> Self {
        Self {
            bundled: true,
            input_mode: InputMode::Sync,
            ..Self::unbundled(language)
        }
    }

    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: PluginCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn reset(&self) {
        *self.state.lock().unwrap() = ScriptState::default();
    }

    async fn eval(&self, expr: &str, input: &Input, line_no: usize) -> Result<String, RunError> {
        let expr = expr.trim();
        if expr == "input()" {
            return input.read_line().await;
        }
        if let Some(inner) = expr.strip_prefix("str(").and_then(|e| e.strip_suffix(')')) {
            return self.lookup(inner.trim(), line_no);
        }
        if let Some(s) = expr.strip_prefix('"').and_then(|e| e.strip_suffix('"')) {
            return Ok(s.to_string());
        }
        if expr.parse::<i64>().is_ok() {
            return Ok(expr.to_string());
        }
        self.lookup(expr, line_no)
    }

    fn lookup(&self, name: &str, line_no: usize) -> Result<String, RunError> {
        self.state
            .lock()
            .unwrap()
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| RunError::runtime(format!("NameError: {name} on line {line_no}")))
    }

    async fn exec(
        &self,
        code: &str,
        output: &Output,
        input: &Input,
        stop: &StopToken,
        callbacks: Option<&Arc<dyn TestCallbacks>>,
        final_output: &str,
    ) -> Result<Option<String>, RunError> {
        let mut checker_result = None;
        for (idx, raw) in code.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(directive) = line.strip_prefix('@') {
                let callbacks = callbacks.ok_or_else(|| {
                    RunError::runtime(format!("directive outside tests on line {line_no}"))
                })?;
                let (name, arg) = directive.split_once(' ').unwrap_or((directive, ""));
                match name {
                    "inputs" => callbacks.set_test_inputs(Some(
                        arg.split(',').map(|s| s.trim().to_string()).collect(),
                    )),
                    "regex" => callbacks.set_test_regex(Some(arg))?,
                    "check" => {
                        let printed = if final_output.is_empty() {
                            self.state.lock().unwrap().printed.clone()
                        } else {
                            final_output.to_string()
                        };
                        callbacks.run_current_test(printed.trim_end(), arg == "all", None, None)?
                    }
                    "fail" => return Err(RunError::Test(format!("{arg} on line {line_no}"))),
                    other => {
                        return Err(RunError::runtime(format!("unknown directive {other}")))
                    }
                }
                continue;
            }

            if line == "loop" {
                loop {
                    if stop.should_stop(false) {
                        return Err(RunError::runtime("KeyboardInterrupt"));
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }

            if let Some(message) = line.strip_prefix("raise ") {
                return Err(RunError::runtime(message.to_string()));
            }
            if line == "raise" {
                return Err(RunError::Runtime(None));
            }

            if let Some(expr) = line.strip_prefix("print(").and_then(|l| l.strip_suffix(')')) {
                let value = self.eval(expr, input, line_no).await?;
                let text = format!("{value}\n");
                self.state.lock().unwrap().printed.push_str(&text);
                output.write(&text);
                continue;
            }

            if let Some((name, expr)) = line.split_once('=') {
                let name = name.trim();
                if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    let value = self.eval(expr, input, line_no).await?;
                    if name == "checkerResult" {
                        checker_result = Some(value.clone());
                    }
                    self.state
                        .lock()
                        .unwrap()
                        .globals
                        .insert(name.to_string(), value);
                    continue;
                }
            }

            return Err(RunError::runtime(format!(
                "SyntaxError: bad input on line {line_no}"
            )));
        }
        Ok(checker_result)
    }
}

#[async_trait]
impl InterpreterPlugin for ScriptPlugin {
    fn language(&self) -> Language {
        self.language
    }

    fn requires_bundled_code(&self) -> bool {
        self.bundled
    }

    fn test_input_mode(&self) -> InputMode {
        self.input_mode
    }

    fn testing_library(&self) -> &str {
        TESTING_LIBRARY
    }

    async fn run_setup_code(
        &self,
        output: Output,
        input: Input,
        code: &str,
        callbacks: Arc<dyn TestCallbacks>,
    ) -> Result<(), RunError> {
        self.record(PluginCall::Setup(code.to_string()));
        self.reset();
        let stop = StopToken::new();
        self.exec(code, &output, &input, &stop, Some(&callbacks), "")
            .await
            .map(|_| ())
    }

    async fn run_code(
        &self,
        code: &str,
        output: Output,
        input: Input,
        stop: StopToken,
        _config: ExecConfig,
    ) -> Result<String, RunError> {
        self.record(PluginCall::Run(code.to_string()));
        if self.bundled {
            self.reset();
        }
        self.state.lock().unwrap().printed.clear();
        self.exec(code, &output, &input, &stop, None, "").await?;
        Ok(self.state.lock().unwrap().printed.clone())
    }

    async fn run_tests(
        &self,
        final_output: &str,
        input: Input,
        stop: StopToken,
        test_code: &str,
        callbacks: Arc<dyn TestCallbacks>,
    ) -> Result<String, RunError> {
        self.record(PluginCall::Tests {
            final_output: final_output.to_string(),
            code: test_code.to_string(),
        });
        if self.bundled {
            self.reset();
        }
        let checker = self
            .exec(
                test_code,
                &Output::discard(),
                &input,
                &stop,
                Some(&callbacks),
                final_output,
            )
            .await?;
        Ok(checker.unwrap_or_default())
    }

    fn wrap_in_main(&self, code: &str, is_check: bool) -> String {
        let tag = if is_check { "check" } else { "run" };
        format!("# main {tag}\n{code}\n# end main")
    }
}

/* ===================== Recording Surfaces ===================== */

#[derive(Default)]
pub struct RecordingTerminal {
    written: Mutex<String>,
    lines: Mutex<VecDeque<String>>,
    clears: Mutex<usize>,
    interrupts: Mutex<usize>,
    wake: StopToken,
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(lines: &[&str]) -> Self {
        let terminal = Self::new();
        terminal
            .lines
            .lock()
            .unwrap()
            .extend(lines.iter().map(|l| l.to_string()));
        terminal
    }

    pub fn text(&self) -> String {
        self.written.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }

    pub fn interrupts(&self) -> usize {
        *self.interrupts.lock().unwrap()
    }
}

impl Terminal for RecordingTerminal {
    fn output(&self, text: &str) {
        self.written.lock().unwrap().push_str(text);
    }

    fn input(&self) -> InputReply {
        if let Some(line) = self.lines.lock().unwrap().pop_front() {
            return InputReply::Ready(Ok(line));
        }
        let wake = self.wake.clone();
        InputReply::deferred(async move {
            wake.stopped().await;
            wake.reset();
            Err(RunError::runtime("Input interrupted"))
        })
    }

    fn clear(&self) {
        self.written.lock().unwrap().clear();
        *self.clears.lock().unwrap() += 1;
    }

    fn interrupt_input(&self) {
        *self.interrupts.lock().unwrap() += 1;
        self.wake.request_stop();
    }
}

#[derive(Default)]
pub struct RecordingQueryView {
    shown: Mutex<Vec<QueryOutput>>,
    clears: Mutex<usize>,
}

impl RecordingQueryView {
    pub fn shown(&self) -> Vec<QueryOutput> {
        self.shown.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

impl QueryView for RecordingQueryView {
    fn show(&self, output: QueryOutput) {
        self.shown.lock().unwrap().push(output);
    }

    fn clear(&self) {
        *self.clears.lock().unwrap() += 1;
    }
}

/// Captures orchestrator notifications.
#[derive(Default)]
pub struct RecordingEvents {
    pub snapshots: Mutex<Vec<EditorSnapshot>>,
    pub checker_results: Mutex<Vec<String>>,
    pub setup_failures: Mutex<Vec<String>>,
}

impl RecordingEvents {
    pub fn snapshots(&self) -> Vec<EditorSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn checker_results(&self) -> Vec<String> {
        self.checker_results.lock().unwrap().clone()
    }

    pub fn setup_failures(&self) -> Vec<String> {
        self.setup_failures.lock().unwrap().clone()
    }
}

impl RunEvents for RecordingEvents {
    fn snapshot(&self, snapshot: EditorSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }

    fn checker_result(&self, result: String) {
        self.checker_results.lock().unwrap().push(result);
    }

    fn setup_failed(&self, message: String) {
        self.setup_failures.lock().unwrap().push(message);
    }
}
