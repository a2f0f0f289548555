//! Test harness for check runs
//!
//! One [`TestHarness`] exists per run. It hands seeded inputs to the learner's
//! program in their original order, counts how many input calls were made, and
//! evaluates the checks that test code asks for.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::RunError;
use crate::plugin::{Input, InputMode, InputReply, TestCallbacks};
use crate::terminal::FeedbackPrinter;
use crate::types::Feedback;

pub const NO_INPUT_EXPECTED: &str =
    "Your program asked for input when none was expected, so we couldn't give it a valid input...";
pub const UNEXPECTED_OUTPUT: &str = "Your program produced unexpected output...";
pub const NOT_ENOUGH_INPUTS: &str = "Your program didn't call input() enough times...";
pub const TOO_MANY_INPUTS: &str = "Your program called input() too many times...";
pub const OUTPUT_LOOKS_GOOD: &str = "The output of your program looks good";
pub const CORRECT_INPUT_COUNT: &str = "Your program accepted the correct number of inputs";
pub const TEST_PASSED: &str = "Test passed";

/// Ephemeral state for one check run.
#[derive(Debug, Default)]
struct TestSession {
    inputs: VecDeque<String>,
    /// Seeded count minus input calls made. Negative once the program
    /// asked for more inputs than were seeded.
    remaining: i64,
    pattern: Option<Regex>,
}

#[derive(Debug)]
pub struct TestHarness {
    session: Mutex<TestSession>,
    printer: FeedbackPrinter,
}

impl TestHarness {
    pub fn new(printer: FeedbackPrinter) -> Self {
        Self {
            session: Mutex::new(TestSession::default()),
            printer,
        }
    }

    fn session(&self) -> MutexGuard<'_, TestSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer one input call with the next seeded input.
    ///
    /// The call is counted even when no input is left.
    pub fn next_input(&self) -> Result<String, RunError> {
        let mut session = self.session();
        session.remaining -= 1;
        session
            .inputs
            .pop_front()
            .ok_or_else(|| RunError::Test(NO_INPUT_EXPECTED.to_string()))
    }

    /// Input callback using the calling convention `mode` asks for.
    pub fn input(self: &Arc<Self>, mode: InputMode) -> Input {
        let harness = Arc::clone(self);
        Input::new(move || {
            let result = harness.next_input();
            match mode {
                InputMode::Sync => InputReply::Ready(result),
                InputMode::Suspending => InputReply::deferred(async move { result }),
            }
        })
    }

    pub fn remaining_inputs(&self) -> i64 {
        self.session().remaining
    }

    fn pass(&self, message: &str) {
        self.printer.print(&Feedback::pass(message).test());
    }
}

impl TestCallbacks for TestHarness {
    fn set_test_inputs(&self, inputs: Option<Vec<String>>) {
        let mut session = self.session();
        session.inputs = inputs.unwrap_or_default().into();
        session.remaining = session.inputs.len() as i64;
    }

    fn set_test_regex(&self, pattern: Option<&str>) -> Result<(), RunError> {
        let compiled = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(
                Regex::new(p)
                    .map_err(|e| RunError::Content(format!("Invalid test pattern {p:?}: {e}")))?,
            ),
            None => None,
        };
        self.session().pattern = compiled;
        Ok(())
    }

    fn run_current_test(
        &self,
        current_output: &str,
        all_inputs_must_be_used: bool,
        success_message: Option<&str>,
        fail_message: Option<&str>,
    ) -> Result<(), RunError> {
        let (matched, remaining) = {
            let session = self.session();
            let matched = session
                .pattern
                .as_ref()
                .map(|pattern| pattern.is_match(current_output));
            (matched, session.remaining)
        };
        let fail = |default: &str| RunError::Test(fail_message.unwrap_or(default).to_string());

        match matched {
            Some(false) => return Err(fail(UNEXPECTED_OUTPUT)),
            Some(true) if success_message.is_none() => self.pass(OUTPUT_LOOKS_GOOD),
            _ => {}
        }

        if all_inputs_must_be_used {
            if remaining > 0 {
                return Err(fail(NOT_ENOUGH_INPUTS));
            } else if remaining < 0 {
                return Err(fail(TOO_MANY_INPUTS));
            } else if success_message.is_none() {
                self.pass(CORRECT_INPUT_COUNT);
            }
        }

        match success_message.filter(|m| !m.is_empty()) {
            Some(message) => self.pass(message),
            // Lenient default: with no checks configured any output passes.
            None if !all_inputs_must_be_used && matched.is_none() => self.pass(TEST_PASSED),
            None => {}
        }
        Ok(())
    }
}
