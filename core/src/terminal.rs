//! Output surfaces
//!
//! The terminal and table widgets live outside the core. These traits are the
//! minimal capability set the orchestrator needs from them.

use std::io::Write;
use std::sync::Arc;

use crate::error::RunError;
use crate::io_log::IoEventLog;
use crate::plugin::{InputReply, Output};
use crate::types::{Feedback, IoEventType, QueryOutput};

pub trait Terminal: Send + Sync {
    fn output(&self, text: &str);

    /// Ask the learner for a line of input.
    fn input(&self) -> InputReply;

    fn clear(&self);

    /// Unblock a pending input wait after a stop request.
    fn interrupt_input(&self) {}
}

/// Table widget used by the SQL path.
pub trait QueryView: Send + Sync {
    fn show(&self, output: QueryOutput);
    fn clear(&self);
}

/* ===================== Feedback Rendering ===================== */

/// Render feedback with the terminal's ANSI colours.
pub fn render_feedback(feedback: &Feedback) -> String {
    let colour = if feedback.succeeded { "32" } else { "31" };
    let prefix = if feedback.is_test { "> " } else { "" };
    let tick = if feedback.succeeded && feedback.is_test {
        " \u{2714}"
    } else {
        ""
    };
    format!("\x1b[{colour};1m{prefix}{}{tick}\x1b[0m\r\n", feedback.message)
}

/// Output sink mirroring everything written into the IO event log.
pub fn logged_output(terminal: Arc<dyn Terminal>, log: Arc<IoEventLog>) -> Output {
    Output::new(move |text| {
        terminal.output(text);
        log.add_line(text, IoEventType::Output);
    })
}

/// Prints feedback lines through an output sink.
#[derive(Debug, Clone)]
pub struct FeedbackPrinter {
    output: Output,
}

impl FeedbackPrinter {
    pub fn new(output: Output) -> Self {
        Self { output }
    }

    pub fn print(&self, feedback: &Feedback) {
        self.output.write(&render_feedback(feedback));
    }
}

/* ===================== Headless Surfaces ===================== */

/// Terminal for headless hosting: output to stderr, no interactive input.
#[derive(Debug, Default)]
pub struct StderrTerminal;

impl Terminal for StderrTerminal {
    fn output(&self, text: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }

    fn input(&self) -> InputReply {
        InputReply::Ready(Err(RunError::runtime(
            "This sandbox has no interactive input available",
        )))
    }

    fn clear(&self) {
        self.output("\x1b[2J\x1b[H");
    }
}

#[derive(Debug, Default)]
pub struct StderrQueryView;

impl QueryView for StderrQueryView {
    fn show(&self, output: QueryOutput) {
        eprint!("{}", output.render_text());
    }

    fn clear(&self) {}
}
