//! User-facing progress for the build pipeline.
//!
//! Adapts to where stderr goes:
//! - TTY: animated spinners
//! - Plain: one line per step
//! - JSON: one progress event object per line
//! - Quiet: nothing
//!
//! Diagnostics go through `tracing`; this is the narrative a person reads.

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::time::Duration;

const PREFIX: &str = "[appforge]";

/// Progress output mode based on terminal capabilities and user preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Tty,
    Plain,
    Json,
    Quiet,
}

impl ProgressMode {
    #[must_use]
    pub fn detect(json: bool, quiet: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if json {
            Self::Json
        } else if std::io::stderr().is_terminal() {
            Self::Tty
        } else {
            Self::Plain
        }
    }

    /// Whether in-place redraws are appropriate.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        matches!(self, Self::Tty)
    }

    #[must_use]
    pub const fn has_output(&self) -> bool {
        !matches!(self, Self::Quiet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    StepStart,
    StepComplete,
    StepError,
    Log,
    Warning,
    JobLog,
}

/// JSON progress event
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub event: ProgressEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl ProgressEvent {
    fn new(event: ProgressEventType) -> Self {
        Self {
            event_type: "progress",
            event,
            operation: None,
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            eprintln!("{json}");
        }
    }
}

pub struct ProgressReporter {
    mode: ProgressMode,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(json: bool, quiet: bool) -> Self {
        Self::with_mode(ProgressMode::detect(json, quiet))
    }

    #[must_use]
    pub const fn with_mode(mode: ProgressMode) -> Self {
        Self { mode }
    }

    /// A reporter that prints nothing.
    #[must_use]
    pub const fn quiet() -> Self {
        Self::with_mode(ProgressMode::Quiet)
    }

    #[must_use]
    pub const fn mode(&self) -> ProgressMode {
        self.mode
    }

    /// Start an indeterminate step.
    pub fn spinner(&self, msg: &str) -> ProgressHandle {
        match self.mode {
            ProgressMode::Quiet => ProgressHandle::Noop,
            ProgressMode::Json => {
                ProgressEvent::new(ProgressEventType::StepStart)
                    .with_operation(msg)
                    .emit();
                ProgressHandle::Json {
                    operation: msg.to_string(),
                }
            }
            ProgressMode::Plain => {
                eprintln!("{PREFIX} {msg}...");
                ProgressHandle::Plain
            }
            ProgressMode::Tty => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
                    pb.set_style(
                        style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
                    );
                }
                pb.set_message(msg.to_string());
                pb.enable_steady_tick(Duration::from_millis(100));
                ProgressHandle::Tty(pb)
            }
        }
    }

    pub fn log(&self, msg: &str) {
        match self.mode {
            ProgressMode::Quiet => {}
            ProgressMode::Json => ProgressEvent::new(ProgressEventType::Log).with_message(msg).emit(),
            ProgressMode::Plain | ProgressMode::Tty => eprintln!("{PREFIX} {msg}"),
        }
    }

    pub fn warn(&self, msg: &str) {
        match self.mode {
            ProgressMode::Quiet => {}
            ProgressMode::Json => {
                ProgressEvent::new(ProgressEventType::Warning)
                    .with_message(msg)
                    .emit();
            }
            ProgressMode::Plain | ProgressMode::Tty => eprintln!("{PREFIX} WARN: {msg}"),
        }
    }

    /// Relay one line of a remote job's log verbatim.
    pub fn job_line(&self, line: &str) {
        match self.mode {
            ProgressMode::Quiet => {}
            ProgressMode::Json => {
                ProgressEvent::new(ProgressEventType::JobLog)
                    .with_message(line)
                    .emit();
            }
            ProgressMode::Plain | ProgressMode::Tty => eprintln!("{line}"),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

/// Handle for finishing a step started with [`ProgressReporter::spinner`].
pub enum ProgressHandle {
    Tty(ProgressBar),
    Plain,
    Json { operation: String },
    Noop,
}

impl ProgressHandle {
    pub fn set_message(&self, msg: impl Into<String>) {
        if let Self::Tty(pb) = self {
            pb.set_message(msg.into());
        }
    }

    pub fn finish_with_message(&self, msg: &str) {
        match self {
            Self::Tty(pb) => pb.finish_with_message(format!("✓ {msg}")),
            Self::Json { operation } => {
                ProgressEvent::new(ProgressEventType::StepComplete)
                    .with_operation(operation)
                    .with_message(msg)
                    .emit();
            }
            Self::Plain => eprintln!("{PREFIX} ✓ {msg}"),
            Self::Noop => {}
        }
    }

    /// Clear a spinner without a message, e.g. before streaming other output.
    pub fn finish(&self) {
        match self {
            Self::Tty(pb) => pb.finish_and_clear(),
            Self::Json { operation } => {
                ProgressEvent::new(ProgressEventType::StepComplete)
                    .with_operation(operation)
                    .emit();
            }
            Self::Plain | Self::Noop => {}
        }
    }

    pub fn abandon_with_message(&self, msg: &str) {
        match self {
            Self::Tty(pb) => pb.abandon_with_message(format!("✗ {msg}")),
            Self::Json { operation } => {
                ProgressEvent::new(ProgressEventType::StepError)
                    .with_operation(operation)
                    .with_message(msg)
                    .emit();
            }
            Self::Plain => eprintln!("{PREFIX} ✗ ERROR: {msg}"),
            Self::Noop => {}
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}
