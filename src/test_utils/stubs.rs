//! Stand-ins for the local build and syntax-check seams.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::build::LocalBuilder;
use crate::error::{ForgeError, Result};
use crate::spec::BuildSpec;
use crate::validate::{SourceValidator, SyntaxIssue, SyntaxReport};

/// Counts build invocations and optionally fails them.
#[derive(Debug, Default)]
pub struct RecordingBuilder {
    failure: Option<String>,
    runs: AtomicUsize,
}

impl RecordingBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            runs: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl LocalBuilder for RecordingBuilder {
    fn build(&self, _source_dir: &Path, _parallel: bool) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(ForgeError::LocalBuild(message.clone())),
            None => Ok(()),
        }
    }
}

/// Returns a fixed report.
#[derive(Debug, Default)]
pub struct StaticValidator {
    broken_entry: bool,
}

impl StaticValidator {
    #[must_use]
    pub fn clean() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn broken_entry() -> Self {
        Self { broken_entry: true }
    }
}

impl SourceValidator for StaticValidator {
    fn check(&self, _spec: &BuildSpec, source_dir: &Path) -> Result<SyntaxReport> {
        let entry = if self.broken_entry {
            vec![SyntaxIssue {
                path: source_dir.join("src/main.sh"),
                output: "syntax error near unexpected token".to_string(),
            }]
        } else {
            Vec::new()
        };
        Ok(SyntaxReport {
            entry,
            resources: Vec::new(),
        })
    }
}
