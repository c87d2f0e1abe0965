//! Per-invocation context shared by all commands.

use crate::cli::{Cli, OutputFormat};
use crate::cli::progress::{ProgressMode, ProgressReporter};
use crate::config::Config;
use crate::error::Result;

pub struct AppContext {
    pub config: Config,
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: u8,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config,
            output_format: cli.output_format(),
            quiet: cli.quiet,
            verbose: cli.verbose,
        })
    }

    /// Progress narrative goes to stderr; JSON output switches it to events.
    #[must_use]
    pub fn reporter(&self) -> ProgressReporter {
        match self.output_format {
            OutputFormat::Plain if !self.quiet => ProgressReporter::with_mode(ProgressMode::Plain),
            format => ProgressReporter::new(format.is_machine_readable(), self.quiet),
        }
    }
}
