//! appforge - build app source trees and publish them as applets or apps.

use std::error::Error as _;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use appforge::app::AppContext;
use appforge::cli::output::robot_error_structured;
use appforge::cli::Cli;
use appforge::{ForgeError, Result};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    if cli.force_plain() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&cli, &e);
            e.exit_code()
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = AppContext::from_cli(cli)?;
    appforge::cli::commands::run(&ctx, &cli.command)
}

fn report(cli: &Cli, e: &ForgeError) {
    if cli.output_format().is_machine_readable() {
        let response = robot_error_structured(e);
        println!("{}", serde_json::to_string(&response).unwrap_or_default());
        return;
    }

    eprintln!("Error: {e}");
    if e.is_anticipated() || matches!(e, ForgeError::Usage(_)) {
        return;
    }
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
    if cli.verbose > 0 {
        eprintln!("{e:#?}");
    }
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn",
        1 => "warn,appforge=info",
        2 => "info,appforge=debug",
        _ => "debug,appforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.output_format().is_machine_readable() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
