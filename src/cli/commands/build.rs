//! appforge build - build a source tree and publish it
//!
//! Runs the local pipeline (validate, build, bundle, publish, wrap) or, with
//! `--remote`, hands the tree to a builder job on the platform.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use tracing::debug;

use crate::app::AppContext;
use crate::build::{BuildOptions, BuildOutcome, CancelToken, MakeBuilder, Mode, Orchestrator};
use crate::cli::output::{emit_json, robot_ok, OutputFormat};
use crate::error::Result;
use crate::platform::{parse_destination, ApiClient};
use crate::validate::InterpreterSyntaxChecker;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// App source directory (must contain appspec.json)
    #[arg(default_value = ".")]
    pub src_dir: PathBuf,

    /// Build an app (versioned, publishable) or a standalone applet
    #[arg(long, value_enum, default_value_t = Mode::App)]
    pub mode: Mode,

    /// Where to put the applet: [PROJECT:][/FOLDER/][NAME] (applets only)
    #[arg(long, short = 'd')]
    pub destination: Option<String>,

    /// Publish the app and make it the default version
    #[arg(long)]
    pub publish: bool,

    /// Build on the platform instead of locally
    #[arg(long)]
    pub remote: bool,

    /// Replace existing applets of the same name
    #[arg(long, short = 'f')]
    pub overwrite: bool,

    /// Use exactly this version instead of the one in appspec.json
    #[arg(long, value_name = "VERSION")]
    pub version_override: Option<String>,

    /// Entity to bill for the app
    #[arg(long, short = 'b', value_name = "ENTITY")]
    pub bill_to: Option<String>,

    /// Do not fall back to a suffixed version when the base is taken
    #[arg(long)]
    pub no_version_autonumbering: bool,

    /// Never update an existing unpublished version
    #[arg(long)]
    pub no_update: bool,

    /// Run make serially
    #[arg(long)]
    pub no_parallel_build: bool,

    /// Warn about syntax errors in the entry point instead of failing
    #[arg(long)]
    pub no_check_syntax: bool,

    /// Print the request that would be sent and create nothing
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Build apps directly in the configured project
    #[arg(long)]
    pub no_temp_build_project: bool,

    /// Skip ./configure and make
    #[arg(long, hide = true)]
    pub no_build_step: bool,

    /// Skip uploading and publishing
    #[arg(long, hide = true)]
    pub no_upload_step: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl BuildArgs {
    pub fn to_options(&self) -> Result<BuildOptions> {
        let destination = self.destination.as_deref().map(parse_destination).transpose()?;
        Ok(BuildOptions {
            mode: self.mode,
            destination,
            publish: self.publish,
            remote: self.remote,
            overwrite: self.overwrite,
            version_override: self.version_override.clone(),
            bill_to: self.bill_to.clone(),
            version_autonumbering: !self.no_version_autonumbering,
            try_update: !self.no_update,
            parallel_build: !self.no_parallel_build,
            check_syntax: !self.no_check_syntax,
            dry_run: self.dry_run,
            use_temp_project: !self.no_temp_build_project,
            build_step: !self.no_build_step,
            upload_step: !self.no_upload_step,
            json: self.json,
        })
    }
}

pub fn run(ctx: &AppContext, args: &BuildArgs) -> Result<()> {
    let options = args.to_options()?;
    options.validate()?;

    let config = &ctx.config;
    let client = if options.dry_run {
        // A dry run never reaches the platform, so no token is needed.
        ApiClient::new(
            &config.platform.api_url,
            config.platform.token.as_deref().unwrap_or_default(),
            Duration::from_secs(config.platform.timeout_secs),
        )?
    } else {
        ApiClient::from_config(config)?
    };

    let reporter = ctx.reporter();
    let validator = InterpreterSyntaxChecker;
    let builder = MakeBuilder::new(config.build.make_command.clone());
    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    let mut orchestrator =
        Orchestrator::new(&client, config, &validator, &builder, &reporter).with_cancel(cancel);
    let outcome = orchestrator.run(&args.src_dir, &options);
    debug!(history = ?orchestrator.history(), "build finished");
    emit_outcome(ctx.output_format, options.json, &outcome?)
}

/// Trip `cancel` on Ctrl-C so the pipeline stops at its next step and
/// still removes what it created.
fn install_interrupt_handler(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                debug!(error = %err, "no interrupt handler");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    });
}

fn emit_outcome(format: OutputFormat, json: bool, outcome: &BuildOutcome) -> Result<()> {
    if format.is_machine_readable() {
        return emit_json(&robot_ok(outcome));
    }
    if json {
        return emit_json(outcome);
    }

    let check = if format.use_colors() {
        style("✓").green().to_string()
    } else {
        "OK".to_string()
    };
    match outcome {
        BuildOutcome::DryRun { artifact_spec } => {
            println!("Would create the following applet:");
            emit_json(artifact_spec)?;
        }
        BuildOutcome::Skipped => println!("{check} Build finished; upload skipped"),
        BuildOutcome::Applet { id, name } => println!("{check} Applet {name} ({id})"),
        BuildOutcome::App {
            id,
            name,
            version,
            published,
        } => {
            let state = if *published { "published" } else { "unpublished" };
            println!("{check} App {name}/{version} ({id}, {state})");
        }
        BuildOutcome::Remote { job_id, mode } => {
            println!("{check} Remote {} build finished in job {job_id}", mode.as_str());
        }
    }
    Ok(())
}
