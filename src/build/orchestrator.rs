//! Sequences one build from manifest to published artifact.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::progress::ProgressReporter;
use crate::config::Config;
use crate::error::{ForgeError, Result};
use crate::platform::Platform;
use crate::spec::{self, LoadedSpec};
use crate::validate::SourceValidator;

use super::local::LocalBuilder;
use super::options::{BuildOptions, Mode};
use super::publisher::{artifact_spec, AppRequest, ArtifactPublisher, ArtifactTarget, PublishPolicy};
use super::remote::{CancelToken, RemoteDelegator};
use super::resources::ResourceBundler;
use super::version::{SuffixSource, VersionPlan};
use super::workspace::TempWorkspace;

/// Pipeline position, recorded in order as the build advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Init,
    Validated,
    LocalBuilt,
    Skipped,
    Bundled,
    Published,
    Wrapped,
    Cleanup,
    Done,
    Failed,
}

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// Nothing was created; this is the request that would have been sent.
    DryRun { artifact_spec: Value },
    /// The upload step was disabled.
    Skipped,
    Applet { id: String, name: String },
    App {
        id: String,
        name: String,
        version: String,
        published: bool,
    },
    Remote { job_id: String, mode: Mode },
}

pub struct Orchestrator<'a> {
    platform: &'a dyn Platform,
    config: &'a Config,
    validator: &'a dyn SourceValidator,
    builder: &'a dyn LocalBuilder,
    reporter: &'a ProgressReporter,
    cancel: CancelToken,
    history: Vec<BuildState>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        config: &'a Config,
        validator: &'a dyn SourceValidator,
        builder: &'a dyn LocalBuilder,
        reporter: &'a ProgressReporter,
    ) -> Self {
        Self {
            platform,
            config,
            validator,
            builder,
            reporter,
            cancel: CancelToken::new(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// States visited by the last [`Orchestrator::run`].
    #[must_use]
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    fn enter(&mut self, state: BuildState) {
        self.history.push(state);
    }

    pub fn run(&mut self, source_dir: &Path, options: &BuildOptions) -> Result<BuildOutcome> {
        self.history.clear();
        self.enter(BuildState::Init);

        let result = self.run_inner(source_dir, options);
        match &result {
            Ok(_) => self.enter(BuildState::Done),
            Err(err) => {
                warn!(error = %err, "build failed");
                self.enter(BuildState::Failed);
            }
        }
        result
    }

    fn run_inner(&mut self, source_dir: &Path, options: &BuildOptions) -> Result<BuildOutcome> {
        options.validate()?;
        let applet_project = self.applet_project(options)?;

        let loaded = spec::load(source_dir, options.spec_requirements())?;
        for warning in &loaded.warnings {
            self.reporter.warn(warning);
        }
        self.check_sources(&loaded, options)?;
        self.enter(BuildState::Validated);

        if options.remote {
            return self.run_remote(&loaded, options);
        }

        let workspace = TempWorkspace::acquire_if_needed(
            self.platform,
            options.mode,
            options.use_temp_project,
            options.dry_run,
            &self.config.build.temp_project_name,
        )?;
        if let Some(ws) = &workspace {
            self.reporter.log(&format!("Created temporary project {} to build in", ws.id()));
        }

        let project = match (&workspace, options.mode) {
            (Some(ws), _) => Some(ws.id().to_string()),
            (None, Mode::Applet) => applet_project,
            (None, Mode::App) => self.config.platform.default_project.clone(),
        };
        let result = self.run_local(&loaded, options, project, workspace.is_none());

        if let Some(ws) = workspace {
            self.enter(BuildState::Cleanup);
            if let Err(err) = ws.release() {
                // Never masks the build result.
                warn!(error = %err, "temporary project cleanup failed");
                self.reporter.warn(&err.to_string());
            }
        }
        result
    }

    /// Applets always need a project, even for a dry run.
    fn applet_project(&self, options: &BuildOptions) -> Result<Option<String>> {
        if options.mode != Mode::Applet {
            return Ok(None);
        }
        options
            .destination
            .as_ref()
            .and_then(|d| d.project.clone())
            .or_else(|| self.config.platform.default_project.clone())
            .map(Some)
            .ok_or_else(|| {
                ForgeError::Destination(
                    "can't create an applet without a destination project; use --destination or set APPFORGE_PROJECT"
                        .to_string(),
                )
            })
    }

    fn check_sources(&self, loaded: &LoadedSpec, options: &BuildOptions) -> Result<()> {
        let report = self.validator.check(&loaded.spec, &loaded.source_dir)?;
        for warning in report.into_warnings(options.check_syntax)? {
            self.reporter.warn(&warning);
        }
        Ok(())
    }

    fn run_local(
        &mut self,
        loaded: &LoadedSpec,
        options: &BuildOptions,
        project: Option<String>,
        caller_owned: bool,
    ) -> Result<BuildOutcome> {
        if options.build_step {
            let spinner = self.reporter.spinner("Running local build");
            if let Err(err) = self.builder.build(&loaded.source_dir, options.parallel_build) {
                spinner.abandon_with_message("Local build failed");
                // make dies from the same SIGINT that tripped the token.
                self.checkpoint("during the local build")?;
                return Err(err);
            }
            spinner.finish_with_message("Local build complete");
            self.enter(BuildState::LocalBuilt);
        } else {
            self.enter(BuildState::Skipped);
        }

        if !options.upload_step {
            self.reporter.log("Skipping upload step");
            return Ok(BuildOutcome::Skipped);
        }

        let project = if options.dry_run {
            None
        } else {
            Some(project.ok_or_else(|| {
                ForgeError::Destination(
                    "no project to build in; set APPFORGE_PROJECT or allow a temporary project"
                        .to_string(),
                )
            })?)
        };

        self.checkpoint("before uploading resources")?;
        let resources = match &project {
            Some(project) => {
                let spinner = self.reporter.spinner("Uploading resources");
                let bundled = ResourceBundler::new(self.platform).bundle(&loaded.source_dir, project)?;
                spinner.finish_with_message(&format!("Uploaded {} resource file(s)", bundled.len()));
                bundled
            }
            None => Vec::new(),
        };
        self.enter(BuildState::Bundled);

        let destination = match options.mode {
            Mode::Applet => options.destination.as_ref(),
            Mode::App => None,
        };
        let target = ArtifactTarget::resolve(&loaded.spec, destination, project.as_deref());
        let artifact = artifact_spec(&loaded.spec, &loaded.source_dir, &resources, &target)?;

        if options.dry_run {
            info!("dry run; nothing created");
            return Ok(BuildOutcome::DryRun {
                artifact_spec: artifact,
            });
        }

        if let Err(err) = self.checkpoint("before creating the applet") {
            if let (true, Some(project)) = (caller_owned, &project) {
                ResourceBundler::new(self.platform).discard(project, &resources);
            }
            return Err(err);
        }

        let publisher = ArtifactPublisher::new(self.platform);
        let policy = PublishPolicy {
            caller_owned,
            check_collisions: options.mode == Mode::Applet,
            overwrite: options.overwrite,
        };
        let applet_id = publisher.publish_artifact(&artifact, &target, &resources, policy)?;
        self.enter(BuildState::Published);

        match options.mode {
            Mode::Applet => {
                self.reporter.log(&format!("Created applet {applet_id} successfully"));
                Ok(BuildOutcome::Applet {
                    id: applet_id,
                    name: target.name,
                })
            }
            Mode::App => {
                let wrapped = self
                    .checkpoint("before creating the app")
                    .and_then(|()| self.wrap(loaded, options, &publisher, &applet_id));
                if wrapped.is_err() {
                    if let Some(project) = &target.project {
                        publisher.retract(project, &applet_id, &resources, policy);
                    }
                }
                wrapped
            }
        }
    }

    fn checkpoint(&self, step: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled(format!("interrupted {step}")));
        }
        Ok(())
    }

    fn wrap(
        &mut self,
        loaded: &LoadedSpec,
        options: &BuildOptions,
        publisher: &ArtifactPublisher<'_>,
        applet_id: &str,
    ) -> Result<BuildOutcome> {
        let base = loaded.spec.version.as_deref().unwrap_or_default();
        let plan = VersionPlan::new(
            base,
            options.version_override.as_deref(),
            options.version_autonumbering,
            &SuffixSource::detect(&loaded.source_dir),
        );
        let request = AppRequest {
            applet_id,
            spec: &loaded.spec,
            bill_to: options.bill_to.as_deref(),
            try_update: options.try_update,
            publish: options.publish,
        };

        let record = publisher.wrap_as_app(&plan, &request)?;
        self.enter(BuildState::Wrapped);

        self.reporter.log(&format!(
            "Uploaded app {}/{} ({}) successfully",
            record.name, record.version, record.id
        ));
        if record.published {
            self.reporter.log("The app has been published");
        } else {
            self.reporter.log(&format!(
                "You can publish this app with: appforge build --publish (or POST {}/app-{}/{}/publish)",
                self.config.platform.api_url.trim_end_matches('/'),
                record.name,
                record.version
            ));
        }

        Ok(BuildOutcome::App {
            id: record.id,
            name: record.name,
            version: record.version,
            published: record.published,
        })
    }

    fn run_remote(&mut self, loaded: &LoadedSpec, options: &BuildOptions) -> Result<BuildOutcome> {
        let delegator =
            RemoteDelegator::new(self.platform, self.config, self.reporter, self.cancel.clone());
        let outcome = delegator.delegate(loaded, options);
        if options.mode == Mode::App {
            self.enter(BuildState::Cleanup);
        }
        let outcome = outcome?;
        Ok(BuildOutcome::Remote {
            job_id: outcome.job_id,
            mode: options.mode,
        })
    }
}
