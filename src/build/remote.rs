//! Remote builds: ship the source tree to a builder job and follow it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cli::progress::ProgressReporter;
use crate::config::Config;
use crate::error::{ForgeError, Result};
use crate::platform::{FileUpload, JobState, Platform, RunRequest};
use crate::spec::LoadedSpec;

use super::archive::{write_source_archive, CompressionStatus};
use super::options::{BuildOptions, Mode};
use super::version::{SuffixSource, VersionLookup, VersionPlan, VersionResolver};
use super::workspace::TempWorkspace;

/// Name of the uploaded source archive.
pub const ARCHIVE_NAME: &str = "app_tarball.tar.gz";

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Shared interrupt flag, tripped from the signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteOutcome {
    pub job_id: String,
    pub builder: String,
}

pub struct RemoteDelegator<'a> {
    platform: &'a dyn Platform,
    config: &'a Config,
    reporter: &'a ProgressReporter,
    cancel: CancelToken,
}

impl<'a> RemoteDelegator<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        config: &'a Config,
        reporter: &'a ProgressReporter,
        cancel: CancelToken,
    ) -> Self {
        Self {
            platform,
            config,
            reporter,
            cancel,
        }
    }

    /// Archive, upload, launch the builder and wait for it to finish.
    pub fn delegate(&self, loaded: &LoadedSpec, options: &BuildOptions) -> Result<RemoteOutcome> {
        let version_override = self.version_override(loaded, options)?;

        match options.mode {
            Mode::Applet => {
                let dest = options.destination.clone().unwrap_or_default();
                let project = dest
                    .project
                    .clone()
                    .or_else(|| self.config.platform.default_project.clone())
                    .ok_or_else(|| {
                        ForgeError::Destination(
                            "a project is required to build an applet remotely; use --destination"
                                .to_string(),
                        )
                    })?;
                let folder = dest.folder.clone().unwrap_or_else(|| "/".to_string());
                let build_options =
                    remote_build_options(options, version_override.as_deref(), dest.name.as_deref());

                let archive_id = self.upload_archive(&loaded.source_dir, &project, &folder)?;
                let result = self.run_builder(
                    &self.config.remote.applet_builder,
                    &project,
                    Some(folder),
                    &archive_id,
                    build_options,
                    None,
                    &loaded.spec.name,
                );
                if let Err(err) = self.platform.remove_objects(&project, &[archive_id.clone()]) {
                    warn!(%project, file = %archive_id, error = %err, "failed to remove source archive");
                }
                result
            }
            Mode::App => {
                let workspace = TempWorkspace::acquire_for_jobs(
                    self.platform,
                    &self.config.build.remote_project_name,
                )?;
                let build_options = remote_build_options(options, version_override.as_deref(), None);
                let result = self.upload_archive(&loaded.source_dir, workspace.id(), "/").and_then(
                    |archive_id| {
                        self.run_builder(
                            &self.config.remote.app_builder,
                            workspace.id(),
                            None,
                            &archive_id,
                            build_options,
                            Some(options.publish),
                            &loaded.spec.name,
                        )
                    },
                );
                if let Err(err) = workspace.release() {
                    warn!(error = %err, "remote build project was not cleaned up");
                    self.reporter.warn(&err.to_string());
                }
                result
            }
        }
    }

    /// The builder cannot see the local git history, so a suffixed version
    /// is chosen here when the base version is already taken.
    fn version_override(&self, loaded: &LoadedSpec, options: &BuildOptions) -> Result<Option<String>> {
        if let Some(explicit) = &options.version_override {
            return Ok(Some(explicit.clone()));
        }
        if options.mode != Mode::App || !options.version_autonumbering {
            return Ok(None);
        }
        let Some(base) = loaded.spec.version.as_deref() else {
            return Ok(None);
        };

        let resolver = VersionResolver::new(self.platform, loaded.spec.name.clone());
        let taken = match resolver.lookup(base)? {
            VersionLookup::Absent => false,
            VersionLookup::Unpublished { .. } => !options.try_update,
            VersionLookup::Published { .. } => true,
        };
        if !taken {
            return Ok(None);
        }

        let plan = VersionPlan::new(base, None, true, &SuffixSource::detect(&loaded.source_dir));
        let chosen = plan.candidates().get(1).cloned();
        if let Some(version) = &chosen {
            info!(%base, %version, "base version taken; builder will use suffixed version");
        }
        Ok(chosen)
    }

    fn upload_archive(&self, source_dir: &Path, project: &str, folder: &str) -> Result<String> {
        let label = source_dir
            .canonicalize()
            .unwrap_or_else(|_| source_dir.to_path_buf());
        let staging = tempfile::tempdir()?;
        let archive = staging.path().join(ARCHIVE_NAME);

        let mode = self.reporter.mode();
        let show = mode.has_output() && mode != crate::cli::progress::ProgressMode::Json;
        let mut status = CompressionStatus::new(
            std::io::stderr(),
            mode.is_interactive(),
            label.display().to_string(),
            Instant::now(),
        );
        let bytes = write_source_archive(source_dir, &archive, |total| {
            if show {
                status.observe(total);
            }
        })?;
        status.finish();
        debug!(bytes, "source archive ready");

        let spinner = self.reporter.spinner("Uploading source archive");
        let upload = FileUpload {
            path: &archive,
            project,
            folder,
            name: ARCHIVE_NAME,
            media_type: "application/gzip",
        };
        match self.platform.upload_file(&upload) {
            Ok(id) => {
                spinner.finish_with_message(&format!("Uploaded source archive ({bytes} bytes)"));
                Ok(id)
            }
            Err(err) => {
                spinner.abandon_with_message("Upload failed");
                Err(err.into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_builder(
        &self,
        builder: &str,
        project: &str,
        folder: Option<String>,
        archive_id: &str,
        build_options: Value,
        publish: Option<bool>,
        name: &str,
    ) -> Result<RemoteOutcome> {
        let mut input = json!({
            "inputFile": { "$link": archive_id },
            "buildOptions": build_options,
        });
        if let Some(publish) = publish {
            input["publish"] = Value::Bool(publish);
        }

        if self.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled(
                "interrupted before the builder job started".to_string(),
            ));
        }

        let request = RunRequest {
            app: builder.to_string(),
            name: format!("Remote build of {name}"),
            project: project.to_string(),
            folder,
            input,
        };
        let job_id = self
            .platform
            .run_app(&request)
            .map_err(|source| ForgeError::Publish {
                stage: "start builder job",
                source,
            })?;
        self.reporter.log(&format!("Started builder job {job_id}"));

        self.watch(&job_id)?;
        Ok(RemoteOutcome {
            job_id,
            builder: builder.to_string(),
        })
    }

    /// Follow a job until it reaches a terminal state, relaying its log.
    pub fn watch(&self, job_id: &str) -> Result<JobState> {
        let mut offset = 0;
        loop {
            if self.cancel.is_cancelled() {
                return self.abort(job_id);
            }

            let desc = self.platform.describe_job(job_id)?;
            offset += self.drain_log(job_id, offset);

            match desc.state {
                JobState::Done => {
                    self.reporter.log(&format!("Builder job {job_id} finished"));
                    return Ok(JobState::Done);
                }
                JobState::Failed | JobState::Terminated => {
                    return Err(ForgeError::RemoteJobFailure {
                        job_id: job_id.to_string(),
                        state: desc.state.as_str().to_string(),
                        reason: desc
                            .failure_reason
                            .or(desc.failure_message)
                            .unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                state => debug!(%job_id, state = state.as_str(), "builder job still running"),
            }

            if !self.pause() {
                return self.abort(job_id);
            }
        }
    }

    fn drain_log(&self, job_id: &str, offset: usize) -> usize {
        match self.platform.job_log(job_id, offset) {
            Ok(lines) => {
                for line in &lines {
                    self.reporter.job_line(line);
                }
                lines.len()
            }
            Err(err) => {
                debug!(%job_id, error = %err, "could not fetch job log");
                0
            }
        }
    }

    /// Sleep one poll interval in short slices; false once cancelled.
    fn pause(&self) -> bool {
        let deadline = Instant::now() + self.config.remote.poll_interval;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    fn abort(&self, job_id: &str) -> Result<JobState> {
        self.reporter.warn(&format!("Interrupted; terminating builder job {job_id}"));
        if let Err(err) = self.platform.terminate_job(job_id) {
            warn!(%job_id, error = %err, "failed to terminate builder job");
        }
        Err(ForgeError::Cancelled(format!("builder job {job_id} was terminated")))
    }
}

/// `buildOptions` for the builder job; only non-default settings are sent.
fn remote_build_options(
    options: &BuildOptions,
    version_override: Option<&str>,
    destination_name: Option<&str>,
) -> Value {
    let mut map = Map::new();
    if let Some(version) = version_override {
        map.insert("versionOverride".to_string(), json!(version));
    }
    if let Some(bill_to) = &options.bill_to {
        map.insert("billToOverride".to_string(), json!(bill_to));
    }
    let switches = [
        ("doVersionAutonumbering", options.version_autonumbering),
        ("doTryUpdate", options.try_update),
        ("doParallelBuild", options.parallel_build),
        ("doCheckSyntax", options.check_syntax),
    ];
    for (key, enabled) in switches {
        if !enabled {
            map.insert(key.to_string(), Value::Bool(false));
        }
    }
    if let Some(name) = destination_name {
        map.insert("destinationOverride".to_string(), json!(format!("/{name}")));
    }
    Value::Object(map)
}
