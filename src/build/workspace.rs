//! Disposable build projects.
//!
//! A [`TempWorkspace`] owns a project created only for the duration of one
//! build. It is destroyed on every exit path: explicitly through
//! [`TempWorkspace::release`], or on drop when an error or panic unwinds past
//! it.

use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result};
use crate::platform::Platform;

use super::options::Mode;

pub struct TempWorkspace<'p> {
    platform: &'p dyn Platform,
    id: String,
    hosts_jobs: bool,
    released: bool,
}

impl<'p> TempWorkspace<'p> {
    /// Create a project for uploads and artifacts.
    pub fn acquire(platform: &'p dyn Platform, name: &str) -> Result<Self> {
        Self::create(platform, name, false)
    }

    /// Create a project that will also run jobs; its jobs are terminated
    /// before it is destroyed.
    pub fn acquire_for_jobs(platform: &'p dyn Platform, name: &str) -> Result<Self> {
        Self::create(platform, name, true)
    }

    /// A workspace is only needed when building an app for real inside a
    /// temporary project.
    pub fn acquire_if_needed(
        platform: &'p dyn Platform,
        mode: Mode,
        use_temp: bool,
        dry_run: bool,
        name: &str,
    ) -> Result<Option<Self>> {
        if mode == Mode::App && use_temp && !dry_run {
            Self::acquire(platform, name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn create(platform: &'p dyn Platform, name: &str, hosts_jobs: bool) -> Result<Self> {
        let id = platform.create_project(name)?;
        info!(project = %id, "created temporary project");
        Ok(Self {
            platform,
            id,
            hosts_jobs,
            released: false,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Destroy the project now and report the outcome.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.destroy()
    }

    fn destroy(&self) -> Result<()> {
        if self.hosts_jobs {
            self.terminate_jobs();
        }
        debug!(project = %self.id, "destroying temporary project");
        self.platform
            .destroy_project(&self.id, self.hosts_jobs)
            .map_err(|source| ForgeError::WorkspaceCleanup {
                project: self.id.clone(),
                source,
            })
    }

    fn terminate_jobs(&self) {
        let jobs = match self.platform.find_active_jobs(&self.id) {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(project = %self.id, error = %err, "could not list jobs in temporary project");
                return;
            }
        };
        for job in jobs {
            if let Err(err) = self.platform.terminate_job(&job) {
                warn!(project = %self.id, %job, error = %err, "could not terminate job");
            }
        }
    }
}

impl Drop for TempWorkspace<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.destroy() {
            warn!(error = %err, "temporary project was not cleaned up");
        }
    }
}

impl std::fmt::Debug for TempWorkspace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempWorkspace")
            .field("id", &self.id)
            .field("hosts_jobs", &self.hosts_jobs)
            .field("released", &self.released)
            .finish()
    }
}
