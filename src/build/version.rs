//! Version candidate planning and registry resolution.
//!
//! A build tries its base version first and, when autonumbering is on, one
//! suffixed fallback that makes the version unique to the current commit (or
//! the current minute when the source tree is not a git checkout).

use std::path::Path;

use chrono::{Local, NaiveDateTime};
use git2::Repository;
use tracing::{debug, info};

use crate::error::{ForgeError, Result};
use crate::platform::Platform;

/// Where the uniquifying build-metadata suffix comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixSource {
    /// Abbreviated (7 character) commit id of `HEAD`
    Git(String),
    /// Local wall-clock time formatted as `YYYYMMDD.HHMM`
    Timestamp(String),
}

impl SuffixSource {
    /// Prefer the commit checked out in `source_dir`, else the current time.
    pub fn detect(source_dir: &Path) -> Self {
        match head_short_id(source_dir) {
            Ok(Some(sha)) => Self::Git(sha),
            Ok(None) => Self::now(),
            Err(err) => {
                debug!(error = %err, "could not read git HEAD; using timestamp suffix");
                Self::now()
            }
        }
    }

    #[must_use]
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }

    #[must_use]
    pub fn at(time: NaiveDateTime) -> Self {
        Self::Timestamp(time.format("%Y%m%d.%H%M").to_string())
    }

    /// Suffix to append to `base`. A base that already carries build
    /// metadata is extended with `.` instead of starting a new `+` section.
    #[must_use]
    pub fn suffix_for(&self, base: &str) -> String {
        let lead = if base.contains('+') { '.' } else { '+' };
        match self {
            Self::Git(sha) => format!("{lead}git.{sha}"),
            Self::Timestamp(stamp) => format!("{lead}build.{stamp}"),
        }
    }
}

fn head_short_id(source_dir: &Path) -> Result<Option<String>> {
    if !source_dir.join(".git").exists() {
        return Ok(None);
    }
    let repo = Repository::open(source_dir)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(Some(commit.id().to_string().chars().take(7).collect()))
}

/// Ordered versions to attempt, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPlan {
    candidates: Vec<String>,
}

impl VersionPlan {
    /// An explicit override is the only candidate. Otherwise the base comes
    /// first, followed by its suffixed form when autonumbering.
    #[must_use]
    pub fn new(
        base: &str,
        version_override: Option<&str>,
        autonumber: bool,
        suffix: &SuffixSource,
    ) -> Self {
        let candidates = match version_override {
            Some(explicit) => vec![explicit.to_string()],
            None if autonumber => vec![base.to_string(), format!("{base}{}", suffix.suffix_for(base))],
            None => vec![base.to_string()],
        };
        Self { candidates }
    }

    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

/// What the registry knows about one `name/version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionLookup {
    Absent,
    Unpublished { app_id: String },
    Published { app_id: String },
}

/// The version a build will write, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Create { index: usize, version: String },
    Update { index: usize, version: String, app_id: String },
}

impl Resolution {
    /// Position of the chosen version in its plan.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Create { index, .. } | Self::Update { index, .. } => *index,
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Self::Create { version, .. } | Self::Update { version, .. } => version,
        }
    }
}

/// Walks a [`VersionPlan`] against the app registry.
pub struct VersionResolver<'p> {
    platform: &'p dyn Platform,
    name: String,
}

impl<'p> VersionResolver<'p> {
    pub fn new(platform: &'p dyn Platform, name: impl Into<String>) -> Self {
        Self {
            platform,
            name: name.into(),
        }
    }

    /// Classify one version. Anything other than a clean "not found" that
    /// stops the lookup is surfaced rather than guessed at.
    pub fn lookup(&self, version: &str) -> Result<VersionLookup> {
        match self.platform.describe_app_version(&self.name, version) {
            Ok(desc) if desc.is_published() => Ok(VersionLookup::Published { app_id: desc.id }),
            Ok(desc) => Ok(VersionLookup::Unpublished { app_id: desc.id }),
            Err(err) if err.is_not_found() => Ok(VersionLookup::Absent),
            Err(source) => Err(ForgeError::RegistryLookupAmbiguous {
                name: self.name.clone(),
                version: version.to_string(),
                source,
            }),
        }
    }

    pub fn resolve(&self, plan: &VersionPlan, allow_update: bool) -> Result<Resolution> {
        self.resolve_from(plan, 0, allow_update)
    }

    /// Resolve starting at candidate `start`, used to move past a version
    /// that was taken between lookup and creation.
    pub fn resolve_from(
        &self,
        plan: &VersionPlan,
        start: usize,
        allow_update: bool,
    ) -> Result<Resolution> {
        for (index, version) in plan.candidates().iter().enumerate().skip(start) {
            match self.lookup(version)? {
                VersionLookup::Absent => {
                    debug!(name = %self.name, %version, "version is free");
                    return Ok(Resolution::Create {
                        index,
                        version: version.clone(),
                    });
                }
                VersionLookup::Unpublished { app_id } if allow_update => {
                    info!(name = %self.name, %version, %app_id, "updating unpublished version");
                    return Ok(Resolution::Update {
                        index,
                        version: version.clone(),
                        app_id,
                    });
                }
                VersionLookup::Unpublished { .. } => {
                    info!(name = %self.name, %version, "version exists and updates are disabled");
                }
                VersionLookup::Published { .. } => {
                    info!(name = %self.name, %version, "version already published");
                }
            }
        }

        Err(ForgeError::VersionConflict {
            name: self.name.clone(),
            candidates: plan.candidates().to_vec(),
        })
    }
}
