//! Build-and-publish pipeline.
//!
//! The [`orchestrator::Orchestrator`] sequences the steps; each step lives in
//! its own module and talks to the platform only through
//! [`crate::platform::Platform`].

pub mod archive;
pub mod local;
pub mod options;
pub mod orchestrator;
pub mod publisher;
pub mod remote;
pub mod resources;
pub mod version;
pub mod workspace;

pub use local::{LocalBuilder, MakeBuilder};
pub use options::{BuildOptions, Mode};
pub use orchestrator::{BuildOutcome, BuildState, Orchestrator};
pub use remote::{CancelToken, RemoteDelegator};
pub use version::{SuffixSource, VersionLookup, VersionPlan, VersionResolver};
pub use workspace::TempWorkspace;
