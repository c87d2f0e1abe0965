//! Uploads the `resources/` subtree so the artifact can depend on it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ForgeError, Result};
use crate::platform::{FileUpload, Platform};
use crate::spec::RESOURCES_DIR;

/// Remote folder that holds bundled resources.
pub const RESOURCES_FOLDER: &str = "/.resources";

/// One uploaded resource file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundledResource {
    pub id: String,
    /// Path relative to `resources/`
    pub path: PathBuf,
}

impl BundledResource {
    /// Dependency entry for the artifact's `runSpec.bundledDepends`.
    #[must_use]
    pub fn as_dependency(&self) -> Value {
        json!({
            "name": self.path.to_string_lossy(),
            "id": { "$link": self.id },
        })
    }
}

pub struct ResourceBundler<'p> {
    platform: &'p dyn Platform,
}

impl<'p> ResourceBundler<'p> {
    pub fn new(platform: &'p dyn Platform) -> Self {
        Self { platform }
    }

    /// Upload every file under `source_dir/resources` into `project`.
    ///
    /// Files are visited in name order. When an upload fails, the files
    /// already uploaded by this call are removed before the error is
    /// returned.
    pub fn bundle(&self, source_dir: &Path, project: &str) -> Result<Vec<BundledResource>> {
        let root = source_dir.join(RESOURCES_DIR);
        if !root.is_dir() {
            debug!("no resources directory");
            return Ok(Vec::new());
        }

        let mut bundled = Vec::new();
        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| ForgeError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| ForgeError::Archive(e.to_string()))?
                .to_path_buf();

            match self.upload(entry.path(), &rel, project) {
                Ok(id) => bundled.push(BundledResource { id, path: rel }),
                Err(err) => {
                    self.discard(project, &bundled);
                    return Err(err);
                }
            }
        }

        debug!(count = bundled.len(), "bundled resources");
        Ok(bundled)
    }

    fn upload(&self, path: &Path, rel: &Path, project: &str) -> Result<String> {
        let folder = match rel.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => format!("{RESOURCES_FOLDER}/{}", parent.to_string_lossy()),
            None => RESOURCES_FOLDER.to_string(),
        };
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let upload = FileUpload {
            path,
            project,
            folder: &folder,
            name: &name,
            media_type: "application/octet-stream",
        };
        Ok(self.platform.upload_file(&upload)?)
    }

    /// Best-effort removal; a failure is logged with the leaked ids.
    pub fn discard(&self, project: &str, resources: &[BundledResource]) {
        if resources.is_empty() {
            return;
        }
        let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        if let Err(err) = self.platform.remove_objects(project, &ids) {
            warn!(%project, leaked = ?ids, error = %err, "failed to remove bundled resources");
        }
    }
}
