use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::spec::MANIFEST_FILE;

/// An app source tree in an isolated temp directory.
///
/// The tree lives in a subdirectory named after the app so that the
/// directory-name lint stays quiet.
pub struct SourceTree {
    _temp_dir: TempDir,
    pub root: PathBuf,
}

impl SourceTree {
    /// A minimal valid bash app named `name` at version `version`.
    pub fn new(name: &str, version: &str) -> Self {
        Self::with_manifest(name, &minimal_manifest(name, version))
    }

    pub fn with_manifest(dir_name: &str, manifest: &Value) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join(dir_name);
        std::fs::create_dir_all(&root).expect("Failed to create source dir");
        println!("[FIXTURE] Created source tree: {:?}", root);

        let tree = Self {
            _temp_dir: temp_dir,
            root,
        };
        tree.write_manifest(manifest);
        tree.create_file("src/main.sh", "#!/bin/bash\nmain() {\n  echo hello\n}\n");
        tree
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write_manifest(&self, manifest: &Value) -> PathBuf {
        let text = serde_json::to_string_pretty(manifest).expect("Failed to encode manifest");
        self.create_file(MANIFEST_FILE, &text)
    }

    /// Create a file with content, creating parent directories.
    pub fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.root.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    /// Initialize a git repository and commit every file; returns the
    /// abbreviated commit id.
    pub fn commit_all(&self) -> String {
        let repo = git2::Repository::init(&self.root).expect("Failed to init repo");
        let mut index = repo.index().expect("Failed to open index");
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .expect("Failed to stage files");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = repo.find_tree(tree_id).expect("Failed to find tree");
        let sig = git2::Signature::now("Fixture", "fixture@example.com").expect("signature");
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "fixture", &tree, &[])
            .expect("Failed to commit");
        oid.to_string().chars().take(7).collect()
    }
}

/// Manifest with every field the lint pass looks for.
#[must_use]
pub fn minimal_manifest(name: &str, version: &str) -> Value {
    json!({
        "name": name,
        "title": "Test Tool",
        "summary": "Does a test thing",
        "description": "Runs a small test workload.",
        "version": version,
        "categories": ["Reports"],
        "runSpec": { "interpreter": "bash", "file": "src/main.sh" },
        "inputSpec": [{ "name": "reads", "class": "file" }],
        "outputSpec": [{ "name": "report", "class": "file" }]
    })
}
