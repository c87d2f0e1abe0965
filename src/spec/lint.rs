//! Advisory checks against app publishing guidelines.
//!
//! Nothing here fails a build; every finding is returned as a warning string.

use std::path::{Path, PathBuf};

use super::BuildSpec;

/// Categories the registry recognizes.
pub const KNOWN_CATEGORIES: &[&str] = &[
    "Import",
    "Export",
    "Alignment",
    "Variation calling",
    "Annotation",
    "Reports",
    "RNA-Seq",
    "Statistics",
    "Debugging",
    "Assembly",
];

const README_NAMES: &[&str] = &["README.md", "Readme.md", "readme.md"];

pub fn lint(spec: &BuildSpec, source_dir: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    if spec.name != spec.name.to_lowercase() {
        warnings.push(format!("name \"{}\" should be all lowercase", spec.name));
    }

    if let Some(dirname) = directory_name(source_dir) {
        if dirname != spec.name {
            warnings.push(format!(
                "app name \"{}\" does not match containing directory \"{dirname}\"",
                spec.name
            ));
        }
    }

    match &spec.summary {
        Some(summary) if summary.ends_with('.') => warnings.push(format!(
            "summary \"{summary}\" should be a short phrase not ending in a period"
        )),
        Some(_) => {}
        None => warnings.push(
            "app is missing a summary, please add one in the \"summary\" field".to_string(),
        ),
    }

    let readme = find_readme(source_dir);
    match &spec.description {
        Some(description) => {
            if let Some(readme) = &readme {
                warnings.push(format!(
                    "\"description\" field shadows file {}",
                    readme.display()
                ));
            }
            if !description.trim().ends_with('.') {
                warnings.push(
                    "\"description\" field should be written in complete sentences and end with a period"
                        .to_string(),
                );
            }
        }
        None if readme.is_none() => {
            warnings.push("app is missing a description, please supply one in README.md".to_string());
        }
        None => {}
    }

    if let Some(version) = &spec.version {
        if semver::Version::parse(version).is_err() {
            warnings.push(format!(
                "\"version\" {version} should be semver compliant (e.g. of the form X.Y.Z)"
            ));
        }
    }

    let title = spec.title.as_deref().unwrap_or_default();
    for category in &spec.categories {
        if !KNOWN_CATEGORIES.contains(&category.as_str()) {
            warnings.push(format!("app has unrecognized category \"{category}\""));
        }
        if category == "Import" && !title.ends_with("Importer") {
            warnings.push(format!("title \"{title}\" should end in \"Importer\""));
        }
        if category == "Export" && !title.ends_with("Exporter") {
            warnings.push(format!("title \"{title}\" should end in \"Exporter\""));
        }
    }

    warnings
}

fn directory_name(source_dir: &Path) -> Option<String> {
    let resolved = source_dir
        .canonicalize()
        .unwrap_or_else(|_| source_dir.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn find_readme(source_dir: &Path) -> Option<PathBuf> {
    README_NAMES
        .iter()
        .map(|name| source_dir.join(name))
        .find(|path| path.exists())
}
