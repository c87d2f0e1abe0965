use serde::Serialize;

use crate::error::{ForgeError, Result};

/// Resolved `--destination`: any part may be left to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub project: Option<String>,
    pub folder: Option<String>,
    pub name: Option<String>,
}

/// Parse `[PROJECT:][/[FOLDER/][NAME]]`.
///
/// A bare container id (`project-…`, `container-…`) names only the project.
pub fn parse_destination(raw: &str) -> Result<Destination> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ForgeError::Destination("destination must not be empty".to_string()));
    }

    if is_container_id(raw) {
        return Ok(Destination {
            project: Some(raw.to_string()),
            ..Destination::default()
        });
    }

    let (project, path) = match raw.split_once(':') {
        Some((project, path)) => {
            let project = project.trim();
            (
                (!project.is_empty()).then(|| project.to_string()),
                Some(path),
            )
        }
        None => (None, Some(raw)),
    };

    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Ok(Destination {
            project,
            ..Destination::default()
        });
    };

    if path.contains(':') {
        return Err(ForgeError::Destination(format!(
            "unexpected ':' in path of destination {raw}"
        )));
    }

    if !path.starts_with('/') {
        // Relative name: no folder given.
        if path.contains('/') {
            return Err(ForgeError::Destination(format!(
                "folder in destination {raw} must be absolute"
            )));
        }
        return Ok(Destination {
            project,
            folder: if raw.contains(':') { Some("/".to_string()) } else { None },
            name: Some(path.to_string()),
        });
    }

    let (folder, name) = if path.ends_with('/') {
        (normalize_folder(path), None)
    } else {
        match path.rsplit_once('/') {
            Some((folder, name)) => (normalize_folder(folder), Some(name.to_string())),
            None => ("/".to_string(), Some(path.to_string())),
        }
    };

    Ok(Destination {
        project,
        folder: Some(folder),
        name,
    })
}

fn normalize_folder(folder: &str) -> String {
    let trimmed = folder.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn is_container_id(raw: &str) -> bool {
    ["project-", "container-"].iter().any(|prefix| {
        raw.strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(project: Option<&str>, folder: Option<&str>, name: Option<&str>) -> Destination {
        Destination {
            project: project.map(String::from),
            folder: folder.map(String::from),
            name: name.map(String::from),
        }
    }

    #[test]
    fn bare_container_id() {
        assert_eq!(
            parse_destination("project-B0VK6F6gpqG6z7JGkbqQ000Q").unwrap(),
            dest(Some("project-B0VK6F6gpqG6z7JGkbqQ000Q"), None, None)
        );
    }

    #[test]
    fn project_only() {
        assert_eq!(parse_destination("scratch:").unwrap(), dest(Some("scratch"), None, None));
    }

    #[test]
    fn project_folder_and_name() {
        assert_eq!(
            parse_destination("scratch:/tools/aligners/bwa").unwrap(),
            dest(Some("scratch"), Some("/tools/aligners"), Some("bwa"))
        );
    }

    #[test]
    fn folder_only_with_trailing_slash() {
        assert_eq!(
            parse_destination("scratch:/tools/").unwrap(),
            dest(Some("scratch"), Some("/tools"), None)
        );
        assert_eq!(parse_destination("/tools/").unwrap(), dest(None, Some("/tools"), None));
    }

    #[test]
    fn name_in_root_folder() {
        assert_eq!(parse_destination("/bwa").unwrap(), dest(None, Some("/"), Some("bwa")));
        assert_eq!(
            parse_destination("scratch:bwa").unwrap(),
            dest(Some("scratch"), Some("/"), Some("bwa"))
        );
    }

    #[test]
    fn bare_name_keeps_default_folder() {
        assert_eq!(parse_destination("bwa").unwrap(), dest(None, None, Some("bwa")));
    }

    #[test]
    fn rejects_malformed_destinations() {
        assert!(parse_destination("").is_err());
        assert!(parse_destination("a:b:c").is_err());
        assert!(parse_destination("scratch:tools/bwa").is_err());
    }
}
