//! Source syntax checks run before anything is uploaded.
//!
//! The entry point is checked with the interpreter named in `runSpec`;
//! resource files are checked by extension. Resource problems are only ever
//! warnings.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ForgeError, Result};
use crate::spec::{BuildSpec, RunEntry, RESOURCES_DIR};

/// A file that failed its syntax check, with the checker's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub path: PathBuf,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxReport {
    pub entry: Vec<SyntaxIssue>,
    pub resources: Vec<SyntaxIssue>,
}

impl SyntaxReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entry.is_empty() && self.resources.is_empty()
    }

    /// Turn the report into warnings, or an error when the entry point is
    /// broken and `enforce` is set.
    ///
    /// Each issue contributes the checker's own output followed by a
    /// summary line.
    pub fn into_warnings(self, enforce: bool) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(first) = self.entry.first() {
            let message = format!(
                "entry point file {} has syntax errors",
                first.path.display()
            );
            if enforce {
                return Err(ForgeError::SyntaxCheck(format!(
                    "{message}:\n{}\nRerun with --no-check-syntax to proceed anyway.",
                    first.output
                )));
            }
            warnings.push(first.output.clone());
            warnings.push(format!("{message}, see above for details"));
        }

        warnings.extend(self.resources.iter().map(|issue| issue.output.clone()));
        match self.resources.as_slice() {
            [] => {}
            [only] => warnings.push(format!(
                "{} contained syntax errors, see above for details",
                only.path.display()
            )),
            [first, rest @ ..] => warnings.push(format!(
                "{} and {} other file{} contained syntax errors, see above for details",
                first.path.display(),
                rest.len(),
                if rest.len() == 1 { "" } else { "s" }
            )),
        }

        Ok(warnings)
    }
}

/// Checks a source tree before it is built.
pub trait SourceValidator {
    fn check(&self, spec: &BuildSpec, source_dir: &Path) -> Result<SyntaxReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Bash,
    Python,
}

impl Language {
    fn from_interpreter(interpreter: &str) -> Option<Self> {
        if interpreter == "bash" {
            Some(Self::Bash)
        } else if interpreter.starts_with("python") {
            Some(Self::Python)
        } else {
            None
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sh") => Some(Self::Bash),
            Some("py") => Some(Self::Python),
            _ => None,
        }
    }

    const fn extension(self) -> &'static str {
        match self {
            Self::Bash => ".sh",
            Self::Python => ".py",
        }
    }
}

/// Runs `bash -n` or a Python parse over each checkable file.
#[derive(Debug, Clone, Default)]
pub struct InterpreterSyntaxChecker;

impl InterpreterSyntaxChecker {
    /// `Ok(None)` means clean or not checkable on this machine.
    fn check_file(&self, language: Language, path: &Path) -> Result<Option<String>> {
        let output = match language {
            Language::Bash => {
                let Ok(bash) = which::which("bash") else {
                    debug!("bash not found; skipping syntax check");
                    return Ok(None);
                };
                Command::new(bash).arg("-n").arg(path).output()?
            }
            Language::Python => {
                let Some(python) = which::which("python3").or_else(|_| which::which("python")).ok()
                else {
                    debug!("python not found; skipping syntax check");
                    return Ok(None);
                };
                Command::new(python)
                    .arg("-c")
                    .arg("import ast, sys; ast.parse(open(sys.argv[1]).read(), sys.argv[1])")
                    .arg(path)
                    .output()?
            }
        };

        if output.status.success() {
            return Ok(None);
        }
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        Ok(Some(text.trim().to_string()))
    }

    fn check_entry(&self, spec: &BuildSpec, source_dir: &Path) -> Result<Option<SyntaxIssue>> {
        let Some(run_spec) = &spec.run_spec else {
            return Ok(None);
        };
        let Some(language) = Language::from_interpreter(&run_spec.interpreter) else {
            return Ok(None);
        };

        let (path, failure) = match &run_spec.entry {
            RunEntry::File(rel) => {
                let path = source_dir.join(rel);
                let failure = self.check_file(language, &path)?;
                (path, failure)
            }
            RunEntry::Code(code) => {
                let mut scratch = tempfile::Builder::new()
                    .prefix("appforge-entry")
                    .suffix(language.extension())
                    .tempfile()?;
                scratch.write_all(code.as_bytes())?;
                scratch.flush()?;
                let failure = self.check_file(language, scratch.path())?;
                (PathBuf::from("runSpec.code"), failure)
            }
        };

        Ok(failure.map(|output| SyntaxIssue { path, output }))
    }

    fn check_resources(&self, source_dir: &Path) -> Result<Vec<SyntaxIssue>> {
        let resources = source_dir.join(RESOURCES_DIR);
        if !resources.is_dir() {
            return Ok(Vec::new());
        }

        let mut issues = Vec::new();
        for entry in WalkDir::new(&resources).sort_by_file_name() {
            let entry = entry.map_err(|e| ForgeError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            // AppleDouble metadata files, not code
            if entry.file_name().to_string_lossy().starts_with("._") {
                continue;
            }
            let Some(language) = Language::from_path(entry.path()) else {
                continue;
            };
            if let Some(output) = self.check_file(language, entry.path())? {
                issues.push(SyntaxIssue {
                    path: entry.path().to_path_buf(),
                    output,
                });
            }
        }
        Ok(issues)
    }
}

impl SourceValidator for InterpreterSyntaxChecker {
    fn check(&self, spec: &BuildSpec, source_dir: &Path) -> Result<SyntaxReport> {
        let entry = self.check_entry(spec, source_dir)?.into_iter().collect();
        let resources = self.check_resources(source_dir)?;
        let report = SyntaxReport { entry, resources };
        if !report.is_clean() {
            warn!(
                entry = report.entry.len(),
                resources = report.resources.len(),
                "syntax check found problems"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{load, SpecRequirements};
    use crate::test_utils::fixtures::SourceTree;

    fn issue(path: &str) -> SyntaxIssue {
        SyntaxIssue {
            path: PathBuf::from(path),
            output: "bad".into(),
        }
    }

    #[test]
    fn languages_by_interpreter_and_extension() {
        assert_eq!(Language::from_interpreter("bash"), Some(Language::Bash));
        assert_eq!(Language::from_interpreter("python2.7"), Some(Language::Python));
        assert_eq!(Language::from_interpreter("python3"), Some(Language::Python));
        assert_eq!(Language::from_interpreter("perl"), None);
        assert_eq!(Language::from_path(Path::new("a/b.py")), Some(Language::Python));
        assert_eq!(Language::from_path(Path::new("run.sh")), Some(Language::Bash));
        assert_eq!(Language::from_path(Path::new("README")), None);
    }

    #[test]
    fn broken_entry_is_fatal_when_enforced() {
        let report = SyntaxReport {
            entry: vec![issue("src/main.sh")],
            resources: vec![],
        };
        let err = report.clone().into_warnings(true).unwrap_err();
        assert!(matches!(err, ForgeError::SyntaxCheck(_)));
        assert!(err.to_string().contains("--no-check-syntax"));

        let warnings = report.into_warnings(false).unwrap();
        assert_eq!(
            warnings,
            vec![
                "bad".to_string(),
                "entry point file src/main.sh has syntax errors, see above for details".to_string(),
            ]
        );
    }

    #[test]
    fn resource_issues_are_summarized() {
        let report = SyntaxReport {
            entry: vec![],
            resources: vec![issue("a.py"), issue("b.py"), issue("c.sh")],
        };
        let warnings = report.into_warnings(true).unwrap();
        assert_eq!(warnings.len(), 4);
        assert_eq!(warnings[..3], ["bad", "bad", "bad"]);
        assert_eq!(
            warnings[3],
            "a.py and 2 other files contained syntax errors, see above for details"
        );
    }

    #[test]
    fn enforced_error_carries_checker_output() {
        let report = SyntaxReport {
            entry: vec![SyntaxIssue {
                path: PathBuf::from("src/main.sh"),
                output: "line 2: syntax error near unexpected token `then'".into(),
            }],
            resources: vec![],
        };
        let err = report.into_warnings(true).unwrap_err();
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn manifest_without_run_spec_has_nothing_to_check() {
        let tree = SourceTree::with_manifest(
            "tool",
            &serde_json::json!({ "name": "tool", "version": "1.0.0" }),
        );
        let loaded = load(tree.path(), SpecRequirements::app()).unwrap();
        let report = InterpreterSyntaxChecker.check(&loaded.spec, tree.path()).unwrap();
        assert!(report.entry.is_empty());
    }

    #[test]
    fn clean_tree_passes() {
        if which::which("bash").is_err() {
            return;
        }
        let tree = SourceTree::new("tool", "1.0.0");
        let loaded = load(tree.path(), SpecRequirements::app()).unwrap();
        let report = InterpreterSyntaxChecker.check(&loaded.spec, tree.path()).unwrap();
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn broken_bash_entry_is_reported() {
        if which::which("bash").is_err() {
            return;
        }
        let tree = SourceTree::new("tool", "1.0.0");
        tree.create_file("src/main.sh", "main() {\n  if then\n");
        let loaded = load(tree.path(), SpecRequirements::app()).unwrap();
        let report = InterpreterSyntaxChecker.check(&loaded.spec, tree.path()).unwrap();
        assert_eq!(report.entry.len(), 1);
        assert!(report.entry[0].path.ends_with("src/main.sh"));
    }

    #[test]
    fn resources_skip_appledouble_files() {
        if which::which("bash").is_err() {
            return;
        }
        let tree = SourceTree::new("tool", "1.0.0");
        tree.create_file("resources/usr/bin/._helper.sh", "\u{0}\u{5}binary junk if then");
        tree.create_file("resources/usr/bin/helper.sh", "echo ok\n");
        let loaded = load(tree.path(), SpecRequirements::app()).unwrap();
        let report = InterpreterSyntaxChecker.check(&loaded.spec, tree.path()).unwrap();
        assert!(report.resources.is_empty(), "{report:?}");
    }
}
