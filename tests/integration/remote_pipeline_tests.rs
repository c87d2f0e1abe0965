use flate2::read::GzDecoder;

use appforge::build::remote::ARCHIVE_NAME;
use appforge::build::{BuildOptions, BuildOutcome, BuildState, Mode};
use appforge::platform::JobState;
use appforge::test_utils::fixtures::SourceTree;
use appforge::test_utils::mock_platform::MockPlatform;
use appforge::ForgeError;

use super::fixture::Harness;

fn remote_app() -> BuildOptions {
    BuildOptions {
        remote: true,
        ..BuildOptions::app()
    }
}

fn archive_entries(content: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(content));
    archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn remote_app_build_ships_archive_without_git() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/data.txt", "payload");
    tree.commit_all();
    let harness = Harness::new(MockPlatform::new());

    let run = harness.build(&tree, &remote_app());
    let outcome = run.result.unwrap();
    assert!(matches!(outcome, BuildOutcome::Remote { mode: Mode::App, .. }));
    assert!(run.history.contains(&BuildState::Cleanup));
    assert_eq!(harness.builder.runs(), 0);

    let files = harness.platform.files();
    let (_, archive) = files
        .iter()
        .find(|(_, f)| f.name == ARCHIVE_NAME)
        .expect("archive was uploaded");
    let entries = archive_entries(&archive.content);
    assert!(entries.iter().any(|e| e == "appspec.json"));
    assert!(entries.iter().any(|e| e == "resources/data.txt"));
    assert!(entries.iter().all(|e| !e.starts_with(".git")), "{entries:?}");
}

#[test]
fn remote_builder_gets_suffixed_version_when_base_is_published() {
    let tree = SourceTree::new("tool", "1.0.0");
    let sha = tree.commit_all();
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", true));

    harness.build(&tree, &remote_app()).result.unwrap();

    let runs = harness.platform.runs();
    assert_eq!(
        runs[0].input["buildOptions"]["versionOverride"],
        format!("1.0.0+git.{sha}")
    );
}

#[test]
fn remote_job_failure_is_reported_and_project_destroyed() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(
        MockPlatform::new()
            .with_job_script(vec![JobState::Running, JobState::Failed])
            .with_job_failure("AppError"),
    );

    let err = harness.build(&tree, &remote_app()).result.unwrap_err();
    match err {
        ForgeError::RemoteJobFailure { state, reason, .. } => {
            assert_eq!(state, "failed");
            assert_eq!(reason, "AppError");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let destroyed = harness.platform.destroyed();
    assert_eq!(destroyed.len(), 1);
    assert!(destroyed[0].1, "remote build project must terminate its jobs");
}

#[test]
fn remote_applet_build_goes_to_destination() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new()).with_project("project-home");
    let options = BuildOptions {
        remote: true,
        ..BuildOptions::applet()
    };

    harness.build(&tree, &options).result.unwrap();

    let runs = harness.platform.runs();
    assert_eq!(runs[0].project, "project-home");
    assert_eq!(runs[0].folder.as_deref(), Some("/"));
    assert_eq!(harness.platform.call_count("create_project"), 0);
    // The uploaded source archive does not outlive the build.
    assert_eq!(harness.platform.removed().len(), 1);
    assert!(harness.platform.files().is_empty());
}
