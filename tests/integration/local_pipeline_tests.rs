use appforge::build::{BuildOptions, BuildOutcome, BuildState};
use appforge::platform::{parse_destination, ApiError, ApiErrorKind};
use appforge::test_utils::fixtures::SourceTree;
use appforge::test_utils::mock_platform::MockPlatform;
use appforge::test_utils::stubs::RecordingBuilder;
use appforge::ForgeError;

use super::fixture::{app_version, Harness};

fn server_error() -> ApiError {
    ApiError::new(ApiErrorKind::Server, "boom").with_status(500)
}

#[test]
fn first_build_creates_base_version() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new());

    let run = harness.build(&tree, &BuildOptions::app());
    let outcome = run.result.unwrap();
    assert_eq!(app_version(&outcome), "1.0.0");

    let apps = harness.platform.apps();
    assert_eq!(apps.len(), 1);
    assert!(!apps[0].published);
    assert_eq!(apps[0].spec["title"], "Test Tool");
    assert_eq!(harness.builder.runs(), 1);
    assert_eq!(*run.history.last().unwrap(), BuildState::Done);
}

#[test]
fn publish_flag_publishes_the_new_version() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new());
    let options = BuildOptions {
        publish: true,
        ..BuildOptions::app()
    };

    let outcome = harness.build(&tree, &options).result.unwrap();
    assert!(matches!(outcome, BuildOutcome::App { published: true, .. }));
    assert_eq!(harness.platform.call_count("publish_app"), 1);
}

#[test]
fn published_version_falls_back_to_commit_suffix() {
    let tree = SourceTree::new("tool", "1.0.0");
    let sha = tree.commit_all();
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", true));

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    assert_eq!(app_version(&outcome), format!("1.0.0+git.{sha}"));
}

#[test]
fn published_version_without_git_uses_timestamp() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", true));

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    let version = app_version(&outcome);
    assert!(version.starts_with("1.0.0+build."), "got {version}");
    assert!(semver::Version::parse(version).is_ok());
}

#[test]
fn unpublished_version_is_updated_in_place() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", false));

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    assert_eq!(app_version(&outcome), "1.0.0");
    assert_eq!(harness.platform.call_count("update_app"), 1);
    assert_eq!(harness.platform.call_count("create_app"), 0);
}

#[test]
fn no_update_moves_past_unpublished_version() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", false));
    let options = BuildOptions {
        try_update: false,
        ..BuildOptions::app()
    };

    let outcome = harness.build(&tree, &options).result.unwrap();
    assert!(app_version(&outcome).starts_with("1.0.0+build."));
    assert_eq!(harness.platform.call_count("update_app"), 0);
}

#[test]
fn taken_version_without_autonumbering_is_a_conflict() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new().with_app("tool", "1.0.0", true));
    let options = BuildOptions {
        version_autonumbering: false,
        ..BuildOptions::app()
    };

    let err = harness.build(&tree, &options).result.unwrap_err();
    assert!(matches!(err, ForgeError::VersionConflict { .. }));
    assert_eq!(err.exit_status(), 3);
    // The workspace holding the orphaned applet is still removed.
    assert_eq!(harness.platform.destroyed().len(), 1);
}

#[test]
fn lost_creation_race_moves_to_next_candidate() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new());
    harness.platform.race_on_create("1.0.0");

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    assert!(app_version(&outcome).starts_with("1.0.0+build."));
    assert_eq!(harness.platform.call_count("create_app"), 2);
}

#[test]
fn dry_run_touches_nothing() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/usr/bin/helper", "#!/bin/sh\n");
    let harness = Harness::new(MockPlatform::new());
    let options = BuildOptions {
        dry_run: true,
        ..BuildOptions::app()
    };

    let outcome = harness.build(&tree, &options).result.unwrap();
    let BuildOutcome::DryRun { artifact_spec } = outcome else {
        panic!("expected a dry run outcome");
    };
    assert!(artifact_spec["runSpec"]["code"].as_str().unwrap().contains("echo hello"));
    assert!(artifact_spec["runSpec"].get("file").is_none());
    assert!(artifact_spec.get("project").is_none());
    assert!(harness.platform.calls().is_empty());
}

#[test]
fn publish_failure_destroys_workspace_once() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new());
    harness.platform.fail_on("create_applet", server_error());

    let run = harness.build(&tree, &BuildOptions::app());
    assert!(matches!(run.result.unwrap_err(), ForgeError::Publish { .. }));
    assert_eq!(harness.platform.destroyed().len(), 1);
    assert!(run.history.contains(&BuildState::Cleanup));
    assert_eq!(*run.history.last().unwrap(), BuildState::Failed);
}

#[test]
fn failing_local_build_creates_nothing() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness =
        Harness::new(MockPlatform::new()).with_builder(RecordingBuilder::failing("make: *** [all] Error 2"));

    let err = harness.build(&tree, &BuildOptions::app()).result.unwrap_err();
    assert!(matches!(err, ForgeError::LocalBuild(_)));
    assert!(harness.platform.files().is_empty());
    assert!(harness.platform.applet_ids().is_empty());
    assert_eq!(harness.platform.destroyed().len(), 1);
}

#[test]
fn cleanup_failure_does_not_mask_success() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness = Harness::new(MockPlatform::new());
    harness.platform.fail_on("destroy_project", server_error());

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    assert_eq!(app_version(&outcome), "1.0.0");
}

#[test]
fn resources_are_bundled_under_hidden_folder() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/usr/bin/helper", "#!/bin/sh\necho helper\n");
    let harness = Harness::new(MockPlatform::new());

    harness.build(&tree, &BuildOptions::app()).result.unwrap();

    let files = harness.platform.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].1.folder, "/.resources/usr/bin");
    assert_eq!(files[0].1.name, "helper");

    let applet = harness.platform.applet(&harness.platform.applet_ids()[0]).unwrap();
    let depends = applet["runSpec"]["bundledDepends"].as_array().unwrap();
    assert_eq!(depends[0]["id"]["$link"], files[0].0.as_str());
}

#[test]
fn applet_collision_requires_overwrite() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness =
        Harness::new(MockPlatform::new().with_applet("project-home", "/tools", "tool"));
    let options = BuildOptions {
        destination: Some(parse_destination("project-home:/tools/").unwrap()),
        ..BuildOptions::applet()
    };

    let err = harness.build(&tree, &options).result.unwrap_err();
    assert!(matches!(err, ForgeError::Destination(_)));
    assert_eq!(harness.platform.applet_ids().len(), 1);
    assert_eq!(harness.platform.call_count("create_project"), 0);
}

#[test]
fn applet_overwrite_replaces_existing() {
    let tree = SourceTree::new("tool", "1.0.0");
    let harness =
        Harness::new(MockPlatform::new().with_applet("project-home", "/tools", "tool"));
    let old = harness.platform.applet_ids();
    let options = BuildOptions {
        destination: Some(parse_destination("project-home:/tools/").unwrap()),
        overwrite: true,
        ..BuildOptions::applet()
    };

    let outcome = harness.build(&tree, &options).result.unwrap();
    let BuildOutcome::Applet { id, name } = outcome else {
        panic!("expected an applet outcome");
    };
    assert_eq!(name, "tool");
    assert_eq!(harness.platform.removed(), old);
    assert_eq!(harness.platform.applet_ids(), vec![id.clone()]);
    let applet = harness.platform.applet(&id).unwrap();
    assert_eq!(applet["project"], "project-home");
    assert_eq!(applet["folder"], "/tools");
}

#[test]
fn failed_applet_creation_removes_uploaded_resources() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/a.txt", "a");
    tree.create_file("resources/b.txt", "b");
    let harness = Harness::new(MockPlatform::new()).with_project("project-home");
    harness.platform.fail_on("create_applet", server_error());

    let err = harness.build(&tree, &BuildOptions::applet()).result.unwrap_err();
    assert!(matches!(err, ForgeError::Publish { .. }));
    assert_eq!(harness.platform.removed().len(), 2);
    assert!(harness.platform.files().is_empty());
}

#[test]
fn failed_collision_check_removes_uploaded_resources() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/a.txt", "a");
    let harness = Harness::new(MockPlatform::new()).with_project("project-home");
    harness.platform.fail_on(
        "find_applets",
        ApiError::new(ApiErrorKind::PermissionDenied, "no view access"),
    );

    let err = harness.build(&tree, &BuildOptions::applet()).result.unwrap_err();
    assert!(matches!(err, ForgeError::Publish { .. }));
    assert_eq!(harness.platform.removed().len(), 1);
    assert!(harness.platform.files().is_empty());
}

#[test]
fn failed_wrap_without_temp_project_leaves_nothing_behind() {
    let tree = SourceTree::new("tool", "1.0.0");
    tree.create_file("resources/a.txt", "a");
    let harness =
        Harness::new(MockPlatform::new().with_app("tool", "1.0.0", true)).with_project("project-home");
    let options = BuildOptions {
        use_temp_project: false,
        version_autonumbering: false,
        ..BuildOptions::app()
    };

    let err = harness.build(&tree, &options).result.unwrap_err();
    assert!(matches!(err, ForgeError::VersionConflict { .. }));
    assert!(harness.platform.files().is_empty());
    assert!(harness.platform.applet_ids().is_empty());
    assert_eq!(harness.platform.call_count("create_project"), 0);
}

#[test]
fn manifest_without_run_spec_publishes_base_version() {
    let tree = SourceTree::with_manifest("x", &serde_json::json!({ "name": "x", "version": "1.0.0" }));
    let harness = Harness::new(MockPlatform::new());

    let outcome = harness.build(&tree, &BuildOptions::app()).result.unwrap();
    assert_eq!(app_version(&outcome), "1.0.0");
    let applet = harness.platform.applet(&harness.platform.applet_ids()[0]).unwrap();
    assert!(applet.get("runSpec").is_none());
}
