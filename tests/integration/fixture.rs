use std::time::Duration;

use appforge::build::{BuildOptions, BuildOutcome, BuildState, Orchestrator};
use appforge::cli::progress::ProgressReporter;
use appforge::config::Config;
use appforge::test_utils::fixtures::SourceTree;
use appforge::test_utils::mock_platform::MockPlatform;
use appforge::test_utils::stubs::{RecordingBuilder, StaticValidator};
use appforge::Result;

/// Everything one orchestrated build needs, wired to a [`MockPlatform`].
pub struct Harness {
    pub platform: MockPlatform,
    pub config: Config,
    pub builder: RecordingBuilder,
    pub validator: StaticValidator,
}

/// Result of a single build plus the states it went through.
pub struct Run {
    pub result: Result<BuildOutcome>,
    pub history: Vec<BuildState>,
}

impl Harness {
    pub fn new(platform: MockPlatform) -> Self {
        let mut config = Config::default();
        config.remote.poll_interval = Duration::ZERO;
        Self {
            platform,
            config,
            builder: RecordingBuilder::new(),
            validator: StaticValidator::clean(),
        }
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.config.platform.default_project = Some(project.to_string());
        self
    }

    pub fn with_builder(mut self, builder: RecordingBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn build(&self, tree: &SourceTree, options: &BuildOptions) -> Run {
        let reporter = ProgressReporter::quiet();
        let mut orchestrator = Orchestrator::new(
            &self.platform,
            &self.config,
            &self.validator,
            &self.builder,
            &reporter,
        );
        let result = orchestrator.run(tree.path(), options);
        Run {
            result,
            history: orchestrator.history().to_vec(),
        }
    }
}

pub fn app_version(outcome: &BuildOutcome) -> &str {
    match outcome {
        BuildOutcome::App { version, .. } => version,
        other => panic!("expected an app outcome, got {other:?}"),
    }
}
