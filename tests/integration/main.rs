//! Pipeline tests against the in-memory platform.

mod fixture;
mod local_pipeline_tests;
mod remote_pipeline_tests;
