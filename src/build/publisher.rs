//! Turns a validated spec into platform objects.
//!
//! [`artifact_spec`] renders the applet creation request;
//! [`ArtifactPublisher::publish_artifact`] creates it and
//! [`ArtifactPublisher::wrap_as_app`] wraps it into a versioned app.

use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result};
use crate::platform::{Destination, Platform};
use crate::spec::{BuildSpec, RunEntry};

use super::resources::{BundledResource, ResourceBundler};
use super::version::{Resolution, VersionPlan, VersionResolver};

/// Where the artifact will be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactTarget {
    /// Unset for dry runs that never touch a project.
    pub project: Option<String>,
    pub folder: String,
    pub name: String,
}

impl ArtifactTarget {
    /// Fill unspecified destination parts: root folder and the manifest name.
    #[must_use]
    pub fn resolve(spec: &BuildSpec, destination: Option<&Destination>, project: Option<&str>) -> Self {
        let destination = destination.cloned().unwrap_or_default();
        Self {
            project: project.map(str::to_string),
            folder: destination.folder.unwrap_or_else(|| "/".to_string()),
            name: destination.name.unwrap_or_else(|| spec.name.clone()),
        }
    }
}

/// Render the applet creation request.
///
/// Everything in the manifest is carried over except `buildOptions`; a file
/// entry point is inlined as `runSpec.code`.
pub fn artifact_spec(
    spec: &BuildSpec,
    source_dir: &Path,
    resources: &[BundledResource],
    target: &ArtifactTarget,
) -> Result<Value> {
    let mut rendered = match serde_json::to_value(spec)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    rendered.remove("buildOptions");

    if !resources.is_empty() {
        rendered
            .entry("runSpec")
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(Value::Object(run_spec)) = rendered.get_mut("runSpec") {
        if let Some(RunEntry::File(rel)) = spec.run_spec.as_ref().map(|r| &r.entry) {
            let code = std::fs::read_to_string(source_dir.join(rel))?;
            run_spec.remove("file");
            run_spec.insert("code".to_string(), Value::String(code));
        }
        if !resources.is_empty() {
            let depends = resources.iter().map(BundledResource::as_dependency).collect();
            run_spec.insert("bundledDepends".to_string(), Value::Array(depends));
        }
    }

    if let Some(project) = &target.project {
        rendered.insert("project".to_string(), json!(project));
    }
    rendered.insert("folder".to_string(), json!(target.folder));
    rendered.insert("name".to_string(), json!(target.name));
    rendered.insert("parents".to_string(), Value::Bool(true));

    Ok(Value::Object(rendered))
}

/// How an artifact creation should treat its surroundings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishPolicy {
    /// The project outlives the build, so uploaded resources must be removed
    /// on failure.
    pub caller_owned: bool,
    /// Look for same-named applets in the target folder first.
    pub check_collisions: bool,
    /// Replace same-named applets instead of failing.
    pub overwrite: bool,
}

/// Inputs for wrapping an applet into an app.
#[derive(Debug, Clone, Copy)]
pub struct AppRequest<'a> {
    pub applet_id: &'a str,
    pub spec: &'a BuildSpec,
    pub bill_to: Option<&'a str>,
    pub try_update: bool,
    pub publish: bool,
}

/// The app version that was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub published: bool,
    pub updated: bool,
}

pub struct ArtifactPublisher<'p> {
    platform: &'p dyn Platform,
}

impl<'p> ArtifactPublisher<'p> {
    pub fn new(platform: &'p dyn Platform) -> Self {
        Self { platform }
    }

    /// Create the applet; returns its id.
    pub fn publish_artifact(
        &self,
        artifact: &Value,
        target: &ArtifactTarget,
        resources: &[BundledResource],
        policy: PublishPolicy,
    ) -> Result<String> {
        let project = target.project.as_deref().ok_or_else(|| {
            ForgeError::Destination("no project to create the applet in".to_string())
        })?;

        let replaced = if policy.check_collisions {
            let existing = match self.platform.find_applets(project, &target.folder, &target.name)
            {
                Ok(existing) => existing,
                Err(source) => {
                    self.compensate(project, resources, policy);
                    return Err(ForgeError::Publish {
                        stage: "check for existing applets",
                        source,
                    });
                }
            };
            if !existing.is_empty() && !policy.overwrite {
                self.compensate(project, resources, policy);
                return Err(ForgeError::Destination(format!(
                    "an applet already exists at {project}:{}/{} (use --overwrite to replace it)",
                    target.folder.trim_end_matches('/'),
                    target.name
                )));
            }
            existing
        } else {
            Vec::new()
        };

        let applet_id = match self.platform.create_applet(artifact) {
            Ok(id) => id,
            Err(source) => {
                self.compensate(project, resources, policy);
                return Err(ForgeError::Publish {
                    stage: "create applet",
                    source,
                });
            }
        };
        info!(%applet_id, %project, "created applet");

        if !replaced.is_empty() {
            debug!(old = ?replaced, "removing replaced applets");
            if let Err(err) = self.platform.remove_objects(project, &replaced) {
                warn!(old = ?replaced, error = %err, "failed to remove replaced applets");
            }
        }

        Ok(applet_id)
    }

    /// Only projects that outlive the build need their uploads removed.
    fn compensate(&self, project: &str, resources: &[BundledResource], policy: PublishPolicy) {
        if policy.caller_owned {
            ResourceBundler::new(self.platform).discard(project, resources);
        }
    }

    /// Remove an applet that never became an app, with its resources.
    pub fn retract(
        &self,
        project: &str,
        applet_id: &str,
        resources: &[BundledResource],
        policy: PublishPolicy,
    ) {
        if !policy.caller_owned {
            return;
        }
        let mut ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();
        ids.push(applet_id.to_string());
        if let Err(err) = self.platform.remove_objects(project, &ids) {
            warn!(%project, leaked = ?ids, error = %err, "failed to remove unwrapped applet");
        }
    }

    /// Create (or update) the app version wrapping `request.applet_id`.
    ///
    /// A version taken by someone else between lookup and creation moves on
    /// to the next candidate of `plan`.
    pub fn wrap_as_app(&self, plan: &VersionPlan, request: &AppRequest<'_>) -> Result<AppRecord> {
        let resolver = VersionResolver::new(self.platform, request.spec.name.clone());
        let mut start = 0;

        loop {
            let resolution = resolver.resolve_from(plan, start, request.try_update)?;
            let version = resolution.version().to_string();
            let body = app_spec(request, &version);

            let attempt = match &resolution {
                Resolution::Create { .. } => self.platform.create_app(&body),
                Resolution::Update { app_id, .. } => {
                    self.platform.update_app(app_id, &body).map(|()| app_id.clone())
                }
            };

            match attempt {
                Ok(app_id) => {
                    if request.publish {
                        self.platform.publish_app(&app_id, true).map_err(|source| {
                            ForgeError::Publish {
                                stage: "publish app",
                                source,
                            }
                        })?;
                    }
                    info!(%app_id, %version, published = request.publish, "app ready");
                    return Ok(AppRecord {
                        id: app_id,
                        name: request.spec.name.clone(),
                        version,
                        published: request.publish,
                        updated: matches!(resolution, Resolution::Update { .. }),
                    });
                }
                Err(err) if err.is_conflict() => {
                    info!(%version, error = %err, "version taken concurrently; trying next candidate");
                    start = resolution.index() + 1;
                }
                Err(source) => {
                    return Err(ForgeError::Publish {
                        stage: "create app",
                        source,
                    });
                }
            }
        }
    }
}

fn app_spec(request: &AppRequest<'_>, version: &str) -> Value {
    let spec = request.spec;
    let mut body = Map::new();
    body.insert("applet".to_string(), json!(request.applet_id));
    body.insert("name".to_string(), json!(spec.name));
    body.insert("version".to_string(), json!(version));
    if let Some(bill_to) = request.bill_to {
        body.insert("billTo".to_string(), json!(bill_to));
    }
    if let Some(title) = &spec.title {
        body.insert("title".to_string(), json!(title));
    }
    if let Some(summary) = &spec.summary {
        body.insert("summary".to_string(), json!(summary));
    }
    if let Some(description) = &spec.description {
        body.insert("description".to_string(), json!(description));
    }
    if !spec.categories.is_empty() {
        body.insert("categories".to_string(), json!(spec.categories));
    }
    Value::Object(body)
}
