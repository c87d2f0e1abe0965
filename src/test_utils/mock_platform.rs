//! In-memory [`Platform`] for pipeline tests.
//!
//! Records every call by operation name, stores uploaded bytes, and supports
//! fault injection per operation plus a "someone else took this version"
//! race on app creation.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use serde_json::Value;

use crate::platform::{
    ApiError, ApiErrorKind, ApiResult, AppDescription, FileUpload, JobDescription, JobState,
    Platform, RunRequest,
};

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub project: String,
    pub folder: String,
    pub name: String,
    pub media_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StoredApp {
    pub id: String,
    pub name: String,
    pub version: String,
    pub published: bool,
    pub spec: Value,
}

#[derive(Debug, Clone)]
struct StoredJob {
    request: RunRequest,
    states: VecDeque<JobState>,
    log: Vec<String>,
    failure_reason: Option<String>,
}

impl StoredJob {
    fn current(&self) -> JobState {
        self.states.front().copied().unwrap_or(JobState::Done)
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    counter: u64,
    projects: Vec<String>,
    destroyed: Vec<(String, bool)>,
    files: BTreeMap<String, StoredFile>,
    applets: BTreeMap<String, Value>,
    apps: Vec<StoredApp>,
    jobs: BTreeMap<String, StoredJob>,
    runs: Vec<RunRequest>,
    removed: Vec<String>,
    terminated: Vec<String>,
    faults: HashMap<String, ApiError>,
    one_shot_faults: HashMap<String, ApiError>,
    nth_faults: HashMap<String, (usize, ApiError)>,
    races: HashSet<String>,
    job_script: Vec<JobState>,
    job_log: Vec<String>,
    job_failure: Option<String>,
}

impl MockState {
    fn next_id(&mut self, class: &str) -> String {
        self.counter += 1;
        format!("{class}-{:04}", self.counter)
    }
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with an existing app version.
    #[must_use]
    pub fn with_app(self, name: &str, version: &str, published: bool) -> Self {
        {
            let mut state = self.state.lock();
            let id = state.next_id("app");
            state.apps.push(StoredApp {
                id,
                name: name.to_string(),
                version: version.to_string(),
                published,
                spec: Value::Null,
            });
        }
        self
    }

    /// Seed an applet at `project:folder/name`.
    #[must_use]
    pub fn with_applet(self, project: &str, folder: &str, name: &str) -> Self {
        {
            let mut state = self.state.lock();
            let id = state.next_id("applet");
            state.applets.insert(
                id,
                serde_json::json!({ "project": project, "folder": folder, "name": name }),
            );
        }
        self
    }

    /// States reported by successive `describe_job` calls on new jobs; the
    /// last one repeats.
    #[must_use]
    pub fn with_job_script(self, states: Vec<JobState>) -> Self {
        self.state.lock().job_script = states;
        self
    }

    #[must_use]
    pub fn with_job_log(self, lines: &[&str]) -> Self {
        self.state.lock().job_log = lines.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_job_failure(self, reason: &str) -> Self {
        self.state.lock().job_failure = Some(reason.to_string());
        self
    }

    /// Every call to `op` fails with `err`.
    pub fn fail_on(&self, op: &str, err: ApiError) {
        self.state.lock().faults.insert(op.to_string(), err);
    }

    /// The next call to `op` fails with `err`.
    pub fn fail_once(&self, op: &str, err: ApiError) {
        self.state.lock().one_shot_faults.insert(op.to_string(), err);
    }

    /// The `nth` call (1-based) to `op` fails with `err`.
    pub fn fail_nth(&self, op: &str, nth: usize, err: ApiError) {
        self.state.lock().nth_faults.insert(op.to_string(), (nth, err));
    }

    /// Creating `version` loses a race: the version appears published and
    /// the create call reports it already exists.
    pub fn race_on_create(&self, version: &str) {
        self.state.lock().races.insert(version.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// Successfully destroyed projects with their terminate-jobs flag.
    #[must_use]
    pub fn destroyed(&self) -> Vec<(String, bool)> {
        self.state.lock().destroyed.clone()
    }

    #[must_use]
    pub fn projects(&self) -> Vec<String> {
        self.state.lock().projects.clone()
    }

    #[must_use]
    pub fn files(&self) -> Vec<(String, StoredFile)> {
        self.state
            .lock()
            .files
            .iter()
            .map(|(id, file)| (id.clone(), file.clone()))
            .collect()
    }

    #[must_use]
    pub fn file_content(&self, id: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(id).map(|f| f.content.clone())
    }

    #[must_use]
    pub fn applet(&self, id: &str) -> Option<Value> {
        self.state.lock().applets.get(id).cloned()
    }

    #[must_use]
    pub fn applet_ids(&self) -> Vec<String> {
        self.state.lock().applets.keys().cloned().collect()
    }

    #[must_use]
    pub fn apps(&self) -> Vec<StoredApp> {
        self.state.lock().apps.clone()
    }

    #[must_use]
    pub fn removed(&self) -> Vec<String> {
        self.state.lock().removed.clone()
    }

    #[must_use]
    pub fn runs(&self) -> Vec<RunRequest> {
        self.state.lock().runs.clone()
    }

    #[must_use]
    pub fn terminated_jobs(&self) -> Vec<String> {
        self.state.lock().terminated.clone()
    }

    fn enter(&self, op: &str) -> ApiResult<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        state.calls.push(op.to_string());
        if let Some(err) = state.one_shot_faults.remove(op) {
            return Err(err);
        }
        let seen = state.calls.iter().filter(|c| *c == op).count();
        if let Some((nth, err)) = state.nth_faults.get(op) {
            if *nth == seen {
                return Err(err.clone());
            }
        }
        if let Some(err) = state.faults.get(op) {
            return Err(err.clone());
        }
        Ok(state)
    }
}

fn field<'v>(spec: &'v Value, key: &str) -> &'v str {
    spec.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl Platform for MockPlatform {
    fn create_project(&self, _name: &str) -> ApiResult<String> {
        let mut state = self.enter("create_project")?;
        let id = state.next_id("project");
        state.projects.push(id.clone());
        Ok(id)
    }

    fn destroy_project(&self, project: &str, terminate_jobs: bool) -> ApiResult<()> {
        let mut state = self.enter("destroy_project")?;
        state.destroyed.push((project.to_string(), terminate_jobs));
        Ok(())
    }

    fn remove_objects(&self, _project: &str, ids: &[String]) -> ApiResult<()> {
        let mut state = self.enter("remove_objects")?;
        for id in ids {
            state.files.remove(id);
            state.applets.remove(id);
            state.removed.push(id.clone());
        }
        Ok(())
    }

    fn upload_file(&self, upload: &FileUpload<'_>) -> ApiResult<String> {
        let mut state = self.enter("upload_file")?;
        let content = std::fs::read(upload.path)
            .map_err(|e| ApiError::new(ApiErrorKind::Transport, e.to_string()))?;
        let id = state.next_id("file");
        state.files.insert(
            id.clone(),
            StoredFile {
                project: upload.project.to_string(),
                folder: upload.folder.to_string(),
                name: upload.name.to_string(),
                media_type: upload.media_type.to_string(),
                content,
            },
        );
        Ok(id)
    }

    fn create_applet(&self, spec: &Value) -> ApiResult<String> {
        let mut state = self.enter("create_applet")?;
        let id = state.next_id("applet");
        state.applets.insert(id.clone(), spec.clone());
        Ok(id)
    }

    fn find_applets(&self, project: &str, folder: &str, name: &str) -> ApiResult<Vec<String>> {
        let state = self.enter("find_applets")?;
        Ok(state
            .applets
            .iter()
            .filter(|(_, spec)| {
                field(spec, "project") == project
                    && field(spec, "folder") == folder
                    && field(spec, "name") == name
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn describe_app_version(&self, name: &str, version: &str) -> ApiResult<AppDescription> {
        let state = self.enter("describe_app_version")?;
        state
            .apps
            .iter()
            .find(|app| app.name == name && app.version == version)
            .map(describe)
            .ok_or_else(|| ApiError::not_found(format!("app-{name}/{version} not found")))
    }

    fn describe_app(&self, app_id: &str) -> ApiResult<AppDescription> {
        let state = self.enter("describe_app")?;
        state
            .apps
            .iter()
            .find(|app| app.id == app_id)
            .map(describe)
            .ok_or_else(|| ApiError::not_found(format!("{app_id} not found")))
    }

    fn create_app(&self, spec: &Value) -> ApiResult<String> {
        let mut state = self.enter("create_app")?;
        let name = field(spec, "name").to_string();
        let version = field(spec, "version").to_string();

        if state.races.remove(&version) {
            let id = state.next_id("app");
            state.apps.push(StoredApp {
                id,
                name,
                version: version.clone(),
                published: true,
                spec: Value::Null,
            });
            return Err(ApiError::new(
                ApiErrorKind::ResourceExists,
                format!("version {version} already exists"),
            ));
        }
        if state.apps.iter().any(|a| a.name == name && a.version == version) {
            return Err(ApiError::new(
                ApiErrorKind::ResourceExists,
                format!("version {version} already exists"),
            ));
        }

        let id = state.next_id("app");
        state.apps.push(StoredApp {
            id: id.clone(),
            name,
            version,
            published: false,
            spec: spec.clone(),
        });
        Ok(id)
    }

    fn update_app(&self, app_id: &str, spec: &Value) -> ApiResult<()> {
        let mut state = self.enter("update_app")?;
        let app = state
            .apps
            .iter_mut()
            .find(|app| app.id == app_id)
            .ok_or_else(|| ApiError::not_found(format!("{app_id} not found")))?;
        if app.published {
            return Err(ApiError::new(ApiErrorKind::InvalidState, "app is already published"));
        }
        app.spec = spec.clone();
        Ok(())
    }

    fn publish_app(&self, app_id: &str, _make_default: bool) -> ApiResult<()> {
        let mut state = self.enter("publish_app")?;
        let app = state
            .apps
            .iter_mut()
            .find(|app| app.id == app_id)
            .ok_or_else(|| ApiError::not_found(format!("{app_id} not found")))?;
        app.published = true;
        Ok(())
    }

    fn run_app(&self, request: &RunRequest) -> ApiResult<String> {
        let mut state = self.enter("run_app")?;
        let id = state.next_id("job");
        let states = if state.job_script.is_empty() {
            VecDeque::from([JobState::Running, JobState::Done])
        } else {
            state.job_script.iter().copied().collect()
        };
        let job = StoredJob {
            request: request.clone(),
            states,
            log: state.job_log.clone(),
            failure_reason: state.job_failure.clone(),
        };
        state.jobs.insert(id.clone(), job);
        state.runs.push(request.clone());
        Ok(id)
    }

    fn describe_job(&self, job_id: &str) -> ApiResult<JobDescription> {
        let mut state = self.enter("describe_job")?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ApiError::not_found(format!("{job_id} not found")))?;
        let current = job.current();
        if job.states.len() > 1 {
            job.states.pop_front();
        }
        Ok(JobDescription {
            id: job_id.to_string(),
            state: current,
            failure_reason: (current == JobState::Failed)
                .then(|| job.failure_reason.clone().unwrap_or_else(|| "AppError".to_string())),
            failure_message: None,
        })
    }

    fn job_log(&self, job_id: &str, offset: usize) -> ApiResult<Vec<String>> {
        let state = self.enter("job_log")?;
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| ApiError::not_found(format!("{job_id} not found")))?;
        Ok(job.log.iter().skip(offset).cloned().collect())
    }

    fn terminate_job(&self, job_id: &str) -> ApiResult<()> {
        let mut state = self.enter("terminate_job")?;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ApiError::not_found(format!("{job_id} not found")))?;
        job.states = VecDeque::from([JobState::Terminated]);
        state.terminated.push(job_id.to_string());
        Ok(())
    }

    fn find_active_jobs(&self, project: &str) -> ApiResult<Vec<String>> {
        let state = self.enter("find_active_jobs")?;
        Ok(state
            .jobs
            .iter()
            .filter(|(_, job)| job.request.project == project && !job.current().is_terminal())
            .map(|(id, _)| id.clone())
            .collect())
    }
}

fn describe(app: &StoredApp) -> AppDescription {
    AppDescription {
        id: app.id.clone(),
        name: app.name.clone(),
        version: app.version.clone(),
        published: app.published.then_some(1_700_000_000_000),
    }
}
