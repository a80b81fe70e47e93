//! Running named actions one after another in a shared build directory.
//!
//! Every action gets a fresh shell rooted in the build directory. When an
//! action succeeds its session state is kept and the next action's shell
//! starts from it, so variables set by `setup` are visible to `build`.

pub mod build_dir;
pub mod report;
pub mod select;

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;

pub use build_dir::{BuildDirState, BuildDirectory, default_build_dir};
pub use select::resolve_selectors;

use crate::error::{Error, Result};
use crate::scripts::{Script, Scripts};
use crate::shell::{
    Builtin, CommandExit, DryRunSpawner, Emitter, ProcessSpawner, Shell, ShellEvent, ShellState, Spawner,
    TermSettings,
};

/// Name of the builtin that runs other actions from inside a script.
pub const RUN_ACTIONS: &str = "run-actions";

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub build_dir: PathBuf,
    /// Remove the build directory before the first action runs.
    pub clean: bool,
    /// Print commands instead of running them.
    pub dry_run: bool,
    /// Install the `run-actions` builtin in action shells.
    pub interactive: bool,
    /// Completion summaries show elapsed time above this.
    pub report_threshold: Duration,
    pub term: TermSettings,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            clean: false,
            dry_run: false,
            interactive: false,
            report_threshold: Duration::from_secs(1),
            term: TermSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Err,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    ScriptsLoaded {
        source: String,
    },
    ScriptStart {
        script_name: String,
        start_time: DateTime<Local>,
    },
    ScriptEnd {
        script_name: String,
        status: JobStatus,
        err: Option<String>,
        start_time: DateTime<Local>,
        end_time: DateTime<Local>,
        total_time: Duration,
    },
}

impl BatchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::ScriptsLoaded { .. } => "scripts:loaded",
            BatchEvent::ScriptStart { .. } => "script:start",
            BatchEvent::ScriptEnd { .. } => "script:end",
        }
    }
}

/// How one action ended.
#[derive(Debug)]
pub struct JobOutcome {
    pub name: String,
    pub status: JobStatus,
    pub error: Option<Error>,
    pub total_time: Duration,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.status == JobStatus::Ok
    }
}

/// Runs actions from a loaded registry.
///
/// Clones share the same registry, build directory and session state.
#[derive(Clone)]
pub struct Batch {
    inner: Rc<Inner>,
}

struct Inner {
    config: BatchConfig,
    scripts: OnceCell<Scripts>,
    build_dir: RefCell<BuildDirectory>,
    last_state: RefCell<Option<ShellState>>,
    running: RefCell<BTreeSet<String>>,
    template: Shell,
    events: Emitter<BatchEvent>,
}

impl Batch {
    pub fn new(config: BatchConfig) -> Self {
        let spawner: Rc<dyn Spawner> = if config.dry_run {
            Rc::new(DryRunSpawner)
        } else {
            Rc::new(ProcessSpawner)
        };
        let template = Shell::new(&config.build_dir, config.term.clone()).with_spawner(spawner);
        Self {
            inner: Rc::new(Inner {
                build_dir: RefCell::new(BuildDirectory::new(&config.build_dir)),
                config,
                scripts: OnceCell::new(),
                last_state: RefCell::new(None),
                running: RefCell::new(BTreeSet::new()),
                template,
                events: Emitter::new(),
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &Emitter<BatchEvent> {
        &self.inner.events
    }

    pub fn subscribe(&self, listener: impl FnMut(&BatchEvent) + 'static) {
        self.inner.events.subscribe(listener);
    }

    pub fn build_dir(&self) -> PathBuf {
        self.inner.build_dir.borrow().path().to_path_buf()
    }

    pub fn scripts(&self) -> Option<&Scripts> {
        self.inner.scripts.get()
    }

    /// State left by the last successful action.
    pub fn last_state(&self) -> Option<ShellState> {
        self.inner.last_state.borrow().clone()
    }

    /// Install the registry. A batch accepts exactly one.
    pub fn load_scripts(&self, scripts: Scripts) -> Result<()> {
        self.install_scripts(scripts, "<registry>".to_string())
    }

    /// Load and install the registry at `path`.
    pub fn load_scripts_from(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.inner.scripts.get().is_some() {
            return Err(Error::ScriptsAlreadyLoaded);
        }
        let path = path.as_ref();
        let scripts = Scripts::from_path(path)?;
        self.install_scripts(scripts, path.display().to_string())
    }

    fn install_scripts(&self, scripts: Scripts, source: String) -> Result<()> {
        self.inner
            .scripts
            .set(scripts)
            .map_err(|_| Error::ScriptsAlreadyLoaded)?;
        log::info!("loaded scripts from {source}");
        self.inner.events.emit(&BatchEvent::ScriptsLoaded { source });
        Ok(())
    }

    /// Expand selectors against the primary action names.
    pub fn parse_actions<S: AsRef<str>>(&self, selectors: &[S]) -> Result<Vec<String>> {
        let names = match self.scripts() {
            Some(scripts) => scripts.names(),
            None if selectors.is_empty() => return Err(Error::NoScripts),
            None => Vec::new(),
        };
        resolve_selectors(&names, selectors)
    }

    /// A shell for the next action.
    ///
    /// The first call prepares the build directory. The shell starts from
    /// the state of the last successful action, if any.
    pub fn create_shell(&self) -> Result<Shell> {
        {
            let mut dir = self.inner.build_dir.borrow_mut();
            if dir.state() == BuildDirState::Uninitialized {
                if self.inner.config.clean {
                    dir.clean()?;
                }
                dir.start()?;
            }
        }
        let mut shell = self.inner.template.fork(self.last_state());
        if self.inner.config.interactive {
            shell.install(Rc::new(RunActions { batch: self.clone() }));
        }
        Ok(shell)
    }

    /// Prepare `action` to run.
    ///
    /// The returned job has not started; subscribe to its shell first, then
    /// await [`Job::run`].
    pub fn start_job(&self, action: &str) -> Result<Job> {
        let script = match self.scripts() {
            Some(scripts) => scripts.get(action),
            None => Scripts::default().get(action),
        };
        let guard = RunningGuard::acquire(self, action)?;
        let shell = self.create_shell()?;
        let start_time = Local::now();
        log::info!("starting '{action}'");
        self.inner.events.emit(&BatchEvent::ScriptStart {
            script_name: action.to_string(),
            start_time,
        });
        Ok(Job {
            name: action.to_string(),
            script,
            shell,
            batch: self.clone(),
            start_time,
            started: Instant::now(),
            _guard: guard,
        })
    }

    /// Run `actions` in order with their output forwarded to `sink`.
    ///
    /// Stops after the first action that fails; outcomes cover the actions
    /// that ran.
    pub async fn run_actions(&self, actions: &[String], sink: &Emitter<ShellEvent>) -> Result<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();
        for action in actions {
            let job = self.start_job(action)?;
            job.shell().forward_to(sink);
            let outcome = job.run().await;
            let ok = outcome.is_ok();
            outcomes.push(outcome);
            if !ok {
                break;
            }
        }
        Ok(outcomes)
    }

    fn finish(&self, job: &Job, result: Result<()>) -> JobOutcome {
        let end_time = Local::now();
        let total_time = job.started.elapsed();
        let status = match &result {
            Ok(()) => {
                log::debug!("keeping session state of '{}'", job.name);
                self.inner.last_state.replace(Some(job.shell.state().clone()));
                JobStatus::Ok
            }
            Err(_) => JobStatus::Err,
        };
        let error = result.err();
        match &error {
            Some(e) => log::warn!("'{}' failed: {e}", job.name),
            None => log::info!("'{}' completed", job.name),
        }
        self.inner.events.emit(&BatchEvent::ScriptEnd {
            script_name: job.name.clone(),
            status,
            err: error.as_ref().map(ToString::to_string),
            start_time: job.start_time,
            end_time,
            total_time,
        });
        JobOutcome {
            name: job.name.clone(),
            status,
            error,
            total_time,
        }
    }
}

/// Marks an action as running until dropped.
struct RunningGuard {
    batch: Batch,
    name: String,
}

impl RunningGuard {
    fn acquire(batch: &Batch, name: &str) -> Result<Self> {
        if !batch.inner.running.borrow_mut().insert(name.to_string()) {
            return Err(Error::ActionRunning(name.to_string()));
        }
        Ok(Self {
            batch: batch.clone(),
            name: name.to_string(),
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.batch.inner.running.borrow_mut().remove(&self.name);
    }
}

/// One action, ready to run.
pub struct Job {
    name: String,
    script: Script,
    shell: Shell,
    batch: Batch,
    start_time: DateTime<Local>,
    started: Instant,
    _guard: RunningGuard,
}

impl Job {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub async fn run(mut self) -> JobOutcome {
        let script = std::mem::take(&mut self.script);
        let result = self.shell.run_script(&script).await;
        self.script = script;
        self.batch.finish(&self, result)
    }
}

/// `run-actions [SELECTOR]...`: run other actions from inside a script.
struct RunActions {
    batch: Batch,
}

#[async_trait(?Send)]
impl Builtin for RunActions {
    fn name(&self) -> &str {
        RUN_ACTIONS
    }

    async fn invoke(&self, args: &[String], output: &Emitter<ShellEvent>) -> Result<CommandExit> {
        let actions = self.batch.parse_actions(args)?;
        let outcomes = self.batch.run_actions(&actions, output).await?;
        match outcomes.iter().find(|o| !o.is_ok()) {
            Some(failed) => Err(Error::Builtin(format!(
                "{RUN_ACTIONS}: '{}' failed",
                failed.name
            ))),
            None => Ok(CommandExit::success()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ScriptEntry;

    fn dry_batch(dir: &Path) -> Batch {
        Batch::new(BatchConfig {
            build_dir: dir.join("build"),
            dry_run: true,
            ..BatchConfig::default()
        })
    }

    fn registry(json: &str) -> Scripts {
        Scripts::from_json_str(json).unwrap()
    }

    fn event_names(batch: &Batch) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        batch.subscribe(move |event| s.borrow_mut().push(event.name().to_string()));
        seen
    }

    #[test]
    fn loading_twice_fails() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        batch.load_scripts(Scripts::default()).unwrap();
        assert!(matches!(
            batch.load_scripts(Scripts::default()),
            Err(Error::ScriptsAlreadyLoaded)
        ));
    }

    #[test]
    fn load_emits_event() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        let seen = event_names(&batch);
        batch.load_scripts(Scripts::default()).unwrap();
        assert_eq!(*seen.borrow(), vec!["scripts:loaded"]);
    }

    #[test]
    fn parse_actions_without_registry() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        assert!(matches!(batch.parse_actions::<&str>(&[]), Err(Error::NoScripts)));
        assert_eq!(batch.parse_actions(&["echo hi"]).unwrap(), vec!["echo hi"]);
    }

    #[test]
    fn create_shell_prepares_build_dir() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        let shell = batch.create_shell().unwrap();
        assert!(batch.build_dir().is_dir());
        assert_eq!(shell.cwd(), batch.build_dir());
    }

    #[test]
    fn clean_runs_once_before_first_shell() {
        let root = tempfile::tempdir().unwrap();
        let build = root.path().join("build");
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("stale"), "x").unwrap();
        let batch = Batch::new(BatchConfig {
            build_dir: build.clone(),
            clean: true,
            dry_run: true,
            ..BatchConfig::default()
        });
        batch.create_shell().unwrap();
        assert!(!build.join("stale").exists());
        std::fs::write(build.join("fresh"), "x").unwrap();
        batch.create_shell().unwrap();
        assert!(build.join("fresh").exists());
    }

    #[test]
    fn running_action_cannot_start_twice() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        let job = batch.start_job("build").unwrap();
        assert!(matches!(batch.start_job("build"), Err(Error::ActionRunning(_))));
        drop(job);
        assert!(batch.start_job("build").is_ok());
    }

    #[tokio::test]
    async fn events_bracket_each_job() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        batch
            .load_scripts(registry(r#"{"scripts": {"a": "echo a", "b": "echo b"}}"#))
            .unwrap();
        let seen = event_names(&batch);
        let outcomes = batch
            .run_actions(&batch.parse_actions::<&str>(&[]).unwrap(), &Emitter::new())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            *seen.borrow(),
            vec!["script:start", "script:end", "script:start", "script:end"]
        );
    }

    #[tokio::test]
    async fn state_carries_across_actions() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        batch
            .load_scripts(registry(
                r#"{"scripts": {"setup": ["FOO=bar"], "use": ["echo $FOO"]}}"#,
            ))
            .unwrap();
        let sink = Emitter::new();
        let capture = crate::shell::Capture::new();
        sink.pipe(capture.clone());
        batch
            .run_actions(&["setup".to_string(), "use".to_string()], &sink)
            .await
            .unwrap();
        assert!(capture.contents().contains("echo bar\r\n"));
        assert_eq!(batch.last_state().unwrap().env["FOO"], "bar");
    }

    #[tokio::test]
    async fn failed_action_keeps_previous_state_and_stops() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        batch
            .load_scripts(registry(
                r#"{"scripts": {"ok": ["A=1"], "bad": ["B=2", "cd"], "never": "echo never"}}"#,
            ))
            .unwrap();
        let outcomes = batch
            .run_actions(&batch.parse_actions::<&str>(&[]).unwrap(), &Emitter::new())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        let state = batch.last_state().unwrap();
        assert_eq!(state.env["A"], "1");
        assert!(!state.env.contains_key("B"));
    }

    #[tokio::test]
    async fn run_actions_builtin_runs_nested_actions() {
        let root = tempfile::tempdir().unwrap();
        let batch = Batch::new(BatchConfig {
            build_dir: root.path().join("build"),
            dry_run: true,
            interactive: true,
            ..BatchConfig::default()
        });
        batch
            .load_scripts(registry(
                r#"{"scripts": {"inner": "echo inner"}, "recipes": {"outer": "run-actions inner"}}"#,
            ))
            .unwrap();
        let sink = Emitter::new();
        let capture = crate::shell::Capture::new();
        sink.pipe(capture.clone());
        let outcomes = batch.run_actions(&["outer".to_string()], &sink).await.unwrap();
        assert!(outcomes[0].is_ok());
        assert!(capture.contents().contains("echo inner\r\n"));
    }

    #[tokio::test]
    async fn run_actions_builtin_refuses_reentry() {
        let root = tempfile::tempdir().unwrap();
        let batch = Batch::new(BatchConfig {
            build_dir: root.path().join("build"),
            dry_run: true,
            interactive: true,
            ..BatchConfig::default()
        });
        batch
            .load_scripts(registry(r#"{"scripts": {"loop": "run-actions loop"}}"#))
            .unwrap();
        let outcomes = batch
            .run_actions(&["loop".to_string()], &Emitter::new())
            .await
            .unwrap();
        assert!(!outcomes[0].is_ok());
        assert!(matches!(outcomes[0].error, Some(Error::ActionRunning(_))));
    }

    #[tokio::test]
    async fn unknown_action_runs_as_literal_command() {
        let root = tempfile::tempdir().unwrap();
        let batch = dry_batch(root.path());
        batch.load_scripts(Scripts::default()).unwrap();
        let job = batch.start_job("echo literal").unwrap();
        assert_eq!(job.script(), &vec![ScriptEntry::Line("echo literal".into())]);
        assert!(job.run().await.is_ok());
    }
}
