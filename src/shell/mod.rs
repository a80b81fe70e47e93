//! The interactive shell session that runs script entries.
//!
//! A [`Shell`] owns a working directory, an exported environment and a set
//! of shell-local variables. Each entry is parsed, expanded and then handed
//! to a builtin or to the [`Spawner`]. Everything the session produces is
//! emitted as [`ShellEvent`]s.

pub mod builtins;
pub mod entry;
pub mod events;
pub mod spawn;
pub mod subshell;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use builtins::Builtin;
pub use entry::{CommandInput, EntryOptions, FailPolicy, Precedence, ScriptEntry};
pub use events::{Capture, Emitter, ShellEvent};
pub use spawn::{CommandExit, DryRunSpawner, ProcessSpawner, SpawnRequest, Spawner};
pub use subshell::SyncSubshell;

use crate::error::{Error, Result};
use crate::expand::{Env, Expander, Resolved};
use crate::parse::{self, Statement};

/// Shown after a command that exited cleanly.
pub const SUCCESS_MARKER: &str = "\u{2756}";

/// Terminal presented to spawned programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSettings {
    pub name: String,
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSettings {
    fn default() -> Self {
        Self {
            name: "xterm-color".to_string(),
            cols: 80,
            rows: 30,
        }
    }
}

/// The part of a session that carries over from one action to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellState {
    pub env: Env,
    pub vars: Env,
    pub vars_precedence: BTreeMap<String, Precedence>,
}

impl ShellState {
    /// Bind `delta` at `level`.
    ///
    /// A name bound with `Override` keeps its value against any later
    /// non-override binding. Returns the names that were skipped.
    pub fn assign(&mut self, delta: Env, level: Precedence) -> Vec<String> {
        let mut skipped = Vec::new();
        for (name, value) in delta {
            if self.vars_precedence.get(&name) == Some(&Precedence::Override)
                && level != Precedence::Override
            {
                skipped.push(name);
                continue;
            }
            if level != Precedence::Local {
                self.env.insert(name.clone(), value.clone());
            }
            self.vars.insert(name.clone(), value);
            self.vars_precedence.insert(name, level);
        }
        skipped
    }
}

pub struct Shell {
    cwd: PathBuf,
    state: ShellState,
    term: TermSettings,
    spawner: Rc<dyn Spawner>,
    builtins: Vec<Rc<dyn Builtin>>,
    output: Emitter<ShellEvent>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("cwd", &self.cwd)
            .field("state", &self.state)
            .field("term", &self.term)
            .field(
                "builtins",
                &self.builtins.iter().map(|b| b.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Shell {
    /// A session rooted at `cwd` with the current process environment.
    pub fn new(cwd: impl Into<PathBuf>, term: TermSettings) -> Self {
        Self {
            cwd: cwd.into(),
            state: ShellState {
                env: std::env::vars().collect(),
                ..ShellState::default()
            },
            term,
            spawner: Rc::new(ProcessSpawner),
            builtins: Vec::new(),
            output: Emitter::new(),
        }
    }

    pub fn with_spawner(mut self, spawner: Rc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Make `builtin` available to every later entry, replacing any
    /// extension of the same name.
    pub fn install(&mut self, builtin: Rc<dyn Builtin>) {
        self.builtins.retain(|b| b.name() != builtin.name());
        self.builtins.push(builtin);
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    pub fn set_state(&mut self, state: ShellState) {
        self.state = state;
    }

    pub fn output(&self) -> &Emitter<ShellEvent> {
        &self.output
    }

    pub fn subscribe(&self, listener: impl FnMut(&ShellEvent) + 'static) {
        self.output.subscribe(listener);
    }

    /// Stream everything this shell emits to `out`.
    pub fn pipe<W: Write + 'static>(&self, out: W) {
        self.output.pipe(out);
    }

    /// Re-emit everything this shell emits on `sink`.
    pub fn forward_to(&self, sink: &Emitter<ShellEvent>) {
        self.output.forward_to(sink);
    }

    /// A new session sharing this one's directory, environment, terminal,
    /// spawner and builtins, with its own variables and listeners.
    ///
    /// With `state`, the child starts from that state instead.
    pub fn fork(&self, state: Option<ShellState>) -> Shell {
        let state = state.unwrap_or_else(|| ShellState {
            env: self.state.env.clone(),
            ..ShellState::default()
        });
        Shell {
            cwd: self.cwd.clone(),
            state,
            term: self.term.clone(),
            spawner: Rc::clone(&self.spawner),
            builtins: self.builtins.clone(),
            output: Emitter::new(),
        }
    }

    /// The blocking subshell used for command substitution.
    pub fn fork_sync(&self) -> SyncSubshell {
        SyncSubshell::new(self.cwd.clone(), self.state.env.clone())
    }

    /// Run entries in order, stopping at the first one that fails.
    pub async fn run_script(&mut self, entries: &[ScriptEntry]) -> Result<()> {
        for entry in entries {
            self.run(entry).await?;
        }
        Ok(())
    }

    /// Run one entry.
    ///
    /// Parse errors and entries with more than one statement fail without
    /// emitting anything. Pure assignments update the session silently.
    /// Commands emit a start message, their output, and one end message.
    pub async fn run(&mut self, entry: &ScriptEntry) -> Result<CommandExit> {
        let (lines, options) = entry.normalize();
        self.state
            .env
            .insert("PWD".to_string(), self.cwd.display().to_string());

        let parsed = parse::parse(&lines)?;
        let statement = match parsed.statements.as_slice() {
            [] => return Ok(CommandExit::success()),
            [statement] => statement,
            _ => return Err(Error::MultipleStatements(parsed.command)),
        };

        let resolved = self.expand(statement);
        let Some(program) = resolved.program.clone() else {
            let level = options.precedence.unwrap_or_default();
            for name in self.state.assign(resolved.env, level) {
                log::debug!("{name} is bound with override precedence; keeping its value");
            }
            return Ok(CommandExit::success());
        };

        self.output
            .emit(&ShellEvent::Message(format!("$ {}", parsed.command)));
        match self.dispatch(program, resolved, parsed.stdin).await {
            Ok(exit) => {
                self.report(&exit);
                Ok(exit)
            }
            Err(err) => {
                self.report_failure(&err);
                match options.fail {
                    FailPolicy::Continue => {
                        self.output
                            .emit(&ShellEvent::Message("(continuing anyway)".to_string()));
                        Ok(err.exit())
                    }
                    FailPolicy::Stop => Err(err),
                }
            }
        }
    }

    fn expand(&self, statement: &Statement) -> Resolved {
        let subshell = self.fork_sync();
        Expander::new(&self.state.vars, &self.state.env, &subshell).expand(statement)
    }

    async fn dispatch(&mut self, program: String, resolved: Resolved, stdin: Option<String>) -> Result<CommandExit> {
        if let Some(result) = self.try_builtin(&program, &resolved.args).await {
            log::debug!("builtin {program} handled in {}", self.cwd.display());
            return result;
        }
        let mut env = self.state.env.clone();
        env.extend(resolved.env);
        let request = SpawnRequest {
            program,
            args: resolved.args,
            env,
            cwd: self.cwd.clone(),
            term: self.term.clone(),
            stdin,
        };
        self.spawner.spawn(request, &self.output).await
    }

    /// Run `name` as a builtin, or `None` if there is no such builtin.
    pub async fn try_builtin(&mut self, name: &str, args: &[String]) -> Option<Result<CommandExit>> {
        if name == "cd" {
            return Some(self.cd(args));
        }
        let builtin = self.builtins.iter().find(|b| b.name() == name).cloned()?;
        Some(builtin.invoke(args, &self.output).await)
    }

    fn cd(&mut self, args: &[String]) -> Result<CommandExit> {
        self.cwd = builtins::change_dir(&self.cwd, args, &self.state.env)?;
        Ok(CommandExit::success())
    }

    fn report(&self, exit: &CommandExit) {
        let message = match &exit.signal {
            Some(signal) if !signal.is_empty() => format!("Signal {signal}"),
            _ if exit.exit_code != 0 => format!("\nExit {}.", exit.exit_code),
            _ => SUCCESS_MARKER.to_string(),
        };
        self.output.emit(&ShellEvent::Message(message));
    }

    fn report_failure(&self, err: &Error) {
        if !matches!(err, Error::CommandFailed(_)) {
            self.output.emit(&ShellEvent::Message(err.to_string()));
        }
        self.report(&err.exit());
    }
}
