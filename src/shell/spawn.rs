//! Launching external programs.
//!
//! Without stdin the program gets a pseudo-terminal sized from the session's
//! terminal settings, so tools keep their interactive formatting. A heredoc
//! payload switches to plain pipes: the payload is written to stdin, stdin is
//! closed, and stdout and stderr are merged into one output stream.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use super::TermSettings;
use super::events::{Emitter, ShellEvent};
use crate::error::{Error, Result};
use crate::expand::Env;
use crate::parse::join_words;

const CHUNK: usize = 4096;

/// How a command ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandExit {
    pub exit_code: i32,
    /// Name of the terminating signal as `nix` spells it, e.g. `SIGTERM`.
    pub signal: Option<String>,
}

impl CommandExit {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            signal: None,
        }
    }

    pub fn with_signal(signal: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            signal: Some(signal.into()),
        }
    }

    pub fn signaled(&self) -> bool {
        self.signal.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn is_success(&self) -> bool {
        !self.signaled() && self.exit_code == 0
    }

    /// `Ok(self)` on success, `Err(Error::CommandFailed)` otherwise.
    pub fn into_result(self) -> Result<CommandExit> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed(self))
        }
    }
}

impl fmt::Display for CommandExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signal {
            Some(signal) if !signal.is_empty() => write!(f, "terminated by signal {signal}"),
            _ => write!(f, "exited with code {}", self.exit_code),
        }
    }
}

/// Everything needed to start one program.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment of the child; nothing is inherited beyond it.
    pub env: Env,
    pub cwd: PathBuf,
    pub term: TermSettings,
    pub stdin: Option<String>,
}

impl SpawnRequest {
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Runs a program, streaming its output as [`ShellEvent::Data`].
///
/// Resolves to `Ok` only for a zero exit; a non-zero exit or a signal is
/// `Err(Error::CommandFailed)`, a launch failure is `Err(Error::Spawn)`.
#[async_trait(?Send)]
pub trait Spawner {
    async fn spawn(&self, request: SpawnRequest, output: &Emitter<ShellEvent>) -> Result<CommandExit>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

#[async_trait(?Send)]
impl Spawner for ProcessSpawner {
    async fn spawn(&self, mut request: SpawnRequest, output: &Emitter<ShellEvent>) -> Result<CommandExit> {
        log::debug!(
            "spawn {} in {}",
            join_words(&request.argv()),
            request.cwd.display()
        );
        if locate(&request.program, &request.env, &request.cwd).is_none() {
            return Err(Error::Spawn {
                program: request.program,
                message: "command not found".to_string(),
                not_found: true,
            });
        }
        let exit = match request.stdin.take() {
            Some(payload) => spawn_piped(request, payload, output).await?,
            None => spawn_pty(request, output).await?,
        };
        log::debug!("exit: {exit}");
        exit.into_result()
    }
}

/// Prints the command line instead of running it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunSpawner;

#[async_trait(?Send)]
impl Spawner for DryRunSpawner {
    async fn spawn(&self, request: SpawnRequest, output: &Emitter<ShellEvent>) -> Result<CommandExit> {
        let line = format!("{}\r\n", join_words(&request.argv()));
        output.emit(&ShellEvent::Data(line.into_bytes()));
        Ok(CommandExit::success())
    }
}

/// Where `program` would be launched from. Names with a slash are taken
/// relative to `cwd`; bare names are searched on the child's `PATH`.
fn locate(program: &str, env: &Env, cwd: &Path) -> Option<PathBuf> {
    if program.contains('/') {
        let path = cwd.join(program);
        return path.exists().then_some(path);
    }
    let search = env.get("PATH")?;
    std::env::split_paths(search)
        .map(|dir| cwd.join(dir).join(program))
        .find(|candidate| candidate.is_file())
}

fn launch_error<E: fmt::Display>(program: &str) -> impl Fn(E) -> Error + '_ {
    move |e| Error::Spawn {
        program: program.to_string(),
        message: e.to_string(),
        not_found: false,
    }
}

async fn spawn_pty(request: SpawnRequest, output: &Emitter<ShellEvent>) -> Result<CommandExit> {
    let program = request.program.as_str();
    let pair = native_pty_system()
        .openpty(PtySize {
            rows: request.term.rows,
            cols: request.term.cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(launch_error(program))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(&request.args);
    cmd.cwd(&request.cwd);
    cmd.env_clear();
    for (key, value) in &request.env {
        cmd.env(key, value);
    }
    cmd.env("TERM", &request.term.name);

    let mut child = pair.slave.spawn_command(cmd).map_err(launch_error(program))?;
    // Our copy of the slave must go, or the master never sees EOF.
    drop(pair.slave);
    let mut reader = pair.master.try_clone_reader().map_err(launch_error(program))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let pump = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // EIO once the child side is closed.
                Err(_) => break,
            }
        }
    });
    let waiter = tokio::task::spawn_blocking(move || wait_pty_child(&mut *child));

    while let Some(chunk) = rx.recv().await {
        output.emit(&ShellEvent::Data(chunk));
    }
    let exit = waiter.await.map_err(std::io::Error::other)??;
    let _ = pump.await;
    drop(pair.master);
    Ok(exit)
}

/// Reap the pty child with `waitpid` so a signal is named the same way as on
/// the piped path (`SIGTERM`, not the `strsignal` text portable-pty reports).
#[cfg(unix)]
fn wait_pty_child<C: portable_pty::Child + ?Sized>(child: &mut C) -> std::io::Result<CommandExit> {
    use nix::errno::Errno;
    use nix::sys::wait::{WaitStatus, waitpid};
    use nix::unistd::Pid;

    let Some(pid) = child.process_id() else {
        return child.wait().map(exit_from_pty_status);
    };
    let pid = Pid::from_raw(pid as i32);
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(CommandExit::with_code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(CommandExit::with_signal(signal.as_str())),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(not(unix))]
fn wait_pty_child<C: portable_pty::Child + ?Sized>(child: &mut C) -> std::io::Result<CommandExit> {
    child.wait().map(exit_from_pty_status)
}

fn exit_from_pty_status(status: portable_pty::ExitStatus) -> CommandExit {
    match status.signal() {
        Some(signal) => CommandExit::with_signal(signal),
        None => CommandExit::with_code(status.exit_code() as i32),
    }
}

async fn spawn_piped(request: SpawnRequest, payload: String, output: &Emitter<ShellEvent>) -> Result<CommandExit> {
    let mut child = tokio::process::Command::new(&request.program)
        .args(&request.args)
        .current_dir(&request.cwd)
        .env_clear()
        .envs(&request.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Spawn {
            program: request.program.clone(),
            message: e.to_string(),
            not_found: e.kind() == ErrorKind::NotFound,
        })?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_stream(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stream(stderr, tx.clone()));
    }
    drop(tx);

    if let Some(mut stdin) = child.stdin.take() {
        // A child that exits without reading closes the pipe early.
        if let Err(e) = stdin.write_all(payload.as_bytes()).await
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }
    }

    while let Some(chunk) = rx.recv().await {
        output.emit(&ShellEvent::Data(chunk));
    }
    let status = child.wait().await?;
    Ok(exit_from_status(status))
}

async fn forward_stream<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}

fn exit_from_status(status: std::process::ExitStatus) -> CommandExit {
    match (status.code(), signal_name(&status)) {
        (Some(code), _) => CommandExit::with_code(code),
        (None, Some(signal)) => CommandExit::with_signal(signal),
        (None, None) => CommandExit::with_code(1),
    }
}

#[cfg(unix)]
fn signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;
    let raw = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(raw)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {raw}")),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}
