//! Synchronous execution for `$(...)`.
//!
//! Command substitution happens in the middle of expansion, which is not
//! async, so statements run to completion with blocking I/O and only their
//! stdout is kept. Output is never streamed to listeners.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::builtins::change_dir;
use crate::expand::{CommandSubstitution, Env, Expander};
use crate::parse::{Statement, join_words};

/// A throwaway session inheriting the parent's directory and environment.
///
/// Shell-local variables start empty and assignments stay inside the
/// subshell.
#[derive(Debug, Clone)]
pub struct SyncSubshell {
    cwd: PathBuf,
    env: Env,
}

impl SyncSubshell {
    pub fn new(cwd: PathBuf, env: Env) -> Self {
        Self { cwd, env }
    }
}

impl CommandSubstitution for SyncSubshell {
    fn capture(&self, statements: &[Statement]) -> String {
        let mut cwd = self.cwd.clone();
        let mut env = self.env.clone();
        let mut vars = Env::new();
        let mut stdout = String::new();

        for statement in statements {
            let resolved = {
                let nested = SyncSubshell::new(cwd.clone(), env.clone());
                Expander::new(&vars, &env, &nested).expand(statement)
            };
            let Some(program) = resolved.program else {
                vars.extend(resolved.env.clone());
                env.extend(resolved.env);
                continue;
            };

            if program == "cd" {
                match change_dir(&cwd, &resolved.args, &env) {
                    Ok(dir) => cwd = dir,
                    Err(e) => log::warn!("command substitution: {e}"),
                }
                continue;
            }

            let mut child_env = env.clone();
            child_env.extend(resolved.env);
            let result = Command::new(&program)
                .args(&resolved.args)
                .current_dir(&cwd)
                .env_clear()
                .envs(&child_env)
                .stdin(Stdio::null())
                .output();
            match result {
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    if !stderr.trim().is_empty() {
                        log::warn!("command substitution `{program}`: {}", stderr.trim_end());
                    }
                    if !out.status.success() {
                        log::debug!("command substitution `{program}` exited with {}", out.status);
                    }
                    stdout.push_str(&String::from_utf8_lossy(&out.stdout));
                }
                Err(e) => {
                    let mut argv = vec![program];
                    argv.extend(resolved.args);
                    log::warn!("command substitution: failed to run {}: {e}", join_words(&argv));
                }
            }
        }
        stdout
    }
}
