//! Commands handled inside the shell instead of by a child process.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::events::{Emitter, ShellEvent};
use super::spawn::CommandExit;
use crate::error::{Error, Result};
use crate::expand::Env;

/// An extension command installed on a shell.
///
/// Builtins are looked up by name before any process is spawned. Output goes
/// to `output`, the running shell's emitter.
#[async_trait(?Send)]
pub trait Builtin {
    fn name(&self) -> &str;

    async fn invoke(&self, args: &[String], output: &Emitter<ShellEvent>) -> Result<CommandExit>;
}

/// Resolve the target of `cd` against `cwd`.
///
/// Exactly one argument is accepted. A leading `~` uses `HOME` from `env`.
/// The directory is not required to exist.
pub fn change_dir(cwd: &Path, args: &[String], env: &Env) -> Result<PathBuf> {
    let [target] = args else {
        return Err(Error::Builtin(format!(
            "cd: expected exactly one argument, got {}",
            args.len()
        )));
    };
    let target = shellexpand::tilde_with_context(target.as_str(), || env.get("HOME"));
    Ok(normalize(&cwd.join(&*target)))
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn relative_target() {
        let dir = change_dir(Path::new("/work"), &args(&["sub/dir"]), &Env::new()).unwrap();
        assert_eq!(dir, PathBuf::from("/work/sub/dir"));
    }

    #[test]
    fn absolute_target_replaces_cwd() {
        let dir = change_dir(Path::new("/work"), &args(&["/opt"]), &Env::new()).unwrap();
        assert_eq!(dir, PathBuf::from("/opt"));
    }

    #[test]
    fn dot_dot_is_resolved() {
        let dir = change_dir(Path::new("/work/a"), &args(&["../b/./c"]), &Env::new()).unwrap();
        assert_eq!(dir, PathBuf::from("/work/b/c"));
    }

    #[test]
    fn tilde_uses_session_home() {
        let env: Env = [("HOME".to_string(), "/home/me".to_string())].into_iter().collect();
        let dir = change_dir(Path::new("/work"), &args(&["~/src"]), &env).unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/src"));
    }

    #[test]
    fn missing_directory_is_accepted() {
        assert!(change_dir(Path::new("/work"), &args(&["does-not-exist"]), &Env::new()).is_ok());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(matches!(
            change_dir(Path::new("/work"), &[], &Env::new()),
            Err(Error::Builtin(_))
        ));
        assert!(matches!(
            change_dir(Path::new("/work"), &args(&["a", "b"]), &Env::new()),
            Err(Error::Builtin(_))
        ));
    }
}
