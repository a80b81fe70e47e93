use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where action shells start when nothing else is configured.
pub fn default_build_dir() -> PathBuf {
    std::env::temp_dir().join("mannequin")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDirState {
    Uninitialized,
    Started,
}

/// The working directory shared by every action of a batch.
#[derive(Debug, Clone)]
pub struct BuildDirectory {
    path: PathBuf,
    state: BuildDirState,
}

impl BuildDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: BuildDirState::Uninitialized,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> BuildDirState {
        self.state
    }

    /// Remove the directory and everything in it. A missing directory is fine.
    pub fn clean(&mut self) -> std::io::Result<()> {
        log::info!("cleaning {}", self.path.display());
        match std::fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        self.state = BuildDirState::Uninitialized;
        Ok(())
    }

    /// Create the directory if needed and mark it started.
    pub fn start(&mut self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.path)?;
        self.state = BuildDirState::Started;
        Ok(())
    }
}
