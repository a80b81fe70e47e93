//! mannequin: a scriptable task runner.
//!
//! Named actions from a JSON, YAML or TOML registry run one after another
//! in a shared build directory. Each action is a list of shell-like entries
//! executed by a small interpreter that keeps its environment between
//! entries and between actions, streams process output live, and reports
//! how every command ended.
//!
//! # Architecture
//!
//! - **[`parse`]**: Command text to statements, handling comments, heredocs, quoting and substitutions.
//! - **[`expand`]**: Variable and command substitution against a session environment.
//! - **[`shell`]**: Sessions with builtins, process spawning (pty or pipes) and output events.
//! - **[`scripts`]**: The action registry and its file formats.
//! - **[`batch`]**: Action selection, sequencing, build directory and state carry-over.
//! - **[`config`]**: Embedded defaults merged with a user overlay.
//! - **[`logging`]**: Console and file logging setup.

/// Batch orchestration: selectors, jobs, lifecycle events.
pub mod batch;
/// Configuration types, loading, and overlay merge logic.
pub mod config;
pub mod error;
/// Expansion of parsed statements.
pub mod expand;
/// Logger initialization.
pub mod logging;
/// Shell command parsing: preparse, tokenizer, statement types.
pub mod parse;
/// Action registry.
pub mod scripts;
/// Shell sessions and process execution.
pub mod shell;

pub use batch::{Batch, BatchConfig, BatchEvent, Job, JobOutcome, JobStatus};
pub use error::{Error, Result};
pub use scripts::Scripts;
pub use shell::{CommandExit, ScriptEntry, Shell, ShellEvent, ShellState};
