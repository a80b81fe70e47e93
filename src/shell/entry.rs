//! Script entries as they appear in a registry.

use serde::{Deserialize, Serialize};

/// How an assignment binds its variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    /// Shell-local only; not passed to child processes.
    Local,
    /// Shell variable and exported environment variable.
    #[default]
    Export,
    /// Like `Export`, and later non-override assignments cannot replace it.
    Override,
}

/// What a failing entry does to the rest of its script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailPolicy {
    #[default]
    Stop,
    Continue,
}

/// The `cmd` of a structured entry: one line or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    Line(String),
    Lines(Vec<String>),
}

impl CommandInput {
    pub fn lines(&self) -> Vec<String> {
        match self {
            CommandInput::Line(line) => vec![line.clone()],
            CommandInput::Lines(lines) => lines.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryOptions {
    pub fail: FailPolicy,
    pub precedence: Option<Precedence>,
}

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptEntry {
    Line(String),
    /// Continuation lines, a heredoc, or comment lines.
    Lines(Vec<String>),
    Structured {
        cmd: CommandInput,
        #[serde(default)]
        fail: FailPolicy,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        precedence: Option<Precedence>,
    },
}

impl ScriptEntry {
    /// The entry's lines and its options, defaults filled in.
    pub fn normalize(&self) -> (Vec<String>, EntryOptions) {
        match self {
            ScriptEntry::Line(line) => (vec![line.clone()], EntryOptions::default()),
            ScriptEntry::Lines(lines) => (lines.clone(), EntryOptions::default()),
            ScriptEntry::Structured {
                cmd,
                fail,
                precedence,
            } => (
                cmd.lines(),
                EntryOptions {
                    fail: *fail,
                    precedence: *precedence,
                },
            ),
        }
    }
}

impl From<&str> for ScriptEntry {
    fn from(line: &str) -> Self {
        ScriptEntry::Line(line.to_string())
    }
}

impl From<String> for ScriptEntry {
    fn from(line: String) -> Self {
        ScriptEntry::Line(line)
    }
}
