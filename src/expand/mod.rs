//! Evaluation of parsed statements against an environment.
//!
//! Expansion never fails: unset variables, unsupported `${...}` expressions
//! and failing command substitutions all degrade to an empty contribution.

use std::collections::BTreeMap;

use crate::parse::{Argument, Assignment, Statement, is_valid_name};

/// Variable name → value.
pub type Env = BTreeMap<String, String>;

/// Runs the statements of a command substitution and returns their stdout.
///
/// Implementations must not fail: errors are logged and yield whatever
/// output was captured.
pub trait CommandSubstitution {
    fn capture(&self, statements: &[Statement]) -> String;
}

/// A statement after expansion.
///
/// `program` is `None` for pure assignments; `env` then holds the bindings
/// to apply to the session. For commands, `env` holds the inline bindings
/// that overlay the session environment for that one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub program: Option<String>,
    pub args: Vec<String>,
    pub env: Env,
}

impl Resolved {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        self.program
            .iter()
            .chain(self.args.iter())
            .cloned()
            .collect()
    }
}

/// Evaluates arguments against shell variables, then the exported environment.
pub struct Expander<'a> {
    vars: &'a Env,
    env: &'a Env,
    pending: Env,
    subshell: &'a dyn CommandSubstitution,
}

impl<'a> Expander<'a> {
    pub fn new(vars: &'a Env, env: &'a Env, subshell: &'a dyn CommandSubstitution) -> Self {
        Self {
            vars,
            env,
            pending: Env::new(),
            subshell,
        }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.pending
            .get(name)
            .or_else(|| self.vars.get(name))
            .or_else(|| self.env.get(name))
            .map(String::as_str)
    }

    /// A bound name as a word; unset and empty values both vanish.
    fn word(&self, name: &str) -> Vec<String> {
        self.lookup(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .into_iter()
            .collect()
    }

    /// Expand one statement.
    pub fn expand(mut self, statement: &Statement) -> Resolved {
        match statement {
            Statement::VariableAssignment(assignments) => Resolved {
                program: None,
                args: Vec::new(),
                env: self.assign_all(assignments),
            },
            Statement::Command {
                name,
                args,
                inline_env,
            } => {
                let mut words = self.evaluate(name);
                for arg in args {
                    words.extend(self.evaluate(arg));
                }
                let env = self.assign_all(inline_env);
                let mut words = words.into_iter();
                Resolved {
                    program: words.next(),
                    args: words.collect(),
                    env,
                }
            }
        }
    }

    /// Evaluate assignments left to right; later values see earlier ones.
    fn assign_all(&mut self, assignments: &[Assignment]) -> Env {
        let mut delta = Env::new();
        for Assignment { name, value } in assignments {
            let value = self.evaluate(value).join(" ");
            self.pending.insert(name.clone(), value.clone());
            delta.insert(name.clone(), value);
        }
        delta
    }

    /// Evaluate an argument into zero or more words.
    pub fn evaluate(&self, arg: &Argument) -> Vec<String> {
        match arg {
            Argument::Literal(text) => vec![text.clone()],
            Argument::Variable(name) => self.word(name),
            Argument::VariableSubstitution(expr) => {
                let name = expr.trim();
                if !is_valid_name(name) {
                    log::warn!("unsupported parameter expansion ${{{expr}}}; substituting nothing");
                    return Vec::new();
                }
                self.word(name)
            }
            Argument::CommandSubstitution(statements) => {
                if statements.is_empty() {
                    return Vec::new();
                }
                let output = collapse_output(&self.subshell.capture(statements));
                if output.is_empty() {
                    Vec::new()
                } else {
                    vec![output]
                }
            }
            Argument::Concatenation(pieces) => {
                let pieces: Vec<Vec<String>> = pieces.iter().map(|p| self.evaluate(p)).collect();
                if pieces.iter().all(Vec::is_empty) {
                    return Vec::new();
                }
                vec![pieces.concat().concat()]
            }
            Argument::Array(elements) => elements.iter().flat_map(|e| self.evaluate(e)).collect(),
        }
    }
}

/// Collapse captured output to one value: line breaks become single spaces
/// and surrounding whitespace is trimmed.
pub fn collapse_output(output: &str) -> String {
    output
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
