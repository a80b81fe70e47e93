//! Types produced by the command parser and consumed by the expansion layer.

/// One unit of a command word, before evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Text that evaluates to itself.
    Literal(String),
    /// `$NAME`
    Variable(String),
    /// `${...}`; only a plain name inside the braces is evaluated.
    VariableSubstitution(String),
    /// `$(...)` or backquotes, already parsed.
    CommandSubstitution(Vec<Statement>),
    /// Adjacent pieces forming one word, e.g. `pre${X}post`.
    Concatenation(Vec<Argument>),
    /// `( a b c )` on the right-hand side of an assignment.
    Array(Vec<Argument>),
}

impl Argument {
    pub fn literal(text: impl Into<String>) -> Self {
        Argument::Literal(text.into())
    }
}

/// `NAME=value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Argument,
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// A program invocation. `inline_env` holds the `NAME=value` words that
    /// preceded the program name.
    Command {
        name: Argument,
        args: Vec<Argument>,
        inline_env: Vec<Assignment>,
    },
    /// One or more bare assignments with no program, e.g. `A=1 B=$A`.
    VariableAssignment(Vec<Assignment>),
}

/// The result of parsing one script entry.
///
/// `command` is the command line as written, after comment and heredoc
/// handling. `stdin` carries the heredoc body, if the entry had one. It is
/// literal text and is never expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub statements: Vec<Statement>,
    pub stdin: Option<String>,
}
