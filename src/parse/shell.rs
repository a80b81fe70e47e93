use super::preparse::preparse;
use super::tokenize::{is_name_char, is_name_start};
use super::types::{Argument, Assignment, ParsedCommand, Statement};
use crate::error::{Error, Result};

/// Parse the lines of one script entry.
///
/// Runs the line-level preparse (comments, heredoc) and tokenizes the
/// resulting command line into statements.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<ParsedCommand> {
    let pre = preparse(lines);
    Ok(ParsedCommand {
        statements: parse_statements(&pre.command)?,
        command: pre.command,
        stdin: pre.stdin,
    })
}

/// Parse a single command line.
pub fn parse_line(line: &str) -> Result<ParsedCommand> {
    parse(&[line])
}

/// Tokenize command text into statements separated by `;` or newlines.
pub fn parse_statements(text: &str) -> Result<Vec<Statement>> {
    let mut scanner = Scanner::new(text);
    let mut statements = Vec::new();
    let mut current = StatementBuilder::default();

    loop {
        scanner.skip_blanks();
        let Some(c) = scanner.peek() else {
            break;
        };
        match c {
            ';' | '\n' => {
                scanner.bump();
                current.finish_into(&mut statements);
            }
            '#' => scanner.skip_comment(),
            '|' | '&' => {
                return Err(Error::parse(format!(
                    "unsupported operator '{}' (pipelines and lists are not supported)",
                    scanner.operator()
                )));
            }
            '<' | '>' => {
                return Err(Error::parse(format!(
                    "unsupported redirection '{}'",
                    scanner.operator()
                )));
            }
            '(' | ')' => return Err(Error::parse(format!("unexpected '{c}'"))),
            _ => {
                if current.name.is_none()
                    && let Some(assignment) = scanner.assignment()?
                {
                    current.assignments.push(assignment);
                    continue;
                }
                if let Some(word) = scanner.word()? {
                    current.push_word(word);
                }
            }
        }
    }
    current.finish_into(&mut statements);
    Ok(statements)
}

#[derive(Default)]
struct StatementBuilder {
    assignments: Vec<Assignment>,
    name: Option<Argument>,
    args: Vec<Argument>,
}

impl StatementBuilder {
    fn push_word(&mut self, word: Argument) {
        if self.name.is_none() {
            self.name = Some(word);
        } else {
            self.args.push(word);
        }
    }

    fn finish_into(&mut self, out: &mut Vec<Statement>) {
        let StatementBuilder {
            assignments,
            name,
            args,
        } = std::mem::take(self);
        match name {
            Some(name) => out.push(Statement::Command {
                name,
                args,
                inline_env: assignments,
            }),
            None if !assignments.is_empty() => out.push(Statement::VariableAssignment(assignments)),
            None => {}
        }
    }
}

fn is_word_end(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')')
}

/// Characters a backslash may escape inside double quotes.
fn dq_escapable(c: char) -> bool {
    matches!(c, '$' | '`' | '"' | '\\' | '\n')
}

/// Accumulates the pieces of one word.
#[derive(Default)]
struct WordParts {
    parts: Vec<Argument>,
    lit: String,
    quoted: bool,
}

impl WordParts {
    fn flush(&mut self) {
        if !self.lit.is_empty() {
            self.parts.push(Argument::Literal(std::mem::take(&mut self.lit)));
        }
    }

    fn push_expansion(&mut self, arg: Argument) {
        self.flush();
        self.parts.push(arg);
    }

    fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.lit.is_empty()
    }

    /// Collapse into a single argument. Quoted words always yield something,
    /// so `""` and `"$UNSET"` survive as empty arguments.
    fn finish(mut self) -> Option<Argument> {
        self.flush();
        if self.parts.is_empty() {
            return self.quoted.then(|| Argument::literal(""));
        }
        if self.quoted && !self.parts.iter().any(|p| matches!(p, Argument::Literal(_))) {
            self.parts.insert(0, Argument::literal(""));
        }
        if self.parts.len() == 1 {
            self.parts.pop()
        } else {
            Some(Argument::Concatenation(self.parts))
        }
    }
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) {
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
    }

    /// Consume a run of operator characters, for error messages.
    fn operator(&mut self) -> String {
        let mut op = String::new();
        while let Some(c) = self.peek().filter(|&c| matches!(c, '|' | '&' | '<' | '>')) {
            op.push(c);
            self.pos += 1;
        }
        op
    }

    /// Try to read `NAME=value` at the cursor. Leaves the cursor untouched
    /// when the next word is not an assignment.
    fn assignment(&mut self) -> Result<Option<Assignment>> {
        let start = self.pos;
        if !self.peek().is_some_and(is_name_start) {
            return Ok(None);
        }
        let mut end = start;
        while self.chars.get(end).copied().is_some_and(is_name_char) {
            end += 1;
        }
        if self.chars.get(end) != Some(&'=') {
            return Ok(None);
        }
        let name: String = self.chars[start..end].iter().collect();
        self.pos = end + 1;

        let value = match self.peek() {
            Some('(') => {
                self.bump();
                self.array(&name)?
            }
            Some(c) if is_word_end(c) => Argument::literal(""),
            None => Argument::literal(""),
            Some(_) => self.word()?.unwrap_or_else(|| Argument::literal("")),
        };
        Ok(Some(Assignment { name, value }))
    }

    /// The element list of `NAME=( ... )`; the opening parenthesis is consumed.
    fn array(&mut self, name: &str) -> Result<Argument> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(Error::parse(format!(
                        "unmatched '(' in array assignment to {name}"
                    )));
                }
                Some(')') => {
                    self.bump();
                    break;
                }
                Some('#') => self.skip_comment(),
                Some(c) if is_word_end(c) => {
                    return Err(Error::parse(format!(
                        "unexpected '{c}' in array assignment to {name}"
                    )));
                }
                Some(_) => {
                    if let Some(word) = self.word()? {
                        elements.push(word);
                    }
                }
            }
        }
        if let Some(c) = self.peek().filter(|c| !is_word_end(*c)) {
            return Err(Error::parse(format!(
                "unexpected '{c}' after array assignment to {name}"
            )));
        }
        Ok(Argument::Array(elements))
    }

    /// Read one word. Returns `None` when the word turned out to be empty
    /// (e.g. a lone line continuation).
    fn word(&mut self) -> Result<Option<Argument>> {
        let mut w = WordParts::default();

        if self.peek() == Some('~') && self.peek_at(1).is_none_or(|c| c == '/' || is_word_end(c)) {
            self.bump();
            w.push_expansion(Argument::Variable("HOME".into()));
        }

        while let Some(c) = self.peek() {
            if is_word_end(c) {
                break;
            }
            self.bump();
            match c {
                '\\' => match self.bump() {
                    Some('\n') => {}
                    Some(next) => w.lit.push(next),
                    None => w.lit.push('\\'),
                },
                '\'' => {
                    w.quoted = true;
                    loop {
                        match self.bump() {
                            Some('\'') => break,
                            Some(ch) => w.lit.push(ch),
                            None => return Err(Error::parse("unterminated single quote")),
                        }
                    }
                }
                '"' => {
                    w.quoted = true;
                    self.double_quoted(&mut w)?;
                }
                '$' => match self.dollar()? {
                    Some(arg) => w.push_expansion(arg),
                    None => w.lit.push('$'),
                },
                '`' => {
                    let arg = self.backquoted()?;
                    w.push_expansion(arg);
                }
                _ => w.lit.push(c),
            }
        }

        if w.is_empty() && !w.quoted {
            return Ok(None);
        }
        Ok(w.finish())
    }

    /// Body of a `"..."` string; the opening quote is consumed.
    fn double_quoted(&mut self, w: &mut WordParts) -> Result<()> {
        loop {
            match self.bump() {
                Some('"') => return Ok(()),
                Some('\\') => match self.peek() {
                    Some('\n') => {
                        self.bump();
                    }
                    Some(next) if dq_escapable(next) => {
                        self.bump();
                        w.lit.push(next);
                    }
                    _ => w.lit.push('\\'),
                },
                Some('$') => match self.dollar()? {
                    Some(arg) => w.push_expansion(arg),
                    None => w.lit.push('$'),
                },
                Some('`') => {
                    let arg = self.backquoted()?;
                    w.push_expansion(arg);
                }
                Some(c) => w.lit.push(c),
                None => return Err(Error::parse("unterminated double quote")),
            }
        }
    }

    /// Expansion after a `$`. `None` means the dollar sign is literal.
    fn dollar(&mut self) -> Result<Option<Argument>> {
        match self.peek() {
            Some('{') => {
                self.bump();
                let mut depth: u32 = 1;
                let mut expr = String::new();
                loop {
                    match self.bump() {
                        Some('{') => {
                            depth += 1;
                            expr.push('{');
                        }
                        Some('}') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            expr.push('}');
                        }
                        Some(c) => expr.push(c),
                        None => return Err(Error::parse("unterminated '${'")),
                    }
                }
                Ok(Some(Argument::VariableSubstitution(expr)))
            }
            Some('(') => {
                self.bump();
                let inner = self.balanced_parens()?;
                Ok(Some(substitution(&inner)))
            }
            Some(c) if is_name_start(c) => {
                let mut name = String::new();
                while let Some(c) = self.peek().filter(|c| is_name_char(*c)) {
                    name.push(c);
                    self.pos += 1;
                }
                Ok(Some(Argument::Variable(name)))
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '?' | '$' | '#' | '@' | '*' | '!' | '-') => {
                self.bump();
                Ok(Some(Argument::Variable(c.to_string())))
            }
            _ => Ok(None),
        }
    }

    /// Text up to the `)` matching an already consumed `(`, respecting quotes.
    fn balanced_parens(&mut self) -> Result<String> {
        let mut depth: u32 = 1;
        let mut inner = String::new();
        let (mut sq, mut dq, mut esc) = (false, false, false);
        loop {
            let Some(c) = self.bump() else {
                return Err(Error::parse("unterminated '$('"));
            };
            if esc {
                inner.push(c);
                esc = false;
                continue;
            }
            if c == '\\' && !sq {
                esc = true;
                inner.push(c);
                continue;
            }
            if c == '\'' && !dq {
                sq = !sq;
            } else if c == '"' && !sq {
                dq = !dq;
            } else if !sq && !dq {
                if c == '(' {
                    depth += 1;
                }
                if c == ')' {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(inner);
                    }
                }
            }
            inner.push(c);
        }
    }

    /// Body of a backquoted substitution; the opening backquote is consumed.
    fn backquoted(&mut self) -> Result<Argument> {
        let mut inner = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('`' | '\\' | '$')) => inner.push(c),
                    Some(c) => {
                        inner.push('\\');
                        inner.push(c);
                    }
                    None => return Err(Error::parse("unterminated backquote")),
                },
                Some(c) => inner.push(c),
                None => return Err(Error::parse("unterminated backquote")),
            }
        }
        Ok(substitution(&inner))
    }
}

/// Parse the inside of a command substitution. Text that does not parse
/// degrades to an empty substitution with a diagnostic.
fn substitution(inner: &str) -> Argument {
    match parse_statements(inner) {
        Ok(statements) => Argument::CommandSubstitution(statements),
        Err(e) => {
            log::warn!("ignoring command substitution $({inner}): {e}");
            Argument::CommandSubstitution(Vec::new())
        }
    }
}
