//! Line-level handling that happens before tokenizing: full-line comments
//! and heredoc bodies.

/// A script entry reduced to one logical command line plus optional stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preparsed {
    pub command: String,
    pub stdin: Option<String>,
}

/// Reduce the lines of one entry to a single command line.
///
/// A line whose first non-blank character is `#` ends the entry. Lines are
/// joined with spaces (a trailing `\` continuation is dropped) until a line
/// ending in a heredoc marker; everything after that line is stdin.
pub fn preparse<S: AsRef<str>>(lines: &[S]) -> Preparsed {
    let lines: Vec<&str> = lines.iter().flat_map(|l| l.as_ref().lines()).collect();

    let mut parts: Vec<&str> = Vec::new();
    let mut stdin = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if line.trim_start().starts_with('#') {
            break;
        }

        if let Some((head, delimiter)) = heredoc_marker(line) {
            parts.push(head.trim());
            let rest = &lines[i..];
            let body: Vec<&str> = match delimiter {
                Some(word) => rest.iter().take_while(|l| l.trim() != word).copied().collect(),
                None => rest.to_vec(),
            };
            stdin = Some(body.join("\n"));
            break;
        }

        let line = line.trim();
        parts.push(line.strip_suffix('\\').unwrap_or(line).trim_end());
    }

    parts.retain(|p| !p.is_empty());
    Preparsed {
        command: parts.join(" "),
        stdin,
    }
}

/// Detect a trailing `<<` / `<<WORD` / `<<'WORD'` outside quotes.
///
/// Returns the command text before the marker and the delimiter word, if any.
/// Here-strings (`<<<`) are not heredocs.
fn heredoc_marker(line: &str) -> Option<(&str, Option<&str>)> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let len = chars.len();
    let (mut sq, mut dq, mut esc) = (false, false, false);
    let mut marker = None;

    let mut i = 0;
    while i < len {
        let c = chars[i].1;

        if esc {
            esc = false;
            i += 1;
            continue;
        }
        if c == '\\' && !sq {
            esc = true;
            i += 1;
            continue;
        }
        if c == '\'' && !dq {
            sq = !sq;
            i += 1;
            continue;
        }
        if c == '"' && !sq {
            dq = !dq;
            i += 1;
            continue;
        }
        if sq || dq {
            i += 1;
            continue;
        }

        if c == '<' && i + 1 < len && chars[i + 1].1 == '<' {
            let herestring = i + 2 < len && chars[i + 2].1 == '<';
            if herestring {
                i += 3;
                continue;
            }
            marker = Some(chars[i].0);
            i += 2;
            continue;
        }
        i += 1;
    }

    let at = marker?;
    let head = &line[..at];
    let word = line[at + 2..].trim();
    let word = word.strip_prefix('-').unwrap_or(word);
    if word.is_empty() {
        return Some((head, None));
    }
    let unquoted = word
        .strip_prefix('\'')
        .and_then(|w| w.strip_suffix('\''))
        .or_else(|| word.strip_prefix('"').and_then(|w| w.strip_suffix('"')))
        .unwrap_or(word);
    if unquoted.is_empty() || unquoted.contains(char::is_whitespace) {
        // Something follows the marker: not a trailing heredoc.
        return None;
    }
    Some((head, Some(unquoted)))
}
