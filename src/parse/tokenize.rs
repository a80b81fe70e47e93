/// First character of a variable name: `[A-Za-z_]`.
pub fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Subsequent characters of a variable name: `[A-Za-z0-9_]`.
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `s` is a plain variable name.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

/// Render expanded words back into a command line a POSIX shell would split
/// into the same words.
pub fn join_words<S: AsRef<str>>(words: &[S]) -> String {
    shlex::try_join(words.iter().map(|w| w.as_ref())).unwrap_or_else(|_| {
        // Only fails on NUL bytes, which no argv can carry anyway.
        words
            .iter()
            .map(|w| w.as_ref())
            .collect::<Vec<_>>()
            .join(" ")
    })
}
