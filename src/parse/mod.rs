pub mod preparse;
pub mod shell;
pub mod tokenize;
pub mod types;

pub use preparse::{Preparsed, preparse};
pub use shell::{parse, parse_line, parse_statements};
pub use tokenize::{is_valid_name, join_words};
pub use types::{Argument, Assignment, ParsedCommand, Statement};
