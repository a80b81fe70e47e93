use std::path::Path;

use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};

/// Install the global logger: stderr at `level`, plus `file` if given.
///
/// Best-effort: an unopenable log file is skipped and a second init is
/// ignored (logging must never stop a batch).
pub fn init(level: LevelFilter, file: Option<&Path>) {
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    if let Some(path) = file {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => loggers.push(WriteLogger::new(level.max(LevelFilter::Info), config, f)),
            Err(e) => eprintln!("mannequin: cannot open log file {}: {e}", path.display()),
        }
    }

    let _ = CombinedLogger::init(loggers);
}

/// `-v` count → level, starting from `base`.
pub fn verbosity(base: LevelFilter, verbose: u8) -> LevelFilter {
    let levels = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let start = levels.iter().position(|l| *l == base).unwrap_or(2);
    levels[(start + verbose as usize).min(levels.len() - 1)]
}
