use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchConfig, default_build_dir};
use crate::shell::TermSettings;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub terminal: TermSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct BatchSettings {
    /// Empty means the default under the system temp dir.
    #[serde(default)]
    pub build_dir: String,
    #[serde(default)]
    pub clean: bool,
    #[serde(default)]
    pub report_threshold_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: String,
    /// Empty disables the log file.
    #[serde(default)]
    pub file: String,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    batch: BatchOverlay,
    #[serde(default)]
    terminal: TerminalOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct BatchOverlay {
    build_dir: Option<String>,
    clean: Option<bool>,
    report_threshold_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TerminalOverlay {
    name: Option<String>,
    cols: Option<u16>,
    rows: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Merge user overlay from ~/.config/mannequin/config.toml (if exists)
    ///
    /// Only keys present in the overlay replace defaults.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    /// Try to load user overlay from ~/.config/mannequin/config.toml.
    fn load_overlay() -> Option<ConfigOverlay> {
        let home = std::env::var_os("HOME")?;
        let path = std::path::Path::new(&home).join(".config/mannequin/config.toml");
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("mannequin: config parse error: {e}");
                None
            }
        }
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let b = overlay.batch;
        if let Some(v) = b.build_dir {
            self.batch.build_dir = v;
        }
        if let Some(v) = b.clean {
            self.batch.clean = v;
        }
        if let Some(v) = b.report_threshold_ms {
            self.batch.report_threshold_ms = v;
        }

        let t = overlay.terminal;
        if let Some(v) = t.name {
            self.terminal.name = v;
        }
        if let Some(v) = t.cols {
            self.terminal.cols = v;
        }
        if let Some(v) = t.rows {
            self.terminal.rows = v;
        }

        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }

    /// Batch settings; dry-run and interactive mode are left to the caller.
    pub fn batch_config(&self) -> BatchConfig {
        let build_dir = if self.batch.build_dir.is_empty() {
            default_build_dir()
        } else {
            PathBuf::from(shellexpand::tilde(&self.batch.build_dir).into_owned())
        };
        BatchConfig {
            build_dir,
            clean: self.batch.clean,
            report_threshold: Duration::from_millis(self.batch.report_threshold_ms),
            term: self.terminal.clone(),
            ..BatchConfig::default()
        }
    }

    /// Configured log level; unrecognized names fall back to `warn`.
    pub fn log_level(&self) -> log::LevelFilter {
        self.logging.level.parse().unwrap_or(log::LevelFilter::Warn)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        if self.logging.file.is_empty() {
            None
        } else {
            Some(PathBuf::from(shellexpand::tilde(&self.logging.file).into_owned()))
        }
    }

    #[cfg(test)]
    fn apply_overlay_str(&mut self, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        self.apply_overlay(overlay);
    }
}
