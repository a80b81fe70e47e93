//! mannequin: run named actions from a script registry.
//!
//! ```text
//! mannequin scripts.json               # every primary action, in order
//! mannequin scripts.yaml build..test   # a range of actions
//! mannequin scripts.toml 'echo hi'     # unknown names run as commands
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use mannequin::batch::report;
use mannequin::config::Config;
use mannequin::logging;
use mannequin::shell::Emitter;
use mannequin::{Batch, BatchEvent, JobOutcome, ShellEvent};

#[derive(Parser, Debug)]
#[command(name = "mannequin", version, about = "Run named shell actions from a script registry")]
struct Cli {
    /// Registry file (.json, .yaml/.yml or .toml).
    file: PathBuf,

    /// Action selectors: NAME, FROM..TO, FROM.., ..TO. Defaults to every action.
    actions: Vec<String>,

    /// Build directory (overrides configuration).
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Remove the build directory before the first action.
    #[arg(long)]
    clean: bool,

    /// Print expanded commands instead of running them.
    #[arg(long)]
    dry_run: bool,

    /// More log output; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load();
    logging::init(
        logging::verbosity(config.log_level(), cli.verbose),
        config.log_file().as_deref(),
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("mannequin: failed to start runtime: {e}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(cli, config)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("mannequin: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Run the selected actions; `Ok(false)` if any of them failed.
async fn run(cli: Cli, config: Config) -> anyhow::Result<bool> {
    let mut batch_config = config.batch_config();
    if let Some(dir) = cli.dir {
        batch_config.build_dir = dir;
    }
    batch_config.clean |= cli.clean;
    batch_config.dry_run = cli.dry_run;
    batch_config.interactive = std::io::stdout().is_terminal();
    let threshold = batch_config.report_threshold;

    let batch = Batch::new(batch_config);
    batch.subscribe(move |event| {
        if let Some(line) = report::describe(event, threshold) {
            println!("\n{line}");
        }
        if let BatchEvent::ScriptEnd { err: Some(err), .. } = event {
            eprintln!("{err}");
        }
    });

    batch
        .load_scripts_from(&cli.file)
        .with_context(|| format!("loading {}", cli.file.display()))?;
    let actions = batch.parse_actions(&cli.actions)?;
    log::info!("running {} action(s) in {}", actions.len(), batch.build_dir().display());

    let output = Emitter::<ShellEvent>::new();
    output.pipe(std::io::stdout());
    let outcomes = batch.run_actions(&actions, &output).await?;
    Ok(outcomes.len() == actions.len() && outcomes.iter().all(JobOutcome::is_ok))
}
