use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use bimflow::cli::{Cli, Command};
use bimflow::config::{BimflowConfig, FrontendKind};
use bimflow::decision::DecisionRegistry;
use bimflow::frontend::{ConsoleFrontend, ExternalFrontend, Frontend, JsonLinesChannel};
use bimflow::persistence::{DecisionStore, file_checksum};
use bimflow::playground::Playground;
use bimflow::tasks;
use bimflow::ui::Report;

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config =
        BimflowConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(project) = cli.project {
        config.project_dir = project;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    let store = DecisionStore::new(config.decisions_path()).with_reuse(config.reuse_decisions);
    let report = Report::default();

    match cli.command {
        Command::Run {
            model,
            tasks,
            external,
        } => {
            if model.is_some() {
                config.model_file = model;
            }
            if external {
                config.frontend = FrontendKind::External;
            }
            match config.frontend {
                FrontendKind::Console => {
                    let mut frontend =
                        ConsoleFrontend::stdio().with_max_attempts(config.max_attempts);
                    run(&config, &store, &tasks, &mut frontend, &mut io::stdout())
                }
                // stdout carries the protocol, reports go to stderr.
                FrontendKind::External => {
                    let channel = JsonLinesChannel::new(io::stdin().lock(), io::stdout());
                    let mut frontend =
                        ExternalFrontend::new(channel).with_max_rounds(config.max_rounds);
                    run(&config, &store, &tasks, &mut frontend, &mut io::stderr())
                }
            }
        }
        Command::Tasks => {
            let pg = Playground::new(DecisionRegistry::new(), tasks::builtin(), &config.project_dir);
            report.tasks(&mut io::stdout(), &pg.known_tasks())?;
            Ok(())
        }
        Command::Decisions => {
            let file = store
                .read()
                .with_context(|| format!("Failed to read {}", store.path().display()))?;
            report.decisions(&mut io::stdout(), file.as_ref())?;
            Ok(())
        }
        Command::Clear => {
            let message = if store.clear()? {
                format!("Removed {}", store.path().display())
            } else {
                format!("Nothing to remove at {}", store.path().display())
            };
            report.success(&mut io::stdout(), &message)?;
            Ok(())
        }
    }
}

/// Loads stored decisions, runs the pipeline and saves what was decided,
/// also when the run was aborted.
fn run(
    config: &BimflowConfig,
    store: &DecisionStore,
    task_names: &[String],
    frontend: &mut dyn Frontend,
    out: &mut impl Write,
) -> Result<()> {
    let registry = DecisionRegistry::new();
    if let Some(model) = &config.model_file {
        let checksum = file_checksum(model)
            .with_context(|| format!("Failed to read model {}", model.display()))?;
        registry.set_checksum_ifc(Some(checksum));
    }
    store
        .load(&registry, frontend)
        .context("Failed to load stored decisions")?;

    let mut pg = Playground::new(registry.clone(), tasks::builtin(), &config.project_dir);
    if let Some(model) = &config.model_file {
        pg = pg.with_model_file(model);
    }
    info!("Project {}", config.project_dir.display());

    let outcome = if task_names.is_empty() {
        pg.run_interactive(frontend)
    } else {
        pg.run_sequence(task_names, frontend)
    };

    let saved = store
        .save(&registry, pg.made_decisions_mut())
        .context("Failed to save decisions")?;
    let report = Report::default();
    report.history(out, pg.history())?;
    match outcome {
        Ok(()) => {
            report.success(out, &format!("Saved {saved} decision(s)"))?;
            Ok(())
        }
        Err(err) => {
            report.failure(out, &err.to_string())?;
            Err(err.into())
        }
    }
}
