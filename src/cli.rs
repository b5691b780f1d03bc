//! Interface de linha de comando do bimflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, tasks, decisions,
//! clear) e flags globais (--config, --project, --max-attempts, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// bimflow: do modelo do edifício às entradas de simulação energética.
#[derive(Debug, Parser)]
#[command(name = "bimflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: bimflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Diretório do projeto.
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Tentativas por pergunta antes de cancelar.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o pipeline do projeto.
    Run {
        /// Arquivo do modelo do edifício.
        #[arg(long)]
        model: Option<PathBuf>,

        /// Tarefas a executar, em ordem. Sem elas, a próxima tarefa é perguntada.
        #[arg(long = "task")]
        tasks: Vec<String>,

        /// Responde às decisões pelo protocolo JSON em stdin/stdout.
        #[arg(long, default_value_t = false)]
        external: bool,
    },

    /// Lista as tarefas embutidas.
    Tasks,

    /// Mostra as decisões salvas do projeto.
    Decisions,

    /// Remove as decisões salvas do projeto.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from([
            "bimflow",
            "run",
            "--model",
            "house.json",
            "--task",
            "load_model",
            "--task",
            "classify",
        ]);
        match cli.command {
            Command::Run {
                model,
                tasks,
                external,
            } => {
                assert_eq!(model, Some(PathBuf::from("house.json")));
                assert_eq!(tasks, vec!["load_model", "classify"]);
                assert!(!external);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "bimflow",
            "--project",
            "/tmp/house",
            "--max-attempts",
            "3",
            "--verbose",
            "decisions",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.project, Some(PathBuf::from("/tmp/house")));
        assert_eq!(cli.max_attempts, Some(3));
        assert!(matches!(cli.command, Command::Decisions));
    }

    #[test]
    fn cli_parses_external_run() {
        let cli = Cli::parse_from(["bimflow", "run", "--external"]);
        assert!(matches!(cli.command, Command::Run { external: true, .. }));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
