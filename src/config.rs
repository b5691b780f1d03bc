//! Configuração do bimflow carregada a partir de `bimflow.toml`.
//!
//! A struct [`BimflowConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `BIMFLOW_PROJECT_DIR` tem precedência sobre o arquivo;
//! as flags da CLI têm precedência sobre ambos.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::frontend::DEFAULT_MAX_ATTEMPTS;
use crate::persistence::ReusePolicy;

pub const CONFIG_FILE: &str = "bimflow.toml";

/// Origem das respostas às decisões.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontendKind {
    /// Perguntas no terminal, uma por vez.
    #[default]
    Console,
    /// Protocolo JSON por linha em stdin/stdout, para interfaces remotas.
    External,
}

/// Configuração de nível superior carregada de `bimflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BimflowConfig {
    /// Diretório do projeto onde decisões e exportações são gravadas.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Arquivo do modelo do edifício. Sem ele, o caminho é perguntado.
    #[serde(default)]
    pub model_file: Option<PathBuf>,

    /// Arquivo de decisões, relativo a `project_dir`.
    #[serde(default = "default_decisions_file")]
    pub decisions_file: PathBuf,

    /// Tentativas por pergunta antes de cancelar.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Rodadas do frontend externo antes de cancelar.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Reutilizar decisões salvas: `ask`, `always` ou `never`.
    #[serde(default)]
    pub reuse_decisions: ReusePolicy,

    #[serde(default)]
    pub frontend: FrontendKind,
}

// Valor padrão para o diretório do projeto: o diretório atual.
fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

// Valor padrão para o arquivo de decisões: "decisions.json".
fn default_decisions_file() -> PathBuf {
    PathBuf::from("decisions.json")
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for BimflowConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            model_file: None,
            decisions_file: default_decisions_file(),
            max_attempts: default_max_attempts(),
            max_rounds: default_max_rounds(),
            reuse_decisions: ReusePolicy::default(),
            frontend: FrontendKind::default(),
        }
    }
}

impl BimflowConfig {
    /// Carrega a configuração de `path`, ou de `bimflow.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<BimflowConfig>(&contents)
                .with_context(|| format!("invalid configuration in {}", path.display()))?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(dir) = std::env::var("BIMFLOW_PROJECT_DIR")
            && !dir.is_empty()
        {
            config.project_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Caminho completo do arquivo de decisões.
    pub fn decisions_path(&self) -> PathBuf {
        self.project_dir.join(&self.decisions_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = BimflowConfig::default();
        assert_eq!(config.project_dir, PathBuf::from("."));
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.reuse_decisions, ReusePolicy::Ask);
        assert_eq!(config.frontend, FrontendKind::Console);
        assert!(config.model_file.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            project_dir = "/tmp/house"
            max_attempts = 3
            reuse_decisions = "always"
            frontend = "external"
        "#;
        let config: BimflowConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.reuse_decisions, ReusePolicy::Always);
        assert_eq!(config.frontend, FrontendKind::External);
        assert_eq!(config.decisions_path(), PathBuf::from("/tmp/house/decisions.json"));
    }

    #[test]
    fn load_reads_given_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "max_rounds = 4\nmodel_file = \"house.json\"\n").unwrap();
        let config = BimflowConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.model_file, Some(PathBuf::from("house.json")));
    }

    #[test]
    fn load_rejects_unknown_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "reuse_decisions = \"sometimes\"\n").unwrap();
        assert!(BimflowConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = BimflowConfig::load(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.max_attempts, 10);
    }
}
