//! Saída de terminal do bimflow com `console` para estilização com cores.
//!
//! Relatórios de tarefas, do histórico do playground e das decisões salvas.

use std::io::{self, Write};

use console::Style;

use crate::playground::{Task, TaskRecord, Touches};
use crate::persistence::DecisionFile;

/// Estilos usados nos relatórios.
pub struct Report {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Report {
    /// Lista as tarefas com leituras, saídas e flags.
    pub fn tasks(&self, out: &mut impl Write, tasks: &[Box<dyn Task>]) -> io::Result<()> {
        for task in tasks {
            let touches = match task.touches() {
                Touches::Keys(keys) => keys.join(", "),
                Touches::Reset => "<reset>".to_string(),
            };
            let mut flags = Vec::new();
            if task.is_final() {
                flags.push("final");
            }
            if !task.single_use() {
                flags.push("reusable");
            }
            writeln!(out, "{}  {}", self.green.apply_to(task.name()), task.description())?;
            writeln!(
                out,
                "    {}",
                self.dim.apply_to(format!(
                    "reads [{}] touches [{touches}] {}",
                    task.reads().join(", "),
                    flags.join(" ")
                ))
            )?;
        }
        Ok(())
    }

    /// Imprime o histórico formatado em JSON.
    pub fn history(&self, out: &mut impl Write, history: &[TaskRecord]) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", self.green.apply_to("─── History ───"))?;
        writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(history).unwrap_or_default()
        )
    }

    /// Mostra o conteúdo de um arquivo de decisões.
    pub fn decisions(&self, out: &mut impl Write, file: Option<&DecisionFile>) -> io::Result<()> {
        let Some(file) = file else {
            return writeln!(out, "{}", self.yellow.apply_to("No stored decisions"));
        };
        writeln!(
            out,
            "{}",
            self.dim.apply_to(format!(
                "version {}, model {}",
                file.version,
                file.checksum_ifc.as_deref().unwrap_or("-")
            ))
        )?;
        for (key, stored) in &file.decisions {
            let unit = stored.unit.as_deref().unwrap_or_default();
            writeln!(out, "  {key} = {} {unit}", stored.value)?;
        }
        Ok(())
    }

    /// Mensagem de sucesso (verde, com checkmark).
    pub fn success(&self, out: &mut impl Write, message: &str) -> io::Result<()> {
        writeln!(out, "  {} {message}", self.green.apply_to("✓"))
    }

    /// Mensagem de falha (vermelho, com X).
    pub fn failure(&self, out: &mut impl Write, message: &str) -> io::Result<()> {
        writeln!(out, "  {} {message}", self.red.apply_to("✗"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{DECISION_FILE_VERSION, StoredDecision};
    use crate::playground::Playground;
    use std::collections::BTreeMap;

    fn render(f: impl FnOnce(&Report, &mut Vec<u8>) -> io::Result<()>) -> String {
        console::set_colors_enabled(false);
        let mut out = Vec::new();
        f(&Report::default(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn task_listing_shows_reads_and_flags() {
        let pg = Playground::new(
            crate::decision::DecisionRegistry::new(),
            crate::tasks::builtin(),
            ".",
        );
        let out = render(|r, out| r.tasks(out, &pg.known_tasks()));
        assert!(out.contains("classify  Classify the model entities"));
        assert!(out.contains("reads [entities] touches [classified]"));
        assert!(out.contains("touches [<reset>] reusable"));
        assert!(out.contains("touches [export] final"));
    }

    #[test]
    fn decisions_listing() {
        let file = DecisionFile {
            version: DECISION_FILE_VERSION.to_string(),
            checksum_ifc: None,
            decisions: BTreeMap::from([(
                "IfcWall_u_value".to_string(),
                StoredDecision::new(serde_json::json!(0.24)).with_unit("W/(m2K)"),
            )]),
        };
        let out = render(|r, out| r.decisions(out, Some(&file)));
        assert!(out.contains("version 0.1, model -"));
        assert!(out.contains("IfcWall_u_value = 0.24 W/(m2K)"));

        let empty = render(|r, out| r.decisions(out, None));
        assert!(empty.contains("No stored decisions"));
    }
}
