use std::io::{self, BufRead, Stdout, StdinLock, Write};

use console::Style;
use log::{error, warn};

use super::{
    CollectionOutcome, DEFAULT_MAX_ATTEMPTS, Frontend, Progress, Resolution, interpret,
    solve_sequentially,
};
use crate::decision::Decision;

/// Asks decisions one by one on a line based terminal.
pub struct ConsoleFrontend<R, W> {
    input: R,
    output: W,
    max_attempts: u32,
    question: Style,
    dim: Style,
    warn: Style,
}

impl ConsoleFrontend<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleFrontend<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            question: Style::new().bold(),
            dim: Style::new().dim(),
            warn: Style::new().yellow(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, decision: &Decision, progress: Progress, offer_skip_all: bool) -> Resolution {
        if let Err(err) = self.render(decision, progress, offer_skip_all) {
            error!("Console output failed: {err}");
            return Resolution::Canceled;
        }

        for attempt in 1..=self.max_attempts {
            let mut line = String::new();
            let read = write!(self.output, "> ")
                .and_then(|_| self.output.flush())
                .and_then(|_| self.input.read_line(&mut line));
            match read {
                Ok(0) => {
                    warn!("Input closed while asking '{}'", decision.question());
                    return Resolution::Canceled;
                }
                Ok(_) => {}
                Err(err) => {
                    error!("Console input failed: {err}");
                    return Resolution::Canceled;
                }
            }

            match interpret(decision, &line, offer_skip_all) {
                Ok(resolution) => return resolution,
                Err(reason) => {
                    if let Err(err) = writeln!(
                        self.output,
                        "  {} {reason} (attempt {attempt}/{})",
                        self.warn.apply_to("!"),
                        self.max_attempts
                    ) {
                        error!("Console output failed: {err}");
                        return Resolution::Canceled;
                    }
                }
            }
        }

        warn!(
            "No valid answer for '{}' after {} attempts",
            decision.question(),
            self.max_attempts
        );
        Resolution::Canceled
    }

    fn render(&mut self, decision: &Decision, progress: Progress, offer_skip_all: bool) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(
            self.output,
            "{} {}",
            self.dim.apply_to(progress),
            self.question.apply_to(decision.question())
        )?;

        let mut commands = Vec::new();
        if decision.allow_skip() {
            commands.push("skip");
        }
        if offer_skip_all {
            commands.push("skip all");
        }
        commands.push("cancel");
        writeln!(
            self.output,
            "  {}",
            self.dim.apply_to(format!("commands: {}", commands.join(", ")))
        )?;

        let options = decision.kind().options();
        if !options.is_empty() {
            let width = options.iter().map(|o| o.label.len()).max().unwrap_or(0);
            for option in &options {
                writeln!(
                    self.output,
                    "  {:>3}  {:<width$}  {}",
                    option.index,
                    option.label,
                    self.dim.apply_to(&option.value)
                )?;
            }
        }
        writeln!(self.output, "  ({})", decision.kind().hint())
    }
}

impl<R: BufRead, W: Write> Frontend for ConsoleFrontend<R, W> {
    fn solve_collection(&mut self, decisions: &mut [Decision]) -> CollectionOutcome {
        solve_sequentially(decisions, |decision, progress, offer_skip_all| {
            self.ask(decision, progress, offer_skip_all)
        })
    }
}
