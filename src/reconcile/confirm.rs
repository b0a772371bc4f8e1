//! Confirmation gate for deletion candidates.
use super::template::TermPair;
use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

/// Decides whether a negatively judged pair becomes a deletion candidate.
pub trait Confirm {
    fn confirm(&mut self, pair: &TermPair) -> Result<bool>;
}

/// Accepts every pair (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _pair: &TermPair) -> Result<bool> {
        Ok(true)
    }
}

/// Asks on a line-oriented terminal; anything but an answer starting with
/// `y` declines, including end of input.
pub struct TerminalConfirm<R, W> {
    input: R,
    output: W,
}

impl TerminalConfirm<io::StdinLock<'static>, io::Stdout> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for TerminalConfirm<R, W> {
    fn confirm(&mut self, pair: &TermPair) -> Result<bool> {
        write!(
            self.output,
            "Model answered NO for derived='{}' root='{}'. Confirm delete relation? [y/N]: ",
            pair.derived, pair.root
        )
        .context("write confirmation prompt")?;
        self.output.flush().context("flush confirmation prompt")?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("read confirmation answer")?;
        if read == 0 {
            return Ok(false);
        }
        Ok(line.trim().to_lowercase().starts_with('y'))
    }
}
