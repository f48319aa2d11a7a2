use crate::error::{PreshError, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};

/// Asks the user to confirm each module update before it is applied.
#[derive(Debug, Default)]
pub struct UpdateInteraction {
    apply_all: bool,
}

impl UpdateInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prompt on stdin/stdout. Answering `q` returns `UserCancelled`.
    pub fn confirm(&mut self, name: &str, old: &str, new: &str) -> Result<bool> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut output = io::stdout();
        self.confirm_with(&mut input, &mut output, name, old, new)
    }

    fn confirm_with<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
        name: &str,
        old: &str,
        new: &str,
    ) -> Result<bool> {
        writeln!(
            output,
            "\n{} {} {} {} to {}",
            "[Module]".cyan().bold(),
            name.white().bold(),
            "from".dimmed(),
            old.red(),
            new.green().bold()
        )?;

        if self.apply_all {
            writeln!(output, "{}", "Auto-applying (previously selected 'all').".dimmed())?;
            return Ok(true);
        }

        loop {
            write!(output, "{}", "Apply this update? [Y/n/a/q]: ".bold())?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                // stdin closed
                return Err(PreshError::UserCancelled);
            }

            match line.trim().to_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => {
                    writeln!(output, "{}", "Skipping this update.".dimmed())?;
                    return Ok(false);
                }
                "a" | "all" => {
                    writeln!(
                        output,
                        "{}",
                        "Applying this and all remaining updates.".green().bold()
                    )?;
                    self.apply_all = true;
                    return Ok(true);
                }
                "q" | "quit" => {
                    writeln!(output, "{}", "Stopping update process at user request.".yellow())?;
                    return Err(PreshError::UserCancelled);
                }
                _ => {
                    writeln!(
                        output,
                        "{}",
                        "Please answer with y(es), n(o), a(ll), or q(quit).".red()
                    )?;
                }
            }
        }
    }
}
