use anyhow::{bail, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input};

use crate::upsert::ConflictResolver;

/// Block until the user presses enter.
pub fn prompt_acknowledge(prompt: &str) -> Result<()> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact()?;
    Ok(())
}

/// Asks the user to close the file and waits for them, as often as it takes.
#[derive(Debug, Default)]
pub struct PromptConflictResolver;

impl ConflictResolver for PromptConflictResolver {
    fn resolve_conflict(&mut self, location: &str) -> Result<()> {
        if !console::user_attended() {
            log::warn!("No terminal to ask for {location} to be closed, giving up on saving");
            bail!("{location} is opened by another process and there is no terminal to ask for it to be closed");
        }
        println!(
            "{} {}",
            style("Can't save:").red().bold(),
            style(format!("{location} is opened by another program.")).yellow()
        );
        prompt_acknowledge("Close it and press enter to try again")
    }
}
