use anyhow::Result;
use dialoguer::Confirm;
use std::io::IsTerminal;

/// Ask for confirmation unless `assume_yes` is set or stdin is not a terminal
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes || !std::io::stdin().is_terminal() {
        return Ok(true);
    }

    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
