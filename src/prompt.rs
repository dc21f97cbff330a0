//! Interactive prompts for unresolved configuration keys.
//!
//! The [`Prompter`] trait keeps the configuration builder independent of the
//! terminal; [`DialoguerPrompter`] is the production implementation.

use anyhow::Result;
use dialoguer::{Confirm, Input, Password};
use std::io::IsTerminal;

/// Source of operator answers.
pub trait Prompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Free-form text; an empty answer keeps `default` when one is given.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Hidden input, may be empty.
    fn secret(&self, prompt: &str) -> Result<String>;
}

/// Terminal prompts via `dialoguer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        Ok(Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?)
    }
}

/// Returns true if prompting is possible on this process's stdin.
pub fn stdin_is_interactive() -> bool {
    std::io::stdin().is_terminal()
}
