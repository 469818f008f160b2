//! Interactive prompts. Kept out of the core so merge decisions can be
//! scripted in tests.

use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use stylist_core::sync::{default_value, REMOVE_MISSING_BY_DEFAULT};

pub fn confirm(prompt: &str, default: bool) -> anyhow::Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?)
}

/// Ask for the value `key` should get in the destination. Unchanged keys are
/// not asked about.
pub fn choose_value(
    key: &str,
    source: &str,
    destination: &str,
    is_new: bool,
) -> anyhow::Result<String> {
    if !is_new && source == destination {
        return Ok(destination.to_string());
    }
    let prompt = if is_new {
        format!("{key} (new)")
    } else {
        format!("{key} (source: {source})")
    };
    let value: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default_value(source, destination, is_new).to_string())
        .allow_empty(true)
        .interact_text()?;
    Ok(value)
}

pub fn confirm_removal(key: &str, value: &str) -> anyhow::Result<bool> {
    confirm(
        &format!("{key} = {value} is not in the source profile. Remove it?"),
        REMOVE_MISSING_BY_DEFAULT,
    )
}
