//! Interactive prompts for `mosql export init`.
//!
//! The prompt loop keeps re-asking with the previously entered values
//! pre-filled until the user confirms with `Y`; answering `N` goes back to
//! editing, ctrl-c aborts.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use mosql_export::InitData;

pub fn collect_init_data(namespace: &str) -> Result<InitData> {
    println!(
        "Initializing export for namespace '{}'. Provide a few more details:",
        style(namespace).bold()
    );

    let theme = ColorfulTheme::default();
    let mut details = InitData::default();

    loop {
        details = prompt_round(&theme, details)?;

        let save = Confirm::with_theme(&theme)
            .with_prompt("Save the export details?")
            .default(true)
            .interact()
            .context("prompt cancelled")?;
        if save {
            println!("Saving the export details...");
            return Ok(details);
        }
        println!(
            "\nYou can change the export details again. Press 'return' to keep the same value. To quit press ctrl+c"
        );
    }
}

fn prompt_round(theme: &ColorfulTheme, current: InitData) -> Result<InitData> {
    Ok(InitData {
        source_database_name: required(
            theme,
            "Source database name",
            &current.source_database_name,
        )?,
        source_database_connection_string: required(
            theme,
            "Source database connection string",
            &current.source_database_connection_string,
        )?,
        destination_database_name: required(
            theme,
            "Destination database name",
            &current.destination_database_name,
        )?,
        destination_database_connection_string: required(
            theme,
            "Destination database connection string",
            &current.destination_database_connection_string,
        )?,
        destination_database_type: optional(
            theme,
            "Destination database type (default is postgres)",
            &current.destination_database_type,
        )?,
        collections_to_exclude: optional(
            theme,
            "Collections to exclude (comma separated)",
            &current.collections_to_exclude,
        )?,
        collections_to_include: optional(
            theme,
            "Collections to include (comma separated, no value means include all collections)",
            &current.collections_to_include,
        )?,
        user_name: optional(theme, "User name (optional)", &current.user_name)?,
        email: optional(theme, "Email (optional)", &current.email)?,
    })
}

fn required(theme: &ColorfulTheme, prompt: &str, current: &str) -> Result<String> {
    let mut input = Input::<String>::with_theme(theme).with_prompt(prompt);
    if !current.is_empty() {
        input = input.default(current.to_string());
    }
    input.interact_text().context("prompt cancelled")
}

fn optional(theme: &ColorfulTheme, prompt: &str, current: &str) -> Result<String> {
    Input::<String>::with_theme(theme)
        .with_prompt(prompt)
        .default(current.to_string())
        .allow_empty(true)
        .interact_text()
        .context("prompt cancelled")
}
