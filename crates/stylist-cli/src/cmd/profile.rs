use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stylist_core::profile::available_profiles;
use stylist_core::Project;

#[derive(Subcommand)]
pub enum ProfileSubcommand {
    /// Print the active profile
    Selected,

    /// Make a profile the active one
    Select {
        /// Declared stage name, or "local"
        name: String,
    },

    /// List the available profiles
    List,
}

pub fn run(project: &mut Project, subcmd: ProfileSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProfileSubcommand::Selected => {
            if json {
                print_json(&serde_json::json!({ "profile": project.profile() }))
            } else {
                println!("{}", project.profile());
                Ok(())
            }
        }
        ProfileSubcommand::Select { name } => {
            project
                .select_profile(&name)
                .with_context(|| format!("failed to select profile '{name}'"))?;
            if json {
                print_json(&serde_json::json!({ "profile": name }))
            } else {
                println!("Selected profile: {name}");
                Ok(())
            }
        }
        ProfileSubcommand::List => list(project, json),
    }
}

fn list(project: &Project, json: bool) -> anyhow::Result<()> {
    let profiles = available_profiles(project.settings());
    let active = project.profile();

    if json {
        let items: Vec<_> = profiles
            .iter()
            .map(|p| serde_json::json!({ "name": p, "active": p == active }))
            .collect();
        return print_json(&items);
    }

    let rows = profiles
        .iter()
        .map(|p| {
            let marker = if p == active { "*" } else { "" };
            vec![marker.to_string(), p.clone()]
        })
        .collect();
    print_table(&["", "PROFILE"], rows);
    Ok(())
}
