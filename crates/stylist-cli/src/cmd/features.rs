use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stylist_core::feature::FeatureState;
use stylist_core::Project;

#[derive(Subcommand)]
pub enum FeaturesSubcommand {
    /// List features and whether they are installed
    List,

    /// Install a feature
    Add {
        /// Feature name, e.g. docker or terraform
        feature: String,
        /// Arguments passed to the feature's setup, e.g. --base-image python:3.12
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

pub fn run(project: &Project, subcmd: FeaturesSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        FeaturesSubcommand::List => list(project, json),
        FeaturesSubcommand::Add { feature, args } => add(project, &feature, &args, json),
    }
}

fn list(project: &Project, json: bool) -> anyhow::Result<()> {
    let statuses = project.feature_statuses();
    if json {
        return print_json(&statuses);
    }

    let rows = statuses
        .into_iter()
        .map(|s| {
            let state = match s.state {
                FeatureState::Installed => "installed".to_string(),
                FeatureState::Available => "available".to_string(),
                FeatureState::Unavailable(reason) => format!("unavailable: {reason}"),
                FeatureState::Unknown(reason) => format!("unknown: {reason}"),
            };
            vec![s.name, state, s.description]
        })
        .collect();
    print_table(&["FEATURE", "STATE", "DESCRIPTION"], rows);
    Ok(())
}

fn add(project: &Project, feature: &str, args: &[String], json: bool) -> anyhow::Result<()> {
    project
        .setup_feature(feature, args)
        .with_context(|| format!("failed to add feature '{feature}'"))?;
    if json {
        print_json(&serde_json::json!({ "feature": feature, "installed": true }))
    } else {
        println!("Feature '{feature}' installed.");
        Ok(())
    }
}
