use crate::output::print_json;
use crate::prompt;
use anyhow::Context;
use clap::Subcommand;
use std::cell::RefCell;
use std::path::PathBuf;
use stylist_core::container::Terraform;
use stylist_core::sync::{changes, default_value, sync, Change, REMOVE_MISSING_BY_DEFAULT};
use stylist_core::terraform::to_tfvar_literal;
use stylist_core::Project;

#[derive(Subcommand)]
pub enum TerraformSubcommand {
    /// Run terraform plan in the active profile's workspace
    Plan {
        /// Save the plan and print its path
        #[arg(long)]
        save: bool,
        /// Run `terraform init -upgrade` even if it ran within the hour
        #[arg(long)]
        force_update: bool,
    },

    /// Apply a saved plan
    Apply { plan: PathBuf },

    /// Merge another profile's tfvars into this profile's
    SyncVars {
        /// Profile to read variables from
        source: String,
        /// Profile to write to (default: the active profile)
        #[arg(long)]
        destination: Option<String>,
        /// Take every default without prompting: existing values are kept
        /// and variables missing from the source are removed
        #[arg(long)]
        defaults: bool,
        /// Write without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn run(project: &Project, subcmd: TerraformSubcommand, json: bool) -> anyhow::Result<()> {
    let terraform = project.container().get::<Terraform>()?;
    match subcmd {
        TerraformSubcommand::Plan { save, force_update } => {
            let saved = terraform
                .plan(save, force_update)
                .context("terraform plan failed")?;
            if json {
                return print_json(&serde_json::json!({ "plan": saved }));
            }
            if let Some(path) = saved {
                println!("Plan saved to {}", path.display());
                println!("Apply with: stylist terraform apply {}", path.display());
            }
            Ok(())
        }
        TerraformSubcommand::Apply { plan } => {
            terraform.apply(&plan).context("terraform apply failed")?;
            if json {
                print_json(&serde_json::json!({ "applied": plan }))
            } else {
                Ok(())
            }
        }
        TerraformSubcommand::SyncVars {
            source,
            destination,
            defaults,
            yes,
        } => {
            let destination = destination.unwrap_or_else(|| project.profile().to_string());
            let source_vars = terraform.source_vars(&source)?;
            let destination_vars = terraform.read_vars(&destination)?;

            let failure: RefCell<Option<anyhow::Error>> = RefCell::new(None);
            let merged = sync(
                &source_vars,
                &destination_vars,
                |key, src, dest, is_new| {
                    let fallback = default_value(src, dest, is_new).to_string();
                    if defaults || failure.borrow().is_some() {
                        return fallback;
                    }
                    match prompt::choose_value(key, src, dest, is_new) {
                        Ok(value) => to_tfvar_literal(&value),
                        Err(e) => {
                            *failure.borrow_mut() = Some(e);
                            fallback
                        }
                    }
                },
                |key, value| {
                    if defaults || failure.borrow().is_some() {
                        return REMOVE_MISSING_BY_DEFAULT;
                    }
                    prompt::confirm_removal(key, value).unwrap_or_else(|e| {
                        *failure.borrow_mut() = Some(e);
                        REMOVE_MISSING_BY_DEFAULT
                    })
                },
            );
            if let Some(e) = failure.into_inner() {
                return Err(e.context("sync-vars aborted"));
            }

            let change_set = changes(&destination_vars, &merged);
            if !json {
                for change in &change_set {
                    match change {
                        Change::Write { key, value } => println!("  {key} = {value}"),
                        Change::Delete { key } => println!("  remove {key}"),
                    }
                }
            }
            if change_set.is_empty() {
                if !json {
                    println!("env.{destination}.tfvars is already in sync.");
                }
            } else if yes || prompt::confirm(&format!("Write env.{destination}.tfvars?"), true)? {
                terraform.write_vars(&destination, &merged)?;
            }

            if json {
                print_json(&serde_json::json!({
                    "destination": destination,
                    "vars": merged,
                    "changes": change_set.len(),
                }))
            } else {
                Ok(())
            }
        }
    }
}
