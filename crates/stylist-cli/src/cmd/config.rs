use crate::cmd::namespaces;
use crate::output::{parse_kv, print_json, print_table};
use crate::prompt;
use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use std::cell::RefCell;
use std::collections::BTreeMap;
use stylist_core::namespace::{to_display_name, to_env_var_name};
use stylist_core::store::{ConfigSession, ParameterDescriptor};
use stylist_core::sync::{changes, default_value, sync, Change, REMOVE_MISSING_BY_DEFAULT};
use stylist_core::{NamespacePath, Project};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a parameter (encrypted unless --no-encrypt)
    Write {
        /// Parameter name below the namespace
        parameter: String,
        value: String,
        /// Namespace, e.g. resource:db (default: the project's service namespace)
        #[arg(long, short = 'n')]
        namespace: Option<String>,
        /// Store as plain text
        #[arg(long)]
        no_encrypt: bool,
        /// Tag to attach, KEY=VALUE (repeatable)
        #[arg(long = "tag", value_parser = parse_kv)]
        tags: Vec<(String, String)>,
    },

    /// Delete a parameter
    Delete {
        parameter: String,
        #[arg(long, short = 'n')]
        namespace: Option<String>,
        /// Don't ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List parameters with their type and last modification
    List {
        /// Namespaces to list (default: the project's service namespace)
        namespaces: Vec<String>,
        #[arg(long, value_enum, default_value_t = ListFormat::Full)]
        format: ListFormat,
    },

    /// Print parameters as ENV_NAME=value lines
    Dump {
        namespaces: Vec<String>,
    },

    /// Find parameters carrying all of the given tags
    Find {
        /// KEY=VALUE (repeatable)
        #[arg(long = "tag", value_parser = parse_kv, required = true)]
        tags: Vec<(String, String)>,
    },

    /// Copy parameters from another profile into this one, key by key
    Sync {
        /// Profile to read from
        source: String,
        /// Profile to write to (default: the active profile)
        #[arg(long)]
        destination: Option<String>,
        /// Namespaces to sync (default: the project's service namespace)
        namespaces: Vec<String>,
        /// Take every default without prompting: new keys get the source
        /// value, existing keys are kept and keys missing from the source
        /// are removed
        #[arg(long)]
        defaults: bool,
        /// Apply the changes without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Full,
    Short,
    Env,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(project: &Project, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Write {
            parameter,
            value,
            namespace,
            no_encrypt,
            tags,
        } => write(
            project,
            &parameter,
            &value,
            namespace.as_deref(),
            !no_encrypt,
            tags.into_iter().collect(),
            json,
        ),
        ConfigSubcommand::Delete {
            parameter,
            namespace,
            yes,
        } => delete(project, &parameter, namespace.as_deref(), yes, json),
        ConfigSubcommand::List { namespaces, format } => list(project, &namespaces, format, json),
        ConfigSubcommand::Dump { namespaces } => dump(project, &namespaces, json),
        ConfigSubcommand::Find { tags } => find(project, tags.into_iter().collect(), json),
        ConfigSubcommand::Sync {
            source,
            destination,
            namespaces,
            defaults,
            yes,
        } => run_sync(
            project,
            &source,
            destination.as_deref(),
            &namespaces,
            defaults,
            yes,
            json,
        ),
    }
}

fn open(project: &Project, stage: Option<&str>) -> anyhow::Result<ConfigSession> {
    let storage = project.config_storage()?;
    let session = storage
        .open(stage)
        .with_context(|| format!("failed to open {} storage", storage.name()))?;
    Ok(session)
}

fn full_name(project: &Project, parameter: &str, namespace: Option<&str>) -> anyhow::Result<String> {
    let ns = match namespace {
        Some(ns) => NamespacePath::parse(ns)?,
        None => namespaces(project, &[])?.remove(0),
    };
    Ok(ns.to_storage_path(Some(parameter)))
}

// ---------------------------------------------------------------------------
// write / delete
// ---------------------------------------------------------------------------

fn write(
    project: &Project,
    parameter: &str,
    value: &str,
    namespace: Option<&str>,
    encrypt: bool,
    tags: BTreeMap<String, String>,
    json: bool,
) -> anyhow::Result<()> {
    let name = full_name(project, parameter, namespace)?;
    let session = open(project, None)?;
    let written = session
        .write(&name, value, encrypt, &tags)
        .with_context(|| format!("failed to write {name}"))?;

    if json {
        print_json(&serde_json::json!({
            "name": written,
            "profile": session.stage(),
            "encrypted": encrypt,
        }))
    } else {
        println!("Wrote {} ({})", to_display_name(&written), session.stage());
        Ok(())
    }
}

fn delete(
    project: &Project,
    parameter: &str,
    namespace: Option<&str>,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let name = full_name(project, parameter, namespace)?;
    let session = open(project, None)?;
    if !yes
        && !prompt::confirm(
            &format!("Delete {} from {}?", to_display_name(&name), session.stage()),
            false,
        )?
    {
        println!("Cancelled.");
        return Ok(());
    }
    session
        .delete(&name)
        .with_context(|| format!("failed to delete {name}"))?;

    if json {
        print_json(&serde_json::json!({ "deleted": name }))
    } else {
        println!("Deleted {}", to_display_name(&name));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// list / dump / find
// ---------------------------------------------------------------------------

fn list(project: &Project, raw: &[String], format: ListFormat, json: bool) -> anyhow::Result<()> {
    let namespaces = namespaces(project, raw)?;
    let described = open(project, None)?.describe_parameters(&namespaces)?;

    if json {
        let items: Vec<&ParameterDescriptor> = described.values().collect();
        return print_json(&items);
    }

    match format {
        ListFormat::Full => {
            let rows = described
                .values()
                .map(|d| {
                    vec![
                        to_display_name(&d.name),
                        if d.kind.is_secret() { "secret" } else { "plain" }.to_string(),
                        d.value.clone(),
                        d.last_modified_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default(),
                        d.last_modified_by
                            .as_deref()
                            .map(short_user)
                            .unwrap_or_default()
                            .to_string(),
                    ]
                })
                .collect();
            print_table(&["NAME", "TYPE", "VALUE", "MODIFIED", "BY"], rows);
        }
        ListFormat::Short => {
            let rows = described
                .values()
                .map(|d| vec![to_display_name(&d.name), d.value.clone()])
                .collect();
            print_table(&["NAME", "VALUE"], rows);
        }
        ListFormat::Env => {
            for d in described.values() {
                println!("{}={}", to_env_var_name(&d.name), d.value);
            }
        }
    }
    Ok(())
}

/// `arn:aws:iam::123:user/jane` -> `jane`.
fn short_user(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

fn dump(project: &Project, raw: &[String], json: bool) -> anyhow::Result<()> {
    let namespaces = namespaces(project, raw)?;
    let values = open(project, None)?.get_parameters(&namespaces)?;
    let env: BTreeMap<String, String> = values
        .into_iter()
        .map(|(k, v)| (to_env_var_name(&k), v))
        .collect();

    if json {
        return print_json(&env);
    }
    for (k, v) in env {
        println!("{k}={v}");
    }
    Ok(())
}

fn find(project: &Project, tags: BTreeMap<String, String>, json: bool) -> anyhow::Result<()> {
    let names = open(project, None)?.find_by_tags(&tags)?;
    if json {
        return print_json(&names);
    }
    if names.is_empty() {
        println!("No parameters found.");
    }
    for name in names {
        println!("{}", to_display_name(&name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

fn run_sync(
    project: &Project,
    source: &str,
    destination: Option<&str>,
    raw: &[String],
    defaults: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<()> {
    let destination = destination.unwrap_or(project.profile());
    if source == destination {
        anyhow::bail!("source and destination profile are both '{source}'");
    }
    let namespaces = namespaces(project, raw)?;

    let source_session = open(project, Some(source))?;
    let destination_session = open(project, Some(destination))?;
    let source_described = source_session
        .describe_parameters(&namespaces)
        .with_context(|| format!("failed to read profile '{source}'"))?;
    let destination_described = destination_session
        .describe_parameters(&namespaces)
        .with_context(|| format!("failed to read profile '{destination}'"))?;

    let source_values = values_of(&source_described);
    let destination_values = values_of(&destination_described);

    // Prompt errors can't cross the callbacks; the first one is kept and
    // every later decision falls back to its default.
    let failure: RefCell<Option<anyhow::Error>> = RefCell::new(None);
    let merged = sync(
        &source_values,
        &destination_values,
        |key, src, dest, is_new| {
            let fallback = default_value(src, dest, is_new).to_string();
            if defaults || failure.borrow().is_some() {
                return fallback;
            }
            prompt::choose_value(&to_display_name(key), src, dest, is_new).unwrap_or_else(|e| {
                *failure.borrow_mut() = Some(e);
                fallback
            })
        },
        |key, value| {
            if defaults || failure.borrow().is_some() {
                return REMOVE_MISSING_BY_DEFAULT;
            }
            prompt::confirm_removal(&to_display_name(key), value).unwrap_or_else(|e| {
                *failure.borrow_mut() = Some(e);
                REMOVE_MISSING_BY_DEFAULT
            })
        },
    );
    if let Some(e) = failure.into_inner() {
        return Err(e.context("sync aborted"));
    }

    let change_set = changes(&destination_values, &merged);
    if json && change_set.is_empty() {
        return print_json(&Vec::<serde_json::Value>::new());
    }
    if change_set.is_empty() {
        println!("{destination} is already in sync with {source}.");
        return Ok(());
    }

    if !json {
        println!("Changes to {destination}:");
        for change in &change_set {
            match change {
                Change::Write { key, value } => {
                    println!("  write  {} = {value}", to_display_name(key))
                }
                Change::Delete { key } => println!("  delete {}", to_display_name(key)),
            }
        }
    }
    if !yes && !prompt::confirm(&format!("Apply {} change(s)?", change_set.len()), false)? {
        println!("Cancelled.");
        return Ok(());
    }

    let no_tags = BTreeMap::new();
    for change in &change_set {
        match change {
            Change::Write { key, value } => {
                // Keep the parameter's type; unknown keys are stored as secrets.
                let encrypt = source_described
                    .get(key)
                    .or_else(|| destination_described.get(key))
                    .map_or(true, |d| d.kind.is_secret());
                destination_session
                    .write(key, value, encrypt, &no_tags)
                    .with_context(|| format!("failed to write {key}"))?;
            }
            Change::Delete { key } => destination_session
                .delete(key)
                .with_context(|| format!("failed to delete {key}"))?,
        }
    }

    if json {
        let items: Vec<_> = change_set
            .iter()
            .map(|c| match c {
                Change::Write { key, .. } => serde_json::json!({ "write": key }),
                Change::Delete { key } => serde_json::json!({ "delete": key }),
            })
            .collect();
        print_json(&items)
    } else {
        println!("Applied {} change(s) to {destination}.", change_set.len());
        Ok(())
    }
}

fn values_of(described: &BTreeMap<String, ParameterDescriptor>) -> BTreeMap<String, String> {
    described
        .iter()
        .map(|(k, d)| (k.clone(), d.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_user_strips_arn() {
        assert_eq!(short_user("arn:aws:iam::123:user/jane"), "jane");
        assert_eq!(short_user("jane"), "jane");
    }
}
