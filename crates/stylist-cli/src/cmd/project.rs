use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use stylist_core::events::Event;
use stylist_core::{project, Project, ProjectOptions};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create .stylist/config.yml and select the local profile
    Init {
        /// AWS CLI profile prefix; profiles are named <prefix><stage>
        #[arg(long)]
        prefix: Option<String>,
        /// Deployment stage (repeatable)
        #[arg(long = "stage", value_name = "STAGE")]
        stages: Vec<String>,
        /// Where config parameters live (default: ssm)
        #[arg(long, value_parser = ["ssm", "local"])]
        config_provider: Option<String>,
    },

    /// Show the project name, namespace, profile and installed features
    Info,
}

pub fn run(
    project: &Project,
    options: &ProjectOptions,
    subcmd: ProjectSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::Init {
            prefix,
            stages,
            config_provider,
        } => init(
            options,
            prefix.as_deref(),
            &stages,
            config_provider.as_deref(),
            json,
        ),
        ProjectSubcommand::Info => info(project, json),
    }
}

fn init(
    options: &ProjectOptions,
    prefix: Option<&str>,
    stages: &[String],
    config_provider: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    project::initialise(&options.working_dir, prefix, stages, config_provider)
        .with_context(|| format!("failed to initialise {}", options.working_dir.display()))?;

    // Reload so the features enabled by init bind their listeners.
    let project = Project::load(ProjectOptions {
        profile: None,
        ..options.clone()
    })
    .context("failed to load project after init")?;
    project.emit(&Event::ProjectInitialised);

    if json {
        print_json(&serde_json::json!({
            "working_dir": project.working_dir(),
            "name": project.name(),
            "profile": project.profile(),
            "features": project.active_features(),
        }))
    } else {
        println!("Initialised stylist in {}", project.working_dir().display());
        println!("Profile: {}", project.profile());
        Ok(())
    }
}

fn info(project: &Project, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "name": project.name(),
            "namespace": project.service_name(),
            "profile": project.profile(),
            "working_dir": project.working_dir(),
            "initialised": project.is_initialised(),
            "features": project.active_features(),
        }));
    }

    println!("Name:        {}", project.name());
    println!("Namespace:   {}", project.service_name());
    println!("Profile:     {}", project.profile());
    println!("Working dir: {}", project.working_dir().display());
    if !project.is_initialised() {
        println!("Not initialised. Run 'stylist project init'.");
    }
    let features = project.active_features();
    if features.is_empty() {
        println!("Features:    (none)");
    } else {
        println!("Features:    {}", features.join(", "));
    }
    Ok(())
}
