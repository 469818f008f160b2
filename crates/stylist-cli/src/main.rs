mod cmd;
mod output;
mod prompt;
mod root;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, docker::DockerSubcommand, features::FeaturesSubcommand,
    kms::KmsSubcommand, profile::ProfileSubcommand, project::ProjectSubcommand,
    terraform::TerraformSubcommand,
};
use std::path::PathBuf;
use stylist_core::{Project, ProjectOptions};

#[derive(Parser)]
#[command(
    name = "stylist",
    about = "Project infrastructure orchestration: profiles, SSM parameters, Terraform and Docker",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project directory (default: auto-detect from .stylist/ or .git/)
    #[arg(long, global = true, env = "STYLIST_WORKING_DIR")]
    working_dir: Option<PathBuf>,

    /// Profile to use for this invocation instead of the selected one
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Project name (default: derived from the git origin remote)
    #[arg(long, global = true)]
    project_name: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the external tools stylist drives are installed
    Check,

    /// List the commands available in this project
    Commands,

    /// List and enable features
    Features {
        #[command(subcommand)]
        subcommand: FeaturesSubcommand,
    },

    /// Show and select the active profile
    Profile {
        #[command(subcommand)]
        subcommand: ProfileSubcommand,
    },

    /// Initialise and inspect the project
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Manage parameters in the configuration store
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Encrypt and decrypt values with KMS
    Kms {
        #[command(subcommand)]
        subcommand: KmsSubcommand,
    },

    /// Build the project's docker images
    Docker {
        #[command(subcommand)]
        subcommand: DockerSubcommand,
    },

    /// Plan and apply terraform for the active profile
    Terraform {
        #[command(subcommand)]
        subcommand: TerraformSubcommand,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Check => "check",
            Commands::Commands => "commands",
            Commands::Features { .. } => "features",
            Commands::Profile { .. } => "profile",
            Commands::Project { .. } => "project",
            Commands::Config { .. } => "config",
            Commands::Kms { .. } => "kms",
            Commands::Docker { .. } => "docker",
            Commands::Terraform { .. } => "terraform",
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let options = ProjectOptions {
        working_dir: root::resolve_root(cli.working_dir.as_deref()),
        profile: cli.profile,
        project_name: cli.project_name,
    };
    let mut project = Project::load(options.clone()).context("failed to load project")?;

    // Feature command groups only exist while their feature is installed.
    let name = cli.command.name();
    if project.get_command(name).is_none() {
        anyhow::bail!(
            "unknown command '{name}': the feature providing it is not installed \
             (see 'stylist features list')"
        );
    }

    let json = cli.json;
    match cli.command {
        Commands::Check => cmd::check::run(json),
        Commands::Commands => cmd::commands::run(&project, json),
        Commands::Features { subcommand } => cmd::features::run(&project, subcommand, json),
        Commands::Profile { subcommand } => cmd::profile::run(&mut project, subcommand, json),
        Commands::Project { subcommand } => {
            cmd::project::run(&project, &options, subcommand, json)
        }
        Commands::Config { subcommand } => cmd::config::run(&project, subcommand, json),
        Commands::Kms { subcommand } => cmd::kms::run(&project, subcommand, json),
        Commands::Docker { subcommand } => cmd::docker::run(&project, subcommand, json),
        Commands::Terraform { subcommand } => cmd::terraform::run(&project, subcommand, json),
    }
}
