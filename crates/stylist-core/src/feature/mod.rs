//! Features: pluggable capabilities a project can have installed.
//!
//! The set of features is a static list of [`FeatureDefinition`]s. A
//! [`FeatureRegistry`] validates that list once per process, instantiates
//! each feature with its options from settings and keeps the failures so
//! they are reported only when that feature is asked for.
//!
//! Activation runs every installed feature's `on_init` hook, then every
//! `on_config` hook, in name order. Features whose installation check needs
//! the remote store are never activated; their state is only computed on
//! request.

pub mod builtin;

use crate::container::Container;
use crate::error::{Result, StylistError};
use crate::events::Dispatcher;
use crate::project::ProjectContext;
use crate::settings::{FeatureOptions, Settings};
use clap::{ArgMatches, Command};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Feature
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallCheck {
    /// Filesystem checks only; cheap enough to run on every invocation.
    Local,
    /// Needs the remote configuration store.
    Remote,
}

pub trait Feature {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Command group this feature contributes while installed.
    fn command_group(&self) -> Option<&'static str> {
        None
    }

    fn install_check(&self) -> InstallCheck {
        InstallCheck::Local
    }

    /// Recomputed on every call from the current repository state.
    fn installed(&self, project: &ProjectContext, container: &Container) -> Result<bool>;

    /// Bind event listeners.
    fn on_init(&self, _project: &ProjectContext, _events: &mut Dispatcher) -> Result<()> {
        Ok(())
    }

    /// Register services into the container.
    fn on_config(&self, _project: &ProjectContext, _container: &mut Container) -> Result<()> {
        Ok(())
    }

    /// Options accepted by `features add <name>`. None by default.
    fn setup_command(&self) -> Command {
        Command::new(self.name())
    }

    /// First-time installation. Only called when `installed` is false, with
    /// the arguments already parsed against [`setup_command`](Self::setup_command).
    fn do_setup(&self, project: &ProjectContext, container: &Container, args: &ArgMatches)
        -> Result<()>;
}

pub type FeatureBuilder = fn(&FeatureOptions) -> Result<Box<dyn Feature>>;

#[derive(Clone, Copy)]
pub struct FeatureDefinition {
    pub name: &'static str,
    pub build: FeatureBuilder,
}

impl std::fmt::Debug for FeatureDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDefinition")
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

static FEATURE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn valid_feature_name(name: &str) -> bool {
    FEATURE_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("feature name pattern is valid"))
        .is_match(name)
}

#[derive(Debug)]
pub struct FeatureRegistry {
    definitions: Vec<FeatureDefinition>,
}

/// Result of validating the definition list.
#[derive(Debug, Default)]
pub struct Discovery {
    pub available: BTreeMap<&'static str, FeatureDefinition>,
    pub failures: BTreeMap<String, String>,
    /// Later definitions of an already discovered name. The first wins.
    pub duplicates: Vec<&'static str>,
}

impl FeatureRegistry {
    pub fn new(definitions: Vec<FeatureDefinition>) -> Self {
        Self { definitions }
    }

    pub fn builtin() -> Self {
        Self::new(builtin::FEATURES.to_vec())
    }

    /// Validate every definition. A bad entry is recorded and skipped; the
    /// others are still discovered.
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        for def in &self.definitions {
            if !valid_feature_name(def.name) {
                tracing::warn!(feature = def.name, "invalid feature name, skipping");
                discovery
                    .failures
                    .insert(def.name.to_string(), "invalid feature name".to_string());
                continue;
            }
            if discovery.available.contains_key(def.name) {
                tracing::warn!(feature = def.name, "duplicate feature definition, skipping");
                discovery.duplicates.push(def.name);
                continue;
            }
            discovery.available.insert(def.name, *def);
        }
        discovery
    }

    /// Construct `name` with its options from `settings`.
    pub fn instantiate(&self, name: &str, settings: &Settings) -> Result<Box<dyn Feature>> {
        let discovery = self.discover();
        if let Some(reason) = discovery.failures.get(name) {
            return Err(StylistError::FeatureUnavailable {
                feature: name.to_string(),
                reason: reason.clone(),
            });
        }
        let def = discovery
            .available
            .get(name)
            .ok_or_else(|| StylistError::FeatureNotFound(name.to_string()))?;
        (def.build)(&settings.feature_options(name))
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum FeatureState {
    Installed,
    Available,
    /// Discovery or construction failed.
    Unavailable(String),
    /// The installation check itself failed.
    Unknown(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureStatus {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub state: FeatureState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOrigin {
    Core,
    Feature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEntry {
    pub name: String,
    pub about: String,
    pub origin: CommandOrigin,
}

/// Commands that exist whether or not any feature is installed.
pub const CORE_COMMANDS: &[(&str, &str)] = &[
    ("check", "Check that external tools are installed"),
    ("commands", "List available commands"),
    ("features", "List and enable features"),
    ("profile", "Show and select the active profile"),
    ("project", "Initialise and inspect the project"),
];

/// The instantiated features of one project.
pub struct Features {
    features: BTreeMap<&'static str, Box<dyn Feature>>,
    failures: BTreeMap<String, String>,
}

impl Features {
    pub fn load(registry: &FeatureRegistry, settings: &Settings) -> Self {
        let discovery = registry.discover();
        let mut features = BTreeMap::new();
        let mut failures = discovery.failures;
        for (name, def) in discovery.available {
            match (def.build)(&settings.feature_options(name)) {
                Ok(feature) => {
                    features.insert(name, feature);
                }
                Err(e) => {
                    tracing::warn!(feature = name, error = %e, "feature failed to load");
                    failures.insert(name.to_string(), e.to_string());
                }
            }
        }
        Self { features, failures }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.features.keys().copied().collect()
    }

    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }

    pub fn get(&self, name: &str) -> Result<&dyn Feature> {
        if let Some(feature) = self.features.get(name) {
            return Ok(feature.as_ref());
        }
        match self.failures.get(name) {
            Some(reason) => Err(StylistError::FeatureUnavailable {
                feature: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(StylistError::FeatureNotFound(name.to_string())),
        }
    }

    /// Features with a local install check that report installed.
    pub fn installed_locally(
        &self,
        project: &ProjectContext,
        container: &Container,
    ) -> Vec<&dyn Feature> {
        self.features
            .values()
            .filter(|f| f.install_check() == InstallCheck::Local)
            .filter(|f| match f.installed(project, container) {
                Ok(installed) => installed,
                Err(e) => {
                    tracing::warn!(feature = f.name(), error = %e, "installation check failed");
                    false
                }
            })
            .map(|f| f.as_ref())
            .collect()
    }

    /// Run `on_init` for every installed feature, then `on_config`. Returns
    /// the activated feature names.
    pub fn activate(
        &self,
        project: &ProjectContext,
        events: &mut Dispatcher,
        container: &mut Container,
    ) -> Result<Vec<&'static str>> {
        let active = self.installed_locally(project, container);
        for feature in &active {
            tracing::debug!(feature = feature.name(), "on_init");
            feature.on_init(project, events)?;
        }
        for feature in &active {
            tracing::debug!(feature = feature.name(), "on_config");
            feature.on_config(project, container)?;
        }
        Ok(active.iter().map(|f| f.name()).collect())
    }

    /// Core commands plus the groups of installed features, sorted.
    pub fn list_commands(&self, project: &ProjectContext, container: &Container) -> Vec<String> {
        let mut names: Vec<String> = CORE_COMMANDS.iter().map(|(n, _)| n.to_string()).collect();
        names.extend(
            self.installed_locally(project, container)
                .iter()
                .filter_map(|f| f.command_group())
                .map(str::to_string),
        );
        names.sort();
        names.dedup();
        names
    }

    /// Core commands first, then installed features' groups. `None` for
    /// anything else, including groups of features that are not installed.
    pub fn get_command(
        &self,
        name: &str,
        project: &ProjectContext,
        container: &Container,
    ) -> Option<CommandEntry> {
        if let Some((n, about)) = CORE_COMMANDS.iter().find(|(n, _)| *n == name) {
            return Some(CommandEntry {
                name: n.to_string(),
                about: about.to_string(),
                origin: CommandOrigin::Core,
            });
        }
        self.installed_locally(project, container)
            .into_iter()
            .find(|f| f.command_group() == Some(name))
            .map(|f| CommandEntry {
                name: name.to_string(),
                about: f.description().to_string(),
                origin: CommandOrigin::Feature,
            })
    }

    /// Install `name`. Fails with `FeatureAlreadyEnabled`, touching nothing,
    /// when it is installed already.
    pub fn setup(
        &self,
        name: &str,
        project: &ProjectContext,
        container: &Container,
        args: &[String],
    ) -> Result<()> {
        let feature = self.get(name)?;
        if feature.installed(project, container)? {
            return Err(StylistError::FeatureAlreadyEnabled(name.to_string()));
        }
        let matches = parse_setup_args(feature, args)?;
        tracing::debug!(feature = name, "running setup");
        feature
            .do_setup(project, container, &matches)
            .map_err(|e| match e {
                e @ (StylistError::FeatureSetup { .. } | StylistError::FeatureAlreadyEnabled(_)) => e,
                other => StylistError::FeatureSetup {
                    feature: name.to_string(),
                    reason: other.to_string(),
                },
            })
    }

    /// Every known feature, including failed ones, sorted by name.
    pub fn statuses(&self, project: &ProjectContext, container: &Container) -> Vec<FeatureStatus> {
        let mut statuses: Vec<FeatureStatus> = self
            .features
            .values()
            .map(|f| FeatureStatus {
                name: f.name().to_string(),
                description: f.description().to_string(),
                state: match f.installed(project, container) {
                    Ok(true) => FeatureState::Installed,
                    Ok(false) => FeatureState::Available,
                    Err(e) => FeatureState::Unknown(e.to_string()),
                },
            })
            .collect();
        statuses.extend(self.failures.iter().map(|(name, reason)| FeatureStatus {
            name: name.clone(),
            description: String::new(),
            state: FeatureState::Unavailable(reason.clone()),
        }));
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

impl std::fmt::Debug for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Features")
            .field("features", &self.names())
            .field("failures", &self.failures)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Setup argument helpers
// ---------------------------------------------------------------------------

/// Parse `args` against the feature's setup command. Usage errors become
/// `FeatureSetup` carrying clap's first message line.
pub fn parse_setup_args(feature: &dyn Feature, args: &[String]) -> Result<ArgMatches> {
    feature
        .setup_command()
        .no_binary_name(true)
        .try_get_matches_from(args)
        .map_err(|e| {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            StylistError::FeatureSetup {
                feature: feature.name().to_string(),
                reason: first.trim_start_matches("error: ").to_string(),
            }
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
