//! The project aggregate: settings, active profile, name, features and the
//! services they registered, loaded once per invocation.

use crate::container::{self, Container};
use crate::error::{Result, StylistError};
use crate::events::{Dispatcher, Event};
use crate::feature::{CommandEntry, FeatureRegistry, FeatureStatus, Features};
use crate::io::{atomic_write, ensure_gitignore_entries};
use crate::namespace::{parametrize, NamespacePath};
use crate::paths;
use crate::profile::{self, LOCAL_PROFILE};
use crate::settings::{AwsSettings, ProvidersSettings, Settings, StylistSettings};
use crate::store::ConfigStorage;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

/// Name used when the VCS remote cannot be resolved.
pub const UNKNOWN_PROJECT: &str = "unknown";

/// Paths `project init` adds to `.gitignore`.
const GITIGNORE_ENTRIES: &[&str] = &[
    paths::ENVIRONMENT_FILE,
    ".stylist/parameters/",
    "terraform/.terraform/",
    "terraform/.tfupdate",
    "terraform/*.tfplan",
];

// ---------------------------------------------------------------------------
// Origin resolution
// ---------------------------------------------------------------------------

pub trait OriginResolver {
    fn origin_url(&self, working_dir: &Path) -> Result<String>;
}

/// `git remote get-url origin`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl OriginResolver for GitCli {
    fn origin_url(&self, working_dir: &Path) -> Result<String> {
        let git = which::which("git").map_err(|_| StylistError::ToolNotInstalled("git".into()))?;
        let output = Command::new(git)
            .args(["remote", "get-url", "origin"])
            .current_dir(working_dir)
            .output()?;
        if !output.status.success() {
            return Err(StylistError::CommandFailed {
                command: "git remote get-url origin".to_string(),
                code: output.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Last path segment of a remote URL without `.git`, with every exclusion
/// substring removed in order.
pub fn name_from_url(url: &str, exclusions: &[String]) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let segment = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let mut name = segment.strip_suffix(".git").unwrap_or(segment).to_string();
    for exclusion in exclusions {
        name = name.replace(exclusion.as_str(), "");
    }
    name
}

/// Never fails: any resolution problem gives `unknown`.
pub fn resolve_project_name(
    origin: &dyn OriginResolver,
    working_dir: &Path,
    exclusions: &[String],
) -> String {
    match origin.origin_url(working_dir) {
        Ok(url) => {
            let name = name_from_url(&url, exclusions);
            if name.is_empty() {
                UNKNOWN_PROJECT.to_string()
            } else {
                name
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "could not resolve project name from origin");
            UNKNOWN_PROJECT.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectContext
// ---------------------------------------------------------------------------

/// What features see of the project.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub working_dir: PathBuf,
    pub name: String,
    pub profile: String,
    pub settings: Settings,
}

impl ProjectContext {
    /// `service:<parametrized name>`, the default namespace for commands on
    /// the current project.
    pub fn service_name(&self) -> String {
        format!("service:{}", parametrize(&self.name))
    }

    pub fn service_namespace(&self) -> Result<NamespacePath> {
        NamespacePath::parse(&self.service_name())
    }

    /// The config storage named by `stylist.providers.config`.
    pub fn config_storage(&self, container: &Container) -> Result<Rc<dyn ConfigStorage>> {
        match self.settings.stylist.providers.config.as_str() {
            "ssm" => container.get::<container::ConfigSsm>(),
            "local" => container.get::<container::ConfigLocal>(),
            other => Err(StylistError::UnknownConfigProvider(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub working_dir: PathBuf,
    /// Overrides the marker file for this invocation only.
    pub profile: Option<String>,
    /// Overrides the name resolved from the VCS remote.
    pub project_name: Option<String>,
}

#[derive(Debug)]
pub struct Project {
    context: ProjectContext,
    features: Features,
    active: Vec<&'static str>,
    events: Dispatcher,
    container: Container,
}

impl Project {
    /// Load settings from the standard layers and activate the builtin
    /// features.
    pub fn load(options: ProjectOptions) -> Result<Self> {
        Self::with_parts(options, &FeatureRegistry::builtin(), &GitCli)
    }

    pub fn with_parts(
        options: ProjectOptions,
        registry: &FeatureRegistry,
        origin: &dyn OriginResolver,
    ) -> Result<Self> {
        let settings = Settings::load(&options.working_dir)?;
        Self::from_settings(options, settings, registry, origin)
    }

    pub fn from_settings(
        options: ProjectOptions,
        settings: Settings,
        registry: &FeatureRegistry,
        origin: &dyn OriginResolver,
    ) -> Result<Self> {
        let working_dir = options.working_dir;
        let profile = match options.profile {
            Some(name) => {
                let available = profile::available_profiles(&settings);
                if !available.contains(&name) {
                    return Err(StylistError::UnknownProfile {
                        name,
                        available: available.join(", "),
                    });
                }
                name
            }
            None => profile::resolve_active_profile(&working_dir)?,
        };
        let name = match options.project_name {
            Some(name) if name.trim().is_empty() => {
                return Err(StylistError::InvalidSettings(
                    "project name must not be empty".to_string(),
                ));
            }
            Some(name) => name,
            None => resolve_project_name(origin, &working_dir, &settings.stylist.name_exclusion),
        };
        tracing::debug!(project = %name, profile = %profile, dir = %working_dir.display(), "loading project");

        let context = ProjectContext {
            working_dir,
            name,
            profile,
            settings,
        };
        let features = Features::load(registry, &context.settings);
        let mut events = Dispatcher::new();
        let mut container = Container::new();
        let active = features.activate(&context, &mut events, &mut container)?;

        Ok(Self {
            context,
            features,
            active,
            events,
            container,
        })
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn profile(&self) -> &str {
        &self.context.profile
    }

    pub fn settings(&self) -> &Settings {
        &self.context.settings
    }

    pub fn working_dir(&self) -> &Path {
        &self.context.working_dir
    }

    pub fn service_name(&self) -> String {
        self.context.service_name()
    }

    pub fn is_initialised(&self) -> bool {
        paths::is_initialised(&self.context.working_dir)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    /// Features activated at load, in activation order.
    pub fn active_features(&self) -> &[&'static str] {
        &self.active
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.features.list_commands(&self.context, &self.container)
    }

    pub fn get_command(&self, name: &str) -> Option<CommandEntry> {
        self.features.get_command(name, &self.context, &self.container)
    }

    pub fn feature_statuses(&self) -> Vec<FeatureStatus> {
        self.features.statuses(&self.context, &self.container)
    }

    pub fn setup_feature(&self, name: &str, args: &[String]) -> Result<()> {
        self.features
            .setup(name, &self.context, &self.container, args)
    }

    pub fn emit(&self, event: &Event) -> usize {
        self.events.emit(event)
    }

    /// Persist `name` as the active profile and notify listeners.
    pub fn select_profile(&mut self, name: &str) -> Result<()> {
        let previous = profile::resolve_active_profile(&self.context.working_dir)?;
        profile::select_profile(&self.context.working_dir, &self.context.settings, name)?;
        self.context.profile = name.to_string();
        self.emit(&Event::ProfileSelected {
            previous,
            current: name.to_string(),
        });
        Ok(())
    }

    pub fn config_storage(&self) -> Result<Rc<dyn ConfigStorage>> {
        self.context.config_storage(&self.container)
    }
}

/// Create `.stylist/config.yml`, ignore local state in git and select the
/// `local` profile. `config_provider` defaults to `ssm`.
pub fn initialise(
    root: &Path,
    prefix: Option<&str>,
    stages: &[String],
    config_provider: Option<&str>,
) -> Result<Settings> {
    if paths::is_initialised(root) {
        return Err(StylistError::AlreadyInitialised);
    }
    let settings = Settings {
        stylist: StylistSettings {
            aws: prefix.map(|p| AwsSettings {
                prefix: p.to_string(),
            }),
            stages: stages.to_vec(),
            providers: ProvidersSettings {
                config: config_provider
                    .map(str::to_string)
                    .unwrap_or_else(|| ProvidersSettings::default().config),
                ..ProvidersSettings::default()
            },
            ..StylistSettings::default()
        },
        ..Settings::default()
    };
    let problems = settings.validate();
    if !problems.is_empty() {
        return Err(StylistError::InvalidSettings(problems.join("; ")));
    }

    settings.save_project(root)?;
    ensure_gitignore_entries(root, GITIGNORE_ENTRIES)?;
    atomic_write(&paths::environment_path(root), LOCAL_PROFILE.as_bytes())?;
    tracing::info!(root = %root.display(), "initialised project");
    Ok(settings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::feature::CommandOrigin;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FixedOrigin(Option<&'static str>);

    impl OriginResolver for FixedOrigin {
        fn origin_url(&self, _: &Path) -> Result<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| StylistError::CommandFailed {
                    command: "git remote get-url origin".to_string(),
                    code: Some(2),
                })
        }
    }

    fn settings(stages: &[&str]) -> Settings {
        let mut settings = Settings::default();
        settings.stylist.stages = stages.iter().map(|s| s.to_string()).collect();
        settings.stylist.aws = Some(AwsSettings {
            prefix: "acme-".to_string(),
        });
        settings
    }

    fn load(dir: &Path, settings: Settings, options: ProjectOptions) -> Result<Project> {
        Project::from_settings(
            ProjectOptions {
                working_dir: dir.to_path_buf(),
                ..options
            },
            settings,
            &FeatureRegistry::builtin(),
            &FixedOrigin(Some("git@github.com:acme/checkout-service.git")),
        )
    }

    #[test]
    fn name_from_various_remotes() {
        let none: Vec<String> = vec![];
        assert_eq!(name_from_url("https://github.com/acme/checkout.git", &none), "checkout");
        assert_eq!(name_from_url("git@github.com:checkout.git", &none), "checkout");
        assert_eq!(name_from_url("https://example.com/acme/checkout/", &none), "checkout");
        let exclusions = vec!["-service".to_string(), "acme-".to_string()];
        assert_eq!(
            name_from_url("git@github.com:acme/acme-checkout-service.git", &exclusions),
            "checkout"
        );
    }

    #[test]
    fn unresolvable_origin_is_unknown() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_project_name(&FixedOrigin(None), dir.path(), &[]),
            UNKNOWN_PROJECT
        );
        assert_eq!(
            resolve_project_name(&FixedOrigin(Some("https://x/.git")), dir.path(), &[]),
            UNKNOWN_PROJECT
        );
    }

    #[test]
    fn service_name_is_parametrized() {
        let ctx = ProjectContext {
            working_dir: PathBuf::from("/tmp"),
            name: "checkout api v2".to_string(),
            profile: "local".to_string(),
            settings: Settings::default(),
        };
        assert_eq!(ctx.service_name(), "service:checkout-api-v2");
        assert_eq!(
            ctx.service_namespace().unwrap().to_storage_path(Some("db")),
            "/service/checkout-api-v2/db"
        );
    }

    #[test]
    fn initialise_once() {
        let dir = TempDir::new().unwrap();
        let stages = vec!["prod".to_string(), "staging".to_string()];
        initialise(dir.path(), Some("acme-"), &stages, None).unwrap();

        assert!(paths::config_path(dir.path()).is_file());
        assert_eq!(
            std::fs::read_to_string(paths::environment_path(dir.path())).unwrap(),
            "local"
        );
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.lines().any(|l| l == ".stylist/environment"));
        assert!(gitignore.lines().any(|l| l == ".stylist/parameters/"));

        let saved = Settings::load_layers(&[paths::config_path(dir.path())]).unwrap();
        assert_eq!(saved.aws_prefix(), "acme-");
        assert_eq!(saved.stylist.stages, stages);

        assert!(matches!(
            initialise(dir.path(), None, &[], None),
            Err(StylistError::AlreadyInitialised)
        ));
    }

    #[test]
    fn initialise_rejects_bad_stages() {
        let dir = TempDir::new().unwrap();
        let err = initialise(dir.path(), None, &["prod".to_string(), "prod".to_string()], None);
        assert!(matches!(err, Err(StylistError::InvalidSettings(_))));
        assert!(!paths::is_initialised(dir.path()));
    }

    #[test]
    fn loads_name_profile_and_features() {
        let dir = TempDir::new().unwrap();
        initialise(dir.path(), Some("acme-"), &["prod".to_string()], None).unwrap();
        let mut settings = settings(&["prod"]);
        settings.stylist.name_exclusion = vec!["-service".to_string()];

        let project = load(dir.path(), settings, ProjectOptions::default()).unwrap();
        assert_eq!(project.name(), "checkout");
        assert_eq!(project.profile(), "local");
        assert_eq!(project.service_name(), "service:checkout");
        assert_eq!(project.active_features(), &["aws", "config", "kms"]);
        assert_eq!(project.config_storage().unwrap().name(), "ssm");
    }

    #[test]
    fn option_overrides() {
        let dir = TempDir::new().unwrap();
        let project = load(
            dir.path(),
            settings(&["prod"]),
            ProjectOptions {
                profile: Some("prod".to_string()),
                project_name: Some("billing".to_string()),
                ..ProjectOptions::default()
            },
        )
        .unwrap();
        assert_eq!(project.profile(), "prod");
        assert_eq!(project.name(), "billing");

        let err = load(
            dir.path(),
            settings(&["prod"]),
            ProjectOptions {
                profile: Some("qa".to_string()),
                ..ProjectOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StylistError::UnknownProfile { .. }));
    }

    #[test]
    fn uninitialised_project_has_core_commands_only() {
        let dir = TempDir::new().unwrap();
        let project = load(dir.path(), Settings::default(), ProjectOptions::default()).unwrap();
        assert_eq!(
            project.list_commands(),
            vec!["check", "commands", "features", "profile", "project"]
        );
        assert!(project.get_command("config").is_none());
        assert!(matches!(
            project.config_storage(),
            Err(StylistError::CapabilityNotRegistered(_))
        ));
    }

    #[test]
    fn dockerfile_enables_docker_commands() {
        let dir = TempDir::new().unwrap();
        initialise(dir.path(), None, &[], None).unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch").unwrap();
        let project = load(dir.path(), Settings::default(), ProjectOptions::default()).unwrap();

        let commands = project.list_commands();
        assert!(commands.contains(&"docker".to_string()));
        assert!(commands.contains(&"config".to_string()));
        assert!(!commands.contains(&"terraform".to_string()));
        assert_eq!(
            project.get_command("docker").unwrap().origin,
            CommandOrigin::Feature
        );
    }

    #[test]
    fn select_profile_notifies_listeners() {
        let dir = TempDir::new().unwrap();
        initialise(dir.path(), None, &["prod".to_string()], None).unwrap();
        let mut project = load(dir.path(), settings(&["prod"]), ProjectOptions::default()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        project.events.bind(EventKind::ProfileSelected, move |e| {
            sink.borrow_mut().push(e.clone());
        });

        project.select_profile("prod").unwrap();
        assert_eq!(project.profile(), "prod");
        assert_eq!(
            profile::resolve_active_profile(dir.path()).unwrap(),
            "prod"
        );
        assert_eq!(
            seen.borrow().as_slice(),
            &[Event::ProfileSelected {
                previous: "local".to_string(),
                current: "prod".to_string(),
            }]
        );

        assert!(matches!(
            project.select_profile("qa"),
            Err(StylistError::UnknownProfile { .. })
        ));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn unknown_config_provider() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&[]);
        settings.stylist.providers.config = "vault".to_string();
        let project = load(dir.path(), settings, ProjectOptions::default()).unwrap();
        assert!(matches!(
            project.config_storage(),
            Err(StylistError::UnknownConfigProvider(ref p)) if p == "vault"
        ));
    }

    #[test]
    fn blank_project_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        for blank in ["", "   "] {
            let err = load(
                dir.path(),
                settings(&["prod"]),
                ProjectOptions {
                    project_name: Some(blank.to_string()),
                    ..ProjectOptions::default()
                },
            )
            .unwrap_err();
            assert!(matches!(err, StylistError::InvalidSettings(ref m) if m.contains("project name")));
        }
    }

    #[test]
    fn local_config_provider_from_init() {
        let dir = TempDir::new().unwrap();
        let saved = initialise(dir.path(), None, &["prod".to_string()], Some("local")).unwrap();
        assert_eq!(saved.stylist.providers.config, "local");
        assert!(initialise(TempDir::new().unwrap().path(), None, &[], Some("vault")).is_err());

        let project = load(dir.path(), saved, ProjectOptions::default()).unwrap();
        assert_eq!(project.config_storage().unwrap().name(), "local");
    }
}
