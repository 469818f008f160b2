//! Layered project settings.
//!
//! Settings are read from the system file, the user's home file and the
//! project file, in increasing precedence. Mappings are merged key by key;
//! any other value in a later layer replaces the earlier one outright.

use crate::error::{Result, StylistError};
use crate::paths;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwsSettings {
    /// Prepended to the stage name to form the AWS CLI profile name.
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DockerProviderSettings {
    /// Registry images are pushed to, e.g.
    /// `123456789012.dkr.ecr.eu-west-1.amazonaws.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvidersSettings {
    #[serde(default = "default_config_provider")]
    pub config: String,
    #[serde(default)]
    pub docker: DockerProviderSettings,
    #[serde(default = "default_error_tracker")]
    pub error_tracker: String,
}

fn default_config_provider() -> String {
    "ssm".to_string()
}

fn default_error_tracker() -> String {
    "sentry".to_string()
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        Self {
            config: default_config_provider(),
            docker: DockerProviderSettings::default(),
            error_tracker: default_error_tracker(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StylistSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsSettings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_exclusion: Vec<String>,
    #[serde(default)]
    pub providers: ProvidersSettings,
    /// Constructor options per feature, keyed by feature name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentrySettings {
    pub auth_token: String,
    pub org: String,
    pub team: String,
    /// API host; `sentry.io` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerraformSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub stylist: StylistSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentry: Option<SentrySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform: Option<TerraformSettings>,
}

pub const KNOWN_CONFIG_PROVIDERS: &[&str] = &["ssm", "local"];
pub const KNOWN_ERROR_TRACKERS: &[&str] = &["sentry", "none"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Settings {
    /// The standard layer list for a project rooted at `root`.
    pub fn layer_paths(root: &Path) -> Vec<PathBuf> {
        let mut layers = vec![paths::system_config_path()];
        if let Some(user) = paths::user_config_path() {
            layers.push(user);
        }
        layers.push(paths::config_path(root));
        layers
    }

    pub fn load(root: &Path) -> Result<Self> {
        Self::load_layers(&Self::layer_paths(root))
    }

    /// Merge the given files in order (missing files are skipped), then
    /// deserialize and validate the result.
    pub fn load_layers(layers: &[PathBuf]) -> Result<Self> {
        let mut merged = Value::Mapping(Default::default());
        for path in layers {
            if !path.is_file() {
                continue;
            }
            let data = std::fs::read_to_string(path)?;
            let layer: Value = serde_yaml::from_str(&data).map_err(|e| {
                StylistError::InvalidSettings(format!("{}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "merged settings layer");
            merge_values(&mut merged, layer);
        }
        Self::from_value(merged)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let settings: Settings = serde_yaml::from_value(value)
            .map_err(|e| StylistError::InvalidSettings(e.to_string()))?;
        let problems = settings.validate();
        if !problems.is_empty() {
            return Err(StylistError::InvalidSettings(problems.join("; ")));
        }
        Ok(settings)
    }

    /// Write this settings object as the project-local layer.
    pub fn save_project(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for stage in &self.stylist.stages {
            if stage.trim().is_empty() {
                problems.push("stylist.stages contains an empty stage name".to_string());
            } else if !stage
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                problems.push(format!(
                    "stage '{stage}' may only contain letters, digits, '-' and '_'"
                ));
            }
            if !seen.insert(stage.as_str()) {
                problems.push(format!("stage '{stage}' is declared more than once"));
            }
        }

        if self.stylist.name_exclusion.iter().any(|n| n.is_empty()) {
            problems.push("stylist.name_exclusion contains an empty entry".to_string());
        }

        if !KNOWN_CONFIG_PROVIDERS.contains(&self.stylist.providers.config.as_str()) {
            problems.push(format!(
                "unknown config provider '{}' in stylist.providers.config",
                self.stylist.providers.config
            ));
        }

        if !KNOWN_ERROR_TRACKERS.contains(&self.stylist.providers.error_tracker.as_str()) {
            problems.push(format!(
                "unknown error tracker '{}' in stylist.providers.error_tracker",
                self.stylist.providers.error_tracker
            ));
        }

        problems
    }

    pub fn feature_options(&self, feature: &str) -> FeatureOptions {
        FeatureOptions {
            feature: feature.to_string(),
            value: self.stylist.features.get(feature).cloned(),
        }
    }

    pub fn aws_prefix(&self) -> &str {
        self.stylist.aws.as_ref().map(|a| a.prefix.as_str()).unwrap_or("")
    }
}

/// Deep-merge `overlay` into `base`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// FeatureOptions
// ---------------------------------------------------------------------------

/// Raw constructor options for one feature, taken from `stylist.features`.
#[derive(Debug, Clone)]
pub struct FeatureOptions {
    feature: String,
    value: Option<Value>,
}

impl FeatureOptions {
    pub fn empty(feature: &str) -> Self {
        Self {
            feature: feature.to_string(),
            value: None,
        }
    }

    /// Deserialize into the feature's own options type; absent options give
    /// the type's default.
    pub fn parse<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match &self.value {
            None | Some(Value::Null) => Ok(T::default()),
            Some(v) => serde_yaml::from_value(v.clone()).map_err(|e| {
                StylistError::InvalidSettings(format!("stylist.features.{}: {e}", self.feature))
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
