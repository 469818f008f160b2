use thiserror::Error;

/// Outcome of a failed call against the remote parameter store or key service.
///
/// Adapters translate whatever the backing API reports into one of these so
/// callers can match on "not found" without inspecting message text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("parameter not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StylistError {
    #[error(
        "invalid namespace '{0}': expected one of service, resource, master followed by a name, ex. resource:db"
    )]
    InvalidNamespace(String),

    #[error("parameter name is required")]
    MissingParameterName,

    #[error("unable to locate encryption key with '{0}' alias")]
    KeyResolution(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("unknown profile '{name}', available profiles: {available}")]
    UnknownProfile { name: String, available: String },

    #[error("feature '{0}' is already enabled")]
    FeatureAlreadyEnabled(String),

    #[error("failed to set up feature '{feature}': {reason}")]
    FeatureSetup { feature: String, reason: String },

    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    #[error("feature '{feature}' is unavailable: {reason}")]
    FeatureUnavailable { feature: String, reason: String },

    #[error("capability '{0}' is not registered; is the feature providing it installed?")]
    CapabilityNotRegistered(&'static str),

    #[error("capability '{0}' depends on itself")]
    CapabilityCycle(&'static str),

    #[error("sentry api: {0}")]
    Sentry(String),

    #[error("unknown config provider '{0}'")]
    UnknownConfigProvider(String),

    #[error("project is not initialised: run 'stylist project init'")]
    NotInitialised,

    #[error("project is already initialised")]
    AlreadyInitialised,

    #[error("{0} is not installed or not on PATH")]
    ToolNotInstalled(String),

    #[error("command '{command}' failed with exit code {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("no docker image named '{name}' (available: {available})")]
    UnknownImage { name: String, available: String },

    #[error("{0}")]
    Terraform(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StylistError>;
