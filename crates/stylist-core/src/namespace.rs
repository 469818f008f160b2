//! Hierarchical parameter names.
//!
//! A namespace is written three ways and the forms are never interchangeable:
//!
//! - display form: `service:checkout/db-password`
//! - storage path: `/service/checkout/db-password`
//! - env-var name: `SERVICE_CHECKOUT_DB_PASSWORD`
//!
//! Only the storage path is ever persisted.

use crate::error::{Result, StylistError};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// NamespaceKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamespaceKind {
    Service,
    Resource,
    Master,
}

impl NamespaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NamespaceKind::Service => "service",
            NamespaceKind::Resource => "resource",
            NamespaceKind::Master => "master",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NamespaceKind {
    type Err = StylistError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "service" => Ok(NamespaceKind::Service),
            "resource" => Ok(NamespaceKind::Resource),
            "master" => Ok(NamespaceKind::Master),
            _ => Err(StylistError::InvalidNamespace(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// NamespacePath
// ---------------------------------------------------------------------------

static NAMESPACE_RE: OnceLock<Regex> = OnceLock::new();
static DISPLAY_RE: OnceLock<Regex> = OnceLock::new();
static NON_ALNUM_RE: OnceLock<Regex> = OnceLock::new();

fn namespace_re() -> &'static Regex {
    NAMESPACE_RE.get_or_init(|| {
        Regex::new(r"^(service|resource|master):([A-Za-z0-9_.\-]+)(?:/([A-Za-z0-9_./\-]*))?$")
            .expect("namespace pattern is valid")
    })
}

fn display_re() -> &'static Regex {
    DISPLAY_RE.get_or_init(|| {
        Regex::new(r"^/(service|resource|master)/(.*)$").expect("display pattern is valid")
    })
}

fn non_alnum_re() -> &'static Regex {
    NON_ALNUM_RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("pattern is valid"))
}

/// A parsed `kind:name[/parameter]` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacePath {
    kind: NamespaceKind,
    name: String,
    parameter: Option<String>,
}

impl NamespacePath {
    /// Parse the display form. Callers are expected to pass well-formed input;
    /// anything else is rejected with `InvalidNamespace`.
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = namespace_re()
            .captures(raw)
            .ok_or_else(|| StylistError::InvalidNamespace(raw.to_string()))?;
        let kind = caps[1].parse()?;
        let name = caps[2].to_string();
        let parameter = caps
            .get(3)
            .map(|m| m.as_str().trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Ok(Self {
            kind,
            name,
            parameter,
        })
    }

    pub fn kind(&self) -> NamespaceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    /// `/kind/name[/parameter]`, lower-cased. A parameter given here is
    /// appended after any parameter carried by the namespace itself.
    pub fn to_storage_path(&self, parameter: Option<&str>) -> String {
        let mut path = format!("/{}/{}", self.kind, self.name);
        for segment in [self.parameter.as_deref(), parameter].into_iter().flatten() {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                path.push('/');
                path.push_str(segment);
            }
        }
        path.to_lowercase()
    }

    /// Storage path with a trailing slash, used for "begins with" filters so
    /// `service:news` does not match `/service/newsletter/...`.
    pub fn storage_prefix(&self) -> String {
        let mut prefix = self.to_storage_path(None);
        prefix.push('/');
        prefix
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)?;
        if let Some(p) = &self.parameter {
            write!(f, "/{p}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for NamespacePath {
    type Err = StylistError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Conversions of storage paths
// ---------------------------------------------------------------------------

/// `/service/checkout/db` -> `service:checkout/db`. Display only.
pub fn to_display_name(storage_path: &str) -> String {
    display_re().replace(storage_path, "$1:$2").into_owned()
}

/// `/service/my-app/db.password` -> `SERVICE_MY_APP_DB_PASSWORD`.
pub fn to_env_var_name(storage_path: &str) -> String {
    storage_path
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Collapse every run of non-alphanumeric characters into a single `-`.
pub fn parametrize(name: &str) -> String {
    non_alnum_re().replace_all(name, "-").into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
