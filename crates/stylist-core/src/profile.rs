//! Active profile (stage) tracking.
//!
//! The active profile is local project state: one line in
//! `.stylist/environment`. It is never written to the remote store.

use crate::error::{Result, StylistError};
use crate::io::atomic_write;
use crate::paths;
use crate::settings::Settings;
use std::path::Path;

pub const LOCAL_PROFILE: &str = "local";

/// Read the marker file. Missing or blank means `local`.
pub fn resolve_active_profile(root: &Path) -> Result<String> {
    let path = paths::environment_path(root);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let name = content.lines().next().unwrap_or("").trim();
            if name.is_empty() {
                Ok(LOCAL_PROFILE.to_string())
            } else {
                Ok(name.to_string())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LOCAL_PROFILE.to_string()),
        Err(e) => Err(e.into()),
    }
}

/// Declared stages in settings order, with `local` appended when absent.
pub fn available_profiles(settings: &Settings) -> Vec<String> {
    let mut profiles = settings.stylist.stages.clone();
    if !profiles.iter().any(|p| p == LOCAL_PROFILE) {
        profiles.push(LOCAL_PROFILE.to_string());
    }
    profiles
}

/// Write `name` to the marker file. The name must be a declared stage or
/// `local`.
pub fn select_profile(root: &Path, settings: &Settings, name: &str) -> Result<()> {
    let available = available_profiles(settings);
    if !available.iter().any(|p| p == name) {
        return Err(StylistError::UnknownProfile {
            name: name.to_string(),
            available: available.join(", "),
        });
    }
    atomic_write(&paths::environment_path(root), name.as_bytes())?;
    tracing::debug!(profile = name, "selected profile");
    Ok(())
}
