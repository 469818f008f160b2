pub mod check;
pub mod commands;
pub mod config;
pub mod docker;
pub mod features;
pub mod kms;
pub mod profile;
pub mod project;
pub mod terraform;

use anyhow::Context;
use stylist_core::{NamespacePath, Project};

/// Parse namespace arguments, defaulting to the project's service namespace.
pub fn namespaces(project: &Project, raw: &[String]) -> anyhow::Result<Vec<NamespacePath>> {
    if raw.is_empty() {
        let service = project.service_name();
        return Ok(vec![NamespacePath::parse(&service)
            .with_context(|| format!("project name '{}' is not a valid namespace", project.name()))?]);
    }
    raw.iter()
        .map(|ns| NamespacePath::parse(ns).map_err(anyhow::Error::from))
        .collect()
}
