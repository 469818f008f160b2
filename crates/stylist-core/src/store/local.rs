//! Parameters kept in JSON files under `.stylist/parameters/`, one file per
//! stage.
//!
//! For working without cloud credentials. Secure values are sealed the same
//! way the in-memory store seals them, which keeps them out of plain sight
//! but is not encryption.

use super::memory::{MemoryKeyResolver, MemoryParameterStore};
use super::{
    ConfigSession, ConfigStorage, Page, ParameterFilter, ParameterMetadata, ParameterStore,
    ParameterValue, PutParameterRequest,
};
use crate::error::{Result, StoreError, StoreResult};
use crate::io::atomic_write;
use crate::paths;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Key id the local resolver maps the configured alias to.
pub const LOCAL_KEY_ID: &str = "local";

/// A [`MemoryParameterStore`] loaded from and saved back to one file after
/// every mutation.
pub struct FileParameterStore {
    path: PathBuf,
    inner: MemoryParameterStore,
}

impl FileParameterStore {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = MemoryParameterStore::new();
        if path.is_file() {
            let content = std::fs::read_to_string(path)?;
            inner.restore(serde_json::from_str(&content)?);
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    fn persist(&self) -> StoreResult<()> {
        let data = serde_json::to_vec_pretty(&self.inner.snapshot())
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        atomic_write(&self.path, &data).map_err(|e| StoreError::Transport(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "saved parameters");
        Ok(())
    }
}

impl ParameterStore for FileParameterStore {
    fn put_parameter(&self, request: &PutParameterRequest) -> StoreResult<()> {
        self.inner.put_parameter(request)?;
        self.persist()
    }

    fn add_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> StoreResult<()> {
        self.inner.add_tags(name, tags)?;
        self.persist()
    }

    fn delete_parameter(&self, name: &str) -> StoreResult<()> {
        self.inner.delete_parameter(name)?;
        self.persist()
    }

    fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterValue>> {
        self.inner.get_parameters_by_path(path, next_token)
    }

    fn describe_parameters(
        &self,
        filters: &[ParameterFilter],
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterMetadata>> {
        self.inner.describe_parameters(filters, next_token)
    }
}

pub struct LocalConfigStorage {
    root: PathBuf,
    default_stage: String,
    key_alias: String,
}

impl LocalConfigStorage {
    pub fn new(root: &Path, default_stage: impl Into<String>, key_alias: impl Into<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            default_stage: default_stage.into(),
            key_alias: key_alias.into(),
        }
    }
}

impl ConfigStorage for LocalConfigStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn open(&self, stage: Option<&str>) -> Result<ConfigSession> {
        let stage = stage.unwrap_or(&self.default_stage);
        let store = FileParameterStore::open(&paths::parameters_path(&self.root, stage))?;
        Ok(ConfigSession::new(
            stage,
            self.key_alias.clone(),
            Box::new(store),
            Box::new(MemoryKeyResolver::with_alias(&self.key_alias, LOCAL_KEY_ID)),
        ))
    }
}
