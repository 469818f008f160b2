//! Namespaced configuration storage.
//!
//! [`ConfigStorage`] opens a [`ConfigSession`] bound to one stage. A session
//! talks to the backing parameter store through the [`ParameterStore`] and
//! [`KeyResolver`] seams, so the AWS-backed and in-memory variants share all
//! of the namespace, pagination and join logic below.

pub mod aws;
pub mod local;
pub mod memory;

use crate::error::{Result, StoreResult, StylistError};
use crate::namespace::NamespacePath;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const DEFAULT_KEY_ALIAS: &str = "parameter_store_key";

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutParameterRequest {
    pub name: String,
    pub value: String,
    pub secure: bool,
    /// Encryption key id; only meaningful when `secure` is set.
    pub key_id: Option<String>,
    pub overwrite: bool,
}

/// A decrypted value as returned by a by-path listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterValue {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
    pub name: String,
    pub secure: bool,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterFilter {
    NameBeginsWith(String),
    NameEquals(String),
    TagEquals { key: String, value: String },
}

/// One page of a listing. `next_token` is `None` on the last page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

/// The parameter-store operations a session needs.
pub trait ParameterStore {
    fn put_parameter(&self, request: &PutParameterRequest) -> StoreResult<()>;

    fn add_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> StoreResult<()>;

    /// Fails with `StoreError::NotFound` when the name does not exist.
    fn delete_parameter(&self, name: &str) -> StoreResult<()>;

    /// Recursive listing below `path`, values decrypted.
    fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterValue>>;

    fn describe_parameters(
        &self,
        filters: &[ParameterFilter],
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterMetadata>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAlias {
    pub alias_name: String,
    pub target_key_id: Option<String>,
}

/// Encryption-key lookups and raw encrypt/decrypt.
pub trait KeyResolver {
    fn list_aliases(&self) -> StoreResult<Vec<KeyAlias>>;

    /// `alias` is given without the `alias/` prefix.
    fn resolve_key_by_alias(&self, alias: &str) -> StoreResult<Option<String>> {
        let wanted = format!("alias/{alias}");
        Ok(self
            .list_aliases()?
            .into_iter()
            .find(|a| a.alias_name == wanted)
            .and_then(|a| a.target_key_id))
    }

    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> StoreResult<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> StoreResult<Vec<u8>>;
}

/// Credentials for one stage, able to hand out service clients.
pub trait CloudSession {
    fn profile(&self) -> &str;
    /// Region configured for the profile, if any.
    fn region(&self) -> Option<String>;
    /// Account the session's credentials belong to.
    fn account_id(&self) -> StoreResult<String>;
    fn parameter_store(&self) -> Box<dyn ParameterStore>;
    fn key_resolver(&self) -> Box<dyn KeyResolver>;
}

pub trait SessionProvider {
    /// The credential profile name used for `stage`.
    fn profile_name(&self, stage: &str) -> String;
    fn session(&self, stage: &str) -> Result<Rc<dyn CloudSession>>;
}

// ---------------------------------------------------------------------------
// ConfigStorage
// ---------------------------------------------------------------------------

pub trait ConfigStorage {
    /// Provider name as used in `stylist.providers.config`.
    fn name(&self) -> &'static str;

    /// Open an independent session for `stage`, or for the storage's
    /// default stage (the active profile) when `None`.
    fn open(&self, stage: Option<&str>) -> Result<ConfigSession>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Plain,
    Secret,
}

impl ParameterKind {
    pub fn is_secret(self) -> bool {
        self == ParameterKind::Secret
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub kind: ParameterKind,
    pub value: String,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
}

/// A stage-bound view of the parameter store.
pub struct ConfigSession {
    stage: String,
    key_alias: String,
    store: Box<dyn ParameterStore>,
    keys: Box<dyn KeyResolver>,
}

impl ConfigSession {
    pub fn new(
        stage: impl Into<String>,
        key_alias: impl Into<String>,
        store: Box<dyn ParameterStore>,
        keys: Box<dyn KeyResolver>,
    ) -> Self {
        let session = Self {
            stage: stage.into(),
            key_alias: key_alias.into(),
            store,
            keys,
        };
        tracing::debug!(stage = %session.stage, "opened config session");
        session
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    /// Store `value` under `full_name`, overwriting any previous value.
    ///
    /// Tags are attached in a second call. A failure there leaves the value
    /// written and is only logged.
    pub fn write(
        &self,
        full_name: &str,
        value: &str,
        encrypt: bool,
        tags: &BTreeMap<String, String>,
    ) -> Result<String> {
        if full_name.trim().is_empty() {
            return Err(StylistError::MissingParameterName);
        }

        let key_id = if encrypt {
            let id = self
                .keys
                .resolve_key_by_alias(&self.key_alias)?
                .ok_or_else(|| StylistError::KeyResolution(self.key_alias.clone()))?;
            Some(id)
        } else {
            None
        };

        self.store.put_parameter(&PutParameterRequest {
            name: full_name.to_string(),
            value: value.to_string(),
            secure: encrypt,
            key_id,
            overwrite: true,
        })?;
        tracing::debug!(stage = %self.stage, name = full_name, encrypt, "wrote parameter");

        if !tags.is_empty() {
            if let Err(e) = self.store.add_tags(full_name, tags) {
                tracing::warn!(name = full_name, error = %e, "parameter written but tagging failed");
            }
        }

        Ok(full_name.to_string())
    }

    pub fn delete(&self, full_name: &str) -> Result<()> {
        if full_name.trim().is_empty() {
            return Err(StylistError::MissingParameterName);
        }
        self.store.delete_parameter(full_name)?;
        tracing::debug!(stage = %self.stage, name = full_name, "deleted parameter");
        Ok(())
    }

    /// Every decrypted value below the given namespaces, as one flat map.
    pub fn get_parameters(&self, namespaces: &[NamespacePath]) -> Result<BTreeMap<String, String>> {
        let mut values = BTreeMap::new();
        for ns in namespaces {
            for item in self.values_below(ns)? {
                values.insert(item.name, item.value);
            }
        }
        Ok(values)
    }

    /// Metadata joined with decrypted values. Each namespace costs one
    /// metadata traversal and one value traversal.
    pub fn describe_parameters(
        &self,
        namespaces: &[NamespacePath],
    ) -> Result<BTreeMap<String, ParameterDescriptor>> {
        let mut described = BTreeMap::new();
        for ns in namespaces {
            let metadata = self.collect_metadata(&[ParameterFilter::NameBeginsWith(
                ns.storage_prefix(),
            )])?;
            let mut values: BTreeMap<String, String> = self
                .values_below(ns)?
                .into_iter()
                .map(|v| (v.name, v.value))
                .collect();

            for meta in metadata {
                let Some(value) = values.remove(&meta.name) else {
                    tracing::debug!(name = %meta.name, "metadata without value, skipping");
                    continue;
                };
                described.insert(
                    meta.name.clone(),
                    ParameterDescriptor {
                        name: meta.name,
                        kind: if meta.secure {
                            ParameterKind::Secret
                        } else {
                            ParameterKind::Plain
                        },
                        value,
                        last_modified_at: meta.last_modified_at,
                        last_modified_by: meta.last_modified_by,
                    },
                );
            }
        }
        Ok(described)
    }

    /// Names of parameters carrying every one of `tags`, sorted.
    pub fn find_by_tags(&self, tags: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let filters: Vec<ParameterFilter> = tags
            .iter()
            .map(|(k, v)| ParameterFilter::TagEquals {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        let mut names: Vec<String> = self
            .collect_metadata(&filters)?
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, full_name: &str) -> Result<bool> {
        let found = self.collect_metadata(&[ParameterFilter::NameEquals(full_name.to_string())])?;
        Ok(found.iter().any(|m| m.name == full_name))
    }

    pub fn list_keys(&self) -> Result<Vec<KeyAlias>> {
        Ok(self.keys.list_aliases()?)
    }

    fn values_below(&self, ns: &NamespacePath) -> Result<Vec<ParameterValue>> {
        let path = ns.to_storage_path(None);
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.store.get_parameters_by_path(&path, token.as_deref())?;
            items.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    fn collect_metadata(&self, filters: &[ParameterFilter]) -> Result<Vec<ParameterMetadata>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.store.describe_parameters(filters, token.as_deref())?;
            items.extend(page.items);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(items)
    }
}

impl Drop for ConfigSession {
    fn drop(&mut self) {
        tracing::debug!(stage = %self.stage, "released config session");
    }
}

impl std::fmt::Debug for ConfigSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSession")
            .field("stage", &self.stage)
            .field("key_alias", &self.key_alias)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
