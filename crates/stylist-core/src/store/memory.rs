//! In-process parameter store and key resolver.
//!
//! Behaves like the remote store where callers can observe it: secure values
//! are kept encoded, listings are paginated, deletes of missing names fail.

use super::{
    CloudSession, ConfigSession, ConfigStorage, KeyAlias, KeyResolver, Page, ParameterFilter,
    ParameterMetadata, ParameterStore, ParameterValue, PutParameterRequest, SessionProvider,
};
use crate::error::{Result, StoreError, StoreResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_ACCOUNT_ID: &str = "000000000000";
const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct StoredParameter {
    value: String,
    secure: bool,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    last_modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    parameters: BTreeMap<String, StoredParameter>,
    fail_tagging: bool,
}

/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct MemoryParameterStore {
    state: Rc<RefCell<State>>,
    page_size: usize,
}

impl Default for MemoryParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryParameterStore {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The stored representation, encoded for secure parameters.
    pub fn raw_value(&self, name: &str) -> Option<String> {
        self.state
            .borrow()
            .parameters
            .get(name)
            .map(|p| p.value.clone())
    }

    pub fn tags(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.state.borrow().parameters.get(name).map(|p| p.tags.clone())
    }

    pub(super) fn snapshot(&self) -> BTreeMap<String, StoredParameter> {
        self.state.borrow().parameters.clone()
    }

    pub(super) fn restore(&self, parameters: BTreeMap<String, StoredParameter>) {
        self.state.borrow_mut().parameters = parameters;
    }

    /// Make every subsequent `add_tags` call fail.
    pub fn fail_tagging(&self, fail: bool) {
        self.state.borrow_mut().fail_tagging = fail;
    }

    fn paginate<T>(&self, matching: Vec<(String, T)>, next_token: Option<&str>) -> Page<T> {
        let mut remaining: Vec<(String, T)> = matching
            .into_iter()
            .filter(|(name, _)| next_token.map_or(true, |t| name.as_str() >= t))
            .collect();
        let next = if remaining.len() > self.page_size {
            Some(remaining[self.page_size].0.clone())
        } else {
            None
        };
        remaining.truncate(self.page_size);
        Page {
            items: remaining.into_iter().map(|(_, item)| item).collect(),
            next_token: next,
        }
    }
}

fn seal(key_id: &str, value: &str) -> String {
    format!("sealed:{}", STANDARD.encode(format!("{key_id}:{value}")))
}

fn unseal(stored: &str) -> StoreResult<String> {
    let encoded = stored
        .strip_prefix("sealed:")
        .ok_or_else(|| StoreError::Malformed("value is not sealed".to_string()))?;
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::Malformed(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| StoreError::Malformed(e.to_string()))?;
    text.split_once(':')
        .map(|(_, v)| v.to_string())
        .ok_or_else(|| StoreError::Malformed("sealed value has no key id".to_string()))
}

impl ParameterStore for MemoryParameterStore {
    fn put_parameter(&self, request: &PutParameterRequest) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        if !request.overwrite && state.parameters.contains_key(&request.name) {
            return Err(StoreError::Remote {
                code: "ParameterAlreadyExists".to_string(),
                message: request.name.clone(),
            });
        }
        let value = match (&request.key_id, request.secure) {
            (Some(key_id), true) => seal(key_id, &request.value),
            (None, true) => seal("default", &request.value),
            _ => request.value.clone(),
        };
        let tags = state
            .parameters
            .get(&request.name)
            .map(|p| p.tags.clone())
            .unwrap_or_default();
        state.parameters.insert(
            request.name.clone(),
            StoredParameter {
                value,
                secure: request.secure,
                tags,
                last_modified_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn add_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> StoreResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_tagging {
            return Err(StoreError::Transport("tagging unavailable".to_string()));
        }
        let param = state
            .parameters
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        param.tags.extend(tags.clone());
        Ok(())
    }

    fn delete_parameter(&self, name: &str) -> StoreResult<()> {
        self.state
            .borrow_mut()
            .parameters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterValue>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let state = self.state.borrow();
        let mut matching = Vec::new();
        for (name, param) in state.parameters.iter().filter(|(n, _)| n.starts_with(&prefix)) {
            let value = if param.secure {
                unseal(&param.value)?
            } else {
                param.value.clone()
            };
            matching.push((
                name.clone(),
                ParameterValue {
                    name: name.clone(),
                    value,
                },
            ));
        }
        Ok(self.paginate(matching, next_token))
    }

    fn describe_parameters(
        &self,
        filters: &[ParameterFilter],
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterMetadata>> {
        let state = self.state.borrow();
        let matching = state
            .parameters
            .iter()
            .filter(|(name, param)| {
                filters.iter().all(|f| match f {
                    ParameterFilter::NameBeginsWith(p) => name.starts_with(p.as_str()),
                    ParameterFilter::NameEquals(n) => name.as_str() == n.as_str(),
                    ParameterFilter::TagEquals { key, value } => param.tags.get(key) == Some(value),
                })
            })
            .map(|(name, param)| {
                (
                    name.clone(),
                    ParameterMetadata {
                        name: name.clone(),
                        secure: param.secure,
                        last_modified_at: Some(param.last_modified_at),
                        last_modified_by: Some("memory".to_string()),
                    },
                )
            })
            .collect();
        Ok(self.paginate(matching, next_token))
    }
}

// ---------------------------------------------------------------------------
// MemoryKeyResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryKeyResolver {
    aliases: Vec<KeyAlias>,
}

impl MemoryKeyResolver {
    pub fn new(aliases: Vec<KeyAlias>) -> Self {
        Self { aliases }
    }

    pub fn with_alias(alias: &str, key_id: &str) -> Self {
        Self::new(vec![KeyAlias {
            alias_name: format!("alias/{alias}"),
            target_key_id: Some(key_id.to_string()),
        }])
    }

    fn knows(&self, key_id: &str) -> bool {
        self.aliases
            .iter()
            .any(|a| a.target_key_id.as_deref() == Some(key_id))
    }
}

impl KeyResolver for MemoryKeyResolver {
    fn list_aliases(&self) -> StoreResult<Vec<KeyAlias>> {
        Ok(self.aliases.clone())
    }

    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> StoreResult<Vec<u8>> {
        if !self.knows(key_id) {
            return Err(StoreError::NotFound(key_id.to_string()));
        }
        let mut blob = format!("{key_id}:").into_bytes();
        blob.extend(plaintext.iter().map(|b| b ^ 0x5a));
        Ok(blob)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> StoreResult<Vec<u8>> {
        let split = ciphertext
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| StoreError::Malformed("ciphertext has no key id".to_string()))?;
        let key_id = String::from_utf8_lossy(&ciphertext[..split]);
        if !self.knows(&key_id) {
            return Err(StoreError::AccessDenied(key_id.into_owned()));
        }
        Ok(ciphertext[split + 1..].iter().map(|b| b ^ 0x5a).collect())
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub struct MemorySession {
    profile: String,
    account_id: String,
    region: Option<String>,
    store: MemoryParameterStore,
    keys: MemoryKeyResolver,
}

impl CloudSession for MemorySession {
    fn profile(&self) -> &str {
        &self.profile
    }

    fn region(&self) -> Option<String> {
        self.region.clone()
    }

    fn account_id(&self) -> StoreResult<String> {
        Ok(self.account_id.clone())
    }

    fn parameter_store(&self) -> Box<dyn ParameterStore> {
        Box::new(self.store.clone())
    }

    fn key_resolver(&self) -> Box<dyn KeyResolver> {
        Box::new(self.keys.clone())
    }
}

/// One independent [`MemoryParameterStore`] per stage.
#[derive(Debug)]
pub struct MemorySessionProvider {
    prefix: String,
    account_id: String,
    region: Option<String>,
    page_size: usize,
    keys: MemoryKeyResolver,
    stores: RefCell<BTreeMap<String, MemoryParameterStore>>,
}

impl MemorySessionProvider {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            region: Some(DEFAULT_REGION.to_string()),
            page_size: DEFAULT_PAGE_SIZE,
            keys: MemoryKeyResolver::default(),
            stores: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_keys(mut self, keys: MemoryKeyResolver) -> Self {
        self.keys = keys;
        self
    }

    /// Account and region reported by every session.
    pub fn with_identity(mut self, account_id: &str, region: Option<&str>) -> Self {
        self.account_id = account_id.to_string();
        self.region = region.map(str::to_string);
        self
    }

    /// The store backing `stage`, created empty on first use.
    pub fn store(&self, stage: &str) -> MemoryParameterStore {
        self.stores
            .borrow_mut()
            .entry(stage.to_string())
            .or_insert_with(|| MemoryParameterStore::new().with_page_size(self.page_size))
            .clone()
    }
}

impl SessionProvider for MemorySessionProvider {
    fn profile_name(&self, stage: &str) -> String {
        format!("{}{stage}", self.prefix)
    }

    fn session(&self, stage: &str) -> Result<Rc<dyn CloudSession>> {
        Ok(Rc::new(MemorySession {
            profile: self.profile_name(stage),
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            store: self.store(stage),
            keys: self.keys.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// MemoryConfigStorage
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MemoryConfigStorage {
    default_stage: String,
    key_alias: String,
    sessions: MemorySessionProvider,
}

impl MemoryConfigStorage {
    pub fn new(default_stage: &str, key_alias: &str) -> Self {
        Self {
            default_stage: default_stage.to_string(),
            key_alias: key_alias.to_string(),
            sessions: MemorySessionProvider::new(""),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.sessions = self.sessions.with_page_size(page_size);
        self
    }

    pub fn with_keys(mut self, keys: MemoryKeyResolver) -> Self {
        self.sessions = self.sessions.with_keys(keys);
        self
    }

    pub fn store(&self, stage: &str) -> MemoryParameterStore {
        self.sessions.store(stage)
    }
}

impl ConfigStorage for MemoryConfigStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, stage: Option<&str>) -> Result<ConfigSession> {
        let stage = stage.unwrap_or(&self.default_stage);
        let session = self.sessions.session(stage)?;
        Ok(ConfigSession::new(
            stage,
            self.key_alias.clone(),
            session.parameter_store(),
            session.key_resolver(),
        ))
    }
}
