//! Encryption helper for ad-hoc values.

use crate::error::{Result, StoreError, StylistError};
use crate::store::{KeyAlias, SessionProvider};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use std::rc::Rc;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KmsOptions {
    /// Alias (without `alias/`) used when none is given per call.
    #[serde(default)]
    pub key: Option<String>,
}

pub struct KmsHelper {
    sessions: Rc<dyn SessionProvider>,
    stage: String,
    default_alias: String,
}

impl KmsHelper {
    pub fn new(sessions: Rc<dyn SessionProvider>, stage: &str, default_alias: &str) -> Self {
        Self {
            sessions,
            stage: stage.to_string(),
            default_alias: default_alias.to_string(),
        }
    }

    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    pub fn list_keys(&self) -> Result<Vec<KeyAlias>> {
        let keys = self.sessions.session(&self.stage)?.key_resolver();
        let mut aliases = keys.list_aliases()?;
        aliases.sort_by(|a, b| a.alias_name.cmp(&b.alias_name));
        Ok(aliases)
    }

    /// Encrypt `plaintext` and return the ciphertext base64 encoded.
    pub fn encrypt(&self, plaintext: &str, alias: Option<&str>) -> Result<String> {
        let alias = alias.unwrap_or(&self.default_alias);
        let keys = self.sessions.session(&self.stage)?.key_resolver();
        let key_id = keys
            .resolve_key_by_alias(alias)?
            .ok_or_else(|| StylistError::KeyResolution(alias.to_string()))?;
        let blob = keys.encrypt(&key_id, plaintext.as_bytes())?;
        Ok(STANDARD.encode(blob))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let blob = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| StoreError::Malformed(format!("ciphertext is not base64: {e}")))?;
        let keys = self.sessions.session(&self.stage)?.key_resolver();
        let plain = keys.decrypt(&blob)?;
        String::from_utf8(plain)
            .map_err(|e| StoreError::Malformed(format!("plaintext is not utf-8: {e}")).into())
    }
}
