//! AWS-backed parameter store and key resolver.
//!
//! One SDK configuration per stage, loaded from the named profile
//! `<prefix><stage>`. The SDK clients are async; every call is driven to
//! completion on a current-thread runtime shared by the provider's sessions.

use super::{
    CloudSession, ConfigSession, ConfigStorage, KeyAlias, KeyResolver, Page, ParameterFilter,
    ParameterMetadata, ParameterStore, ParameterValue, PutParameterRequest, SessionProvider,
};
use crate::error::{Result, StoreError, StoreResult};
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_kms::operation::decrypt::DecryptError;
use aws_sdk_kms::operation::encrypt::EncryptError;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::operation::delete_parameter::DeleteParameterError;
use aws_sdk_ssm::primitives::DateTime as AwsDateTime;
use aws_sdk_ssm::types::{ParameterStringFilter, ParameterType, ResourceTypeForTagging, Tag};
use chrono::{DateTime, Utc};
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::rc::Rc;
use tokio::runtime::Runtime;

/// Service maximums for the two listing calls.
const PATH_PAGE_SIZE: i32 = 10;
const DESCRIBE_PAGE_SIZE: i32 = 50;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Map a modeled service error code onto a [`StoreError`].
fn classify(code: Option<&str>, message: Option<&str>) -> StoreError {
    let message = message.unwrap_or_default().to_string();
    match code {
        Some("ParameterNotFound" | "ParameterVersionNotFound" | "NotFoundException") => {
            StoreError::NotFound(message)
        }
        Some(c)
            if c.starts_with("AccessDenied")
                || matches!(
                    c,
                    "UnrecognizedClientException" | "ExpiredTokenException" | "InvalidClientTokenId"
                ) =>
        {
            StoreError::AccessDenied(message)
        }
        Some(c) => StoreError::Remote {
            code: c.to_string(),
            message,
        },
        None => StoreError::Transport(message),
    }
}

fn store_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    match err {
        SdkError::ServiceError(service) => {
            let e = service.err();
            classify(e.code(), e.message())
        }
        other => StoreError::Transport(DisplayErrorContext(&other).to_string()),
    }
}

fn delete_error<R: Debug>(name: &str, err: SdkError<DeleteParameterError, R>) -> StoreError {
    match err.as_service_error() {
        Some(DeleteParameterError::ParameterNotFound(_)) => StoreError::NotFound(name.to_string()),
        _ => store_error(err),
    }
}

fn encrypt_error<R: Debug>(key_id: &str, err: SdkError<EncryptError, R>) -> StoreError {
    match err.as_service_error() {
        Some(EncryptError::NotFoundException(_)) => StoreError::NotFound(key_id.to_string()),
        _ => store_error(err),
    }
}

fn decrypt_error<R: Debug>(err: SdkError<DecryptError, R>) -> StoreError {
    match err.as_service_error() {
        Some(DecryptError::InvalidCiphertextException(_)) => {
            StoreError::Malformed("ciphertext is not valid for this account".to_string())
        }
        _ => store_error(err),
    }
}

fn malformed(err: impl std::fmt::Display) -> StoreError {
    StoreError::Malformed(err.to_string())
}

// ---------------------------------------------------------------------------
// SSM
// ---------------------------------------------------------------------------

fn string_filter(filter: &ParameterFilter) -> StoreResult<ParameterStringFilter> {
    let (key, option, value) = match filter {
        ParameterFilter::NameBeginsWith(prefix) => ("Name".to_string(), "BeginsWith", prefix),
        ParameterFilter::NameEquals(name) => ("Name".to_string(), "Equals", name),
        ParameterFilter::TagEquals { key, value } => (format!("tag:{key}"), "Equals", value),
    };
    ParameterStringFilter::builder()
        .key(key)
        .option(option)
        .values(value)
        .build()
        .map_err(malformed)
}

fn to_chrono(at: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(at.secs(), at.subsec_nanos())
}

pub struct SsmClient {
    client: aws_sdk_ssm::Client,
    runtime: Rc<Runtime>,
}

impl SsmClient {
    pub fn new(config: &SdkConfig, runtime: Rc<Runtime>) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
            runtime,
        }
    }
}

impl ParameterStore for SsmClient {
    fn put_parameter(&self, request: &PutParameterRequest) -> StoreResult<()> {
        let kind = if request.secure {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };
        let mut call = self
            .client
            .put_parameter()
            .name(&request.name)
            .value(&request.value)
            .r#type(kind)
            .overwrite(request.overwrite);
        if request.secure {
            call = call.set_key_id(request.key_id.clone());
        }
        self.runtime.block_on(call.send()).map_err(store_error)?;
        Ok(())
    }

    fn add_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> StoreResult<()> {
        let tags = tags
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build().map_err(malformed))
            .collect::<StoreResult<Vec<_>>>()?;
        let call = self
            .client
            .add_tags_to_resource()
            .resource_type(ResourceTypeForTagging::Parameter)
            .resource_id(name)
            .set_tags(Some(tags));
        self.runtime.block_on(call.send()).map_err(store_error)?;
        Ok(())
    }

    fn delete_parameter(&self, name: &str) -> StoreResult<()> {
        let call = self.client.delete_parameter().name(name);
        self.runtime
            .block_on(call.send())
            .map_err(|e| delete_error(name, e))?;
        Ok(())
    }

    fn get_parameters_by_path(
        &self,
        path: &str,
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterValue>> {
        let call = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .with_decryption(true)
            .max_results(PATH_PAGE_SIZE)
            .set_next_token(next_token.map(str::to_string));
        let output = self.runtime.block_on(call.send()).map_err(store_error)?;
        let items = output
            .parameters()
            .iter()
            .filter_map(|p| {
                Some(ParameterValue {
                    name: p.name()?.to_string(),
                    value: p.value()?.to_string(),
                })
            })
            .collect();
        Ok(Page {
            items,
            next_token: output.next_token().map(str::to_string),
        })
    }

    fn describe_parameters(
        &self,
        filters: &[ParameterFilter],
        next_token: Option<&str>,
    ) -> StoreResult<Page<ParameterMetadata>> {
        let filters = filters
            .iter()
            .map(string_filter)
            .collect::<StoreResult<Vec<_>>>()?;
        let call = self
            .client
            .describe_parameters()
            .set_parameter_filters(Some(filters))
            .max_results(DESCRIBE_PAGE_SIZE)
            .set_next_token(next_token.map(str::to_string));
        let output = self.runtime.block_on(call.send()).map_err(store_error)?;
        let items = output
            .parameters()
            .iter()
            .filter_map(|p| {
                Some(ParameterMetadata {
                    name: p.name()?.to_string(),
                    secure: p.r#type() == Some(&ParameterType::SecureString),
                    last_modified_at: p.last_modified_date().and_then(to_chrono),
                    last_modified_by: p.last_modified_user().map(str::to_string),
                })
            })
            .collect();
        Ok(Page {
            items,
            next_token: output.next_token().map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// KMS
// ---------------------------------------------------------------------------

pub struct KmsClient {
    client: aws_sdk_kms::Client,
    runtime: Rc<Runtime>,
}

impl KmsClient {
    pub fn new(config: &SdkConfig, runtime: Rc<Runtime>) -> Self {
        Self {
            client: aws_sdk_kms::Client::new(config),
            runtime,
        }
    }
}

impl KeyResolver for KmsClient {
    fn list_aliases(&self) -> StoreResult<Vec<KeyAlias>> {
        self.runtime.block_on(async {
            let mut pages = self.client.list_aliases().into_paginator().send();
            let mut aliases = Vec::new();
            while let Some(page) = pages.next().await {
                let page = page.map_err(store_error)?;
                aliases.extend(page.aliases().iter().filter_map(|a| {
                    Some(KeyAlias {
                        alias_name: a.alias_name()?.to_string(),
                        target_key_id: a.target_key_id().map(str::to_string),
                    })
                }));
            }
            Ok::<_, StoreError>(aliases)
        })
    }

    fn encrypt(&self, key_id: &str, plaintext: &[u8]) -> StoreResult<Vec<u8>> {
        let call = self
            .client
            .encrypt()
            .key_id(key_id)
            .plaintext(Blob::new(plaintext));
        let output = self
            .runtime
            .block_on(call.send())
            .map_err(|e| encrypt_error(key_id, e))?;
        output
            .ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| malformed("encrypt response has no ciphertext"))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> StoreResult<Vec<u8>> {
        let call = self.client.decrypt().ciphertext_blob(Blob::new(ciphertext));
        let output = self.runtime.block_on(call.send()).map_err(decrypt_error)?;
        output
            .plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| malformed("decrypt response has no plaintext"))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub struct AwsSession {
    profile: String,
    config: SdkConfig,
    runtime: Rc<Runtime>,
    account_id: OnceCell<String>,
}

impl AwsSession {
    /// Load credentials and region for the named profile.
    pub fn load(profile: &str, runtime: Rc<Runtime>) -> Self {
        let loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(profile);
        let config = runtime.block_on(loader.load());
        tracing::debug!(profile, region = ?config.region(), "loaded aws profile");
        Self {
            profile: profile.to_string(),
            config,
            runtime,
            account_id: OnceCell::new(),
        }
    }
}

impl CloudSession for AwsSession {
    fn profile(&self) -> &str {
        &self.profile
    }

    fn region(&self) -> Option<String> {
        self.config.region().map(|r| r.to_string())
    }

    fn account_id(&self) -> StoreResult<String> {
        if let Some(id) = self.account_id.get() {
            return Ok(id.clone());
        }
        let sts = aws_sdk_sts::Client::new(&self.config);
        let output = self
            .runtime
            .block_on(sts.get_caller_identity().send())
            .map_err(store_error)?;
        let id = output
            .account()
            .ok_or_else(|| malformed("caller identity has no account"))?;
        Ok(self.account_id.get_or_init(|| id.to_string()).clone())
    }

    fn parameter_store(&self) -> Box<dyn ParameterStore> {
        Box::new(SsmClient::new(&self.config, Rc::clone(&self.runtime)))
    }

    fn key_resolver(&self) -> Box<dyn KeyResolver> {
        Box::new(KmsClient::new(&self.config, Rc::clone(&self.runtime)))
    }
}

/// Sessions are created on first use per stage and reused afterwards.
pub struct AwsSessionProvider {
    prefix: String,
    runtime: OnceCell<Rc<Runtime>>,
    sessions: RefCell<HashMap<String, Rc<AwsSession>>>,
}

impl AwsSessionProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            runtime: OnceCell::new(),
            sessions: RefCell::new(HashMap::new()),
        }
    }

    fn runtime(&self) -> Result<Rc<Runtime>> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(Rc::clone(runtime));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Rc::clone(self.runtime.get_or_init(|| Rc::new(runtime))))
    }
}

impl SessionProvider for AwsSessionProvider {
    fn profile_name(&self, stage: &str) -> String {
        format!("{}{stage}", self.prefix)
    }

    fn session(&self, stage: &str) -> Result<Rc<dyn CloudSession>> {
        if let Some(existing) = self.sessions.borrow().get(stage) {
            return Ok(Rc::clone(existing) as Rc<dyn CloudSession>);
        }
        let session = Rc::new(AwsSession::load(&self.profile_name(stage), self.runtime()?));
        self.sessions
            .borrow_mut()
            .insert(stage.to_string(), Rc::clone(&session));
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// SsmConfigStorage
// ---------------------------------------------------------------------------

pub struct SsmConfigStorage {
    sessions: Rc<dyn SessionProvider>,
    default_stage: String,
    key_alias: String,
}

impl SsmConfigStorage {
    pub fn new(
        sessions: Rc<dyn SessionProvider>,
        default_stage: impl Into<String>,
        key_alias: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            default_stage: default_stage.into(),
            key_alias: key_alias.into(),
        }
    }
}

impl ConfigStorage for SsmConfigStorage {
    fn name(&self) -> &'static str {
        "ssm"
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
