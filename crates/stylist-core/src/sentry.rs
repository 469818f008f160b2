//! Sentry project provisioning through the Sentry web API.

use crate::error::{Result, StylistError};
use crate::settings::SentrySettings;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_SENTRY_HOST: &str = "sentry.io";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The two calls project setup needs.
pub trait SentryApi {
    /// Create project `slug` under the configured team. A project that
    /// already exists is not an error.
    fn create_project(&self, slug: &str) -> Result<()>;

    /// Create a client key for project `slug` and return its secret DSN.
    fn create_client_key(&self, slug: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ClientKey {
    dsn: Dsn,
}

#[derive(Debug, Deserialize)]
struct Dsn {
    secret: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    detail: String,
}

pub struct SentryClient {
    http: Client,
    base_url: String,
    token: String,
    org: String,
    team: String,
}

impl SentryClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        org: impl Into<String>,
        team: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("stylist/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(request_error)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            org: org.into(),
            team: team.into(),
        })
    }

    pub fn from_settings(settings: &SentrySettings) -> Result<Self> {
        let host = settings.host.as_deref().unwrap_or(DEFAULT_SENTRY_HOST);
        Self::new(
            format!("https://{host}"),
            &settings.auth_token,
            &settings.org,
            &settings.team,
        )
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        let url = format!("{}/api/0/{path}", self.base_url);
        tracing::debug!(%url, "sentry request");
        self.http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(request_error)
    }
}

fn request_error(err: reqwest::Error) -> StylistError {
    StylistError::Sentry(err.to_string())
}

fn api_error(status: StatusCode, response: Response) -> StylistError {
    let detail = response
        .json::<ApiError>()
        .map(|e| e.detail)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
    StylistError::Sentry(format!("{}: {detail}", status.as_u16()))
}

impl SentryApi for SentryClient {
    fn create_project(&self, slug: &str) -> Result<()> {
        let path = format!("teams/{}/{}/projects/", self.org, self.team);
        let response = self.post(&path, json!({ "name": slug, "slug": slug }))?;
        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(project = slug, "created sentry project");
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::info!(project = slug, "sentry project already exists");
                Ok(())
            }
            status => Err(api_error(status, response)),
        }
    }

    fn create_client_key(&self, slug: &str) -> Result<String> {
        let path = format!("projects/{}/{slug}/keys/", self.org);
        let response = self.post(&path, json!({ "name": format!("{slug}'s key") }))?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response));
        }
        let key: ClientKey = response.json().map_err(request_error)?;
        Ok(key.dsn.secret)
    }
}
