//! # Connectivity Prober
//!
//! Verifies that an external Gitea answers and accepts the mirrored credential.
//! Read-only: only `GET` requests are issued.
//!
//! 1. `GET /api/v1/version` to confirm the endpoint is a Gitea
//! 2. `GET /api/v1/user` to confirm the credential authenticates

use super::credential::{Credential, CredentialAuth};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const VERSION_PATH: &str = "/api/v1/version";
const USER_PATH: &str = "/api/v1/user";

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Endpoint answered and the credential authenticated
    Reachable { version: String },
    /// Network failure or timeout
    Unreachable(String),
    /// Endpoint answered but rejected the credential
    Unauthorized(String),
    /// Anything else
    Unexpected(String),
}

impl ProbeOutcome {
    /// Unauthorized needs a credential fix, so it is not retried on the backoff schedule
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProbeOutcome::Unreachable(_) | ProbeOutcome::Unexpected(_)
        )
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Reachable { .. } => "reachable",
            ProbeOutcome::Unreachable(_) => "unreachable",
            ProbeOutcome::Unauthorized(_) => "unauthorized",
            ProbeOutcome::Unexpected(_) => "unexpected",
        }
    }
}

/// Capability check against an external Gitea
#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    async fn probe(&self, credential: &Credential) -> ProbeOutcome;
}

#[derive(Deserialize)]
struct VersionResponse {
    version: String,
}

/// HTTP prober for the Gitea REST API
#[derive(Debug, Clone)]
pub struct GiteaProber {
    client: Client,
}

impl GiteaProber {
    /// Every request, connect included, is bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    fn get(&self, credential: &Credential, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{path}", credential.url));
        match &credential.auth {
            CredentialAuth::Token(token) => {
                request.header(reqwest::header::AUTHORIZATION, format!("token {token}"))
            }
            CredentialAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }

    async fn send(
        &self,
        credential: &Credential,
        path: &str,
    ) -> Result<reqwest::Response, ProbeOutcome> {
        let response = self
            .get(credential, path)
            .send()
            .await
            .map_err(|e| classify_transport_error(path, e))?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProbeOutcome::Unauthorized(
                format!("GET {path} returned {}", response.status()),
            )),
            status => Err(ProbeOutcome::Unexpected(format!(
                "GET {path} returned {status}"
            ))),
        }
    }
}

fn classify_transport_error(path: &str, err: reqwest::Error) -> ProbeOutcome {
    let retryable = err.is_connect() || err.is_timeout();
    // The URL may carry userinfo
    let err = err.without_url();
    if retryable {
        ProbeOutcome::Unreachable(format!("GET {path}: {err}"))
    } else {
        ProbeOutcome::Unexpected(format!("GET {path}: {err}"))
    }
}

#[async_trait]
impl ConnectivityProber for GiteaProber {
    async fn probe(&self, credential: &Credential) -> ProbeOutcome {
        debug!("Probing Gitea at {}", credential.url);

        let version = match self.send(credential, VERSION_PATH).await {
            Ok(response) => match response.json::<VersionResponse>().await {
                Ok(body) => body.version,
                Err(e) => {
                    return ProbeOutcome::Unexpected(format!(
                        "GET {VERSION_PATH} returned an unrecognised body: {}",
                        e.without_url()
                    ))
                }
            },
            Err(outcome) => return outcome,
        };

        match self.send(credential, USER_PATH).await {
            Ok(_) => ProbeOutcome::Reachable { version },
            Err(outcome) => outcome,
        }
    }
}
