//! # Credential
//!
//! Connection material for an external Gitea, parsed from the referenced
//! Secret. Values are never logged: `Debug` only shows the endpoint and the
//! kind of authentication.

use super::desired::DesiredState;
use crate::constants::{
    CREDENTIAL_KEY_PASSWORD, CREDENTIAL_KEY_TOKEN, CREDENTIAL_KEY_URL, CREDENTIAL_KEY_USERNAME,
};
use crate::store::{ObjectStore, StoreError};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential is missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("credential url must start with http:// or https://")]
    InvalidUrl,
    #[error("credential must contain either 'token' or both 'username' and 'password'")]
    MissingAuth,
}

#[derive(Clone, PartialEq, Eq)]
pub enum CredentialAuth {
    Token(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for CredentialAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialAuth::Token(_) => f.write_str("token"),
            CredentialAuth::Basic { .. } => f.write_str("basic"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Base URL of the Gitea instance, without a trailing slash
    pub url: String,
    pub auth: CredentialAuth,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match self.auth {
            CredentialAuth::Token(_) => "token",
            CredentialAuth::Basic { .. } => "basic",
        };
        f.debug_struct("Credential")
            .field("url", &self.url)
            .field("auth", &auth)
            .finish()
    }
}

impl Credential {
    /// Parse credential material from decoded Secret data
    ///
    /// A token wins over basic auth when both are present.
    pub fn from_data(data: &BTreeMap<String, String>) -> Result<Self, CredentialError> {
        let url = non_empty(data, CREDENTIAL_KEY_URL)
            .ok_or(CredentialError::MissingKey(CREDENTIAL_KEY_URL))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CredentialError::InvalidUrl);
        }
        let url = url.trim_end_matches('/').to_string();

        let auth = if let Some(token) = non_empty(data, CREDENTIAL_KEY_TOKEN) {
            CredentialAuth::Token(token.to_string())
        } else {
            match (
                non_empty(data, CREDENTIAL_KEY_USERNAME),
                non_empty(data, CREDENTIAL_KEY_PASSWORD),
            ) {
                (Some(username), Some(password)) => CredentialAuth::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => return Err(CredentialError::MissingAuth),
            }
        };

        Ok(Self { url, auth })
    }

    /// Secret data for the credential mirror
    #[must_use]
    pub fn to_data(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        data.insert(CREDENTIAL_KEY_URL.to_string(), self.url.clone());
        match &self.auth {
            CredentialAuth::Token(token) => {
                data.insert(CREDENTIAL_KEY_TOKEN.to_string(), token.clone());
            }
            CredentialAuth::Basic { username, password } => {
                data.insert(CREDENTIAL_KEY_USERNAME.to_string(), username.clone());
                data.insert(CREDENTIAL_KEY_PASSWORD.to_string(), password.clone());
            }
        }
        data
    }
}

/// Outcome of looking up the referenced credential Secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    /// Internal mode
    NotRequired,
    Resolved(Credential),
    NotFound { secret: String },
    Invalid { secret: String, error: CredentialError },
    LookupFailed { secret: String, error: StoreError },
}

impl CredentialState {
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            CredentialState::Resolved(credential) => Some(credential),
            _ => None,
        }
    }

    /// Read and parse the Secret referenced by `desired`, if any
    pub async fn lookup(store: &dyn ObjectStore, desired: &DesiredState) -> Self {
        let Some(secret) = desired.credential_ref() else {
            return CredentialState::NotRequired;
        };
        let secret = secret.to_string();

        match store.get_secret_data(&desired.namespace, &secret).await {
            Ok(Some(data)) => match Credential::from_data(&data) {
                Ok(credential) => {
                    debug!("Resolved credential from Secret {}/{}", desired.namespace, secret);
                    CredentialState::Resolved(credential)
                }
                Err(error) => {
                    warn!(
                        "Secret {}/{} does not hold a usable credential: {}",
                        desired.namespace, secret, error
                    );
                    CredentialState::Invalid { secret, error }
                }
            },
            Ok(None) => CredentialState::NotFound { secret },
            Err(error) => CredentialState::LookupFailed { secret, error },
        }
    }
}

fn non_empty<'a>(data: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    data.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_token_credential() {
        let credential = Credential::from_data(&data(&[
            ("url", "https://git.example.com/"),
            ("token", "abc"),
        ]))
        .unwrap();
        assert_eq!(credential.url, "https://git.example.com");
        assert_eq!(credential.auth, CredentialAuth::Token("abc".to_string()));
    }

    #[test]
    fn test_basic_credential() {
        let credential = Credential::from_data(&data(&[
            ("url", "http://gitea.internal:3000"),
            ("username", "admin"),
            ("password", "hunter2"),
        ]))
        .unwrap();
        assert!(matches!(credential.auth, CredentialAuth::Basic { .. }));
    }

    #[test]
    fn test_token_wins_over_basic() {
        let credential = Credential::from_data(&data(&[
            ("url", "https://git.example.com"),
            ("token", "abc"),
            ("username", "admin"),
            ("password", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(credential.auth, CredentialAuth::Token("abc".to_string()));
        assert!(!credential.to_data().contains_key("password"));
    }

    #[test]
    fn test_missing_url() {
        let err = Credential::from_data(&data(&[("token", "abc")])).unwrap_err();
        assert_eq!(err, CredentialError::MissingKey("url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let err =
            Credential::from_data(&data(&[("url", "git.example.com"), ("token", "abc")]))
                .unwrap_err();
        assert_eq!(err, CredentialError::InvalidUrl);
    }

    #[test]
    fn test_missing_auth() {
        let err = Credential::from_data(&data(&[
            ("url", "https://git.example.com"),
            ("username", "admin"),
        ]))
        .unwrap_err();
        assert_eq!(err, CredentialError::MissingAuth);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credential = Credential::from_data(&data(&[
            ("url", "https://git.example.com"),
            ("token", "very-secret-token"),
        ]))
        .unwrap();
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("git.example.com"));
        assert!(!rendered.contains("very-secret-token"));
    }

    #[test]
    fn test_round_trip_through_mirror_data() {
        let original = data(&[("url", "https://git.example.com"), ("token", "abc")]);
        let credential = Credential::from_data(&original).unwrap();
        assert_eq!(credential.to_data(), original);
    }
}
