//! Blocking JSON client for the account and catalog backend.
//!
//! Every request carries `Authorization: Bearer <token>` using the session's
//! access token, or its refresh token when no access token is held. A 401
//! triggers one `POST /refresh-token` followed by a single retry of the
//! original request; a failed refresh clears the session.

pub mod credentials;
pub mod session;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::models::UserTokens;
use session::{lock, SharedSession};

pub use credentials::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
pub use session::{Session, ALL_LOCATIONS};

const REFRESH_PATH: &str = "/refresh-token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Failure of a backend call, recoverable from `anyhow::Error` via `downcast_ref`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiError {
    InvalidUrl(String),
    /// 204 where a body was expected.
    NoData,
    /// 401 that survived a token refresh.
    Unauthorized,
    RefreshFailed,
    /// 500.
    Server,
    Status(u16),
    Transport(String),
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NoData => Some(204),
            ApiError::Unauthorized => Some(401),
            ApiError::Server => Some(500),
            ApiError::Status(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidUrl(url) => write!(f, "Invalid URL: {}", url),
            ApiError::NoData => f.write_str("No data"),
            ApiError::Unauthorized => f.write_str("Unauthorized"),
            ApiError::RefreshFailed => f.write_str("Failed to refresh token"),
            ApiError::Server => f.write_str("Internal server error"),
            ApiError::Status(code) => write!(f, "HTTP Error {}", code),
            ApiError::Transport(msg) => write!(f, "transport error: {}", msg),
            ApiError::Decode(msg) => write!(f, "decode error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Typed view of an error returned by the gateway or a service.
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.downcast_ref::<ApiError>()
}

#[derive(Clone)]
pub struct ApiGateway {
    agent: ureq::Agent,
    base: Url,
    session: SharedSession,
}

impl ApiGateway {
    pub fn new(server_url: &str, session: SharedSession) -> Result<Self> {
        Self::with_timeout(server_url, session, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(server_url: &str, session: SharedSession, timeout: Duration) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|_| ApiError::InvalidUrl(server_url.to_string()))
            .with_context(|| format!("parse server url {}", server_url))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            base,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Issue a request and decode the JSON response.
    ///
    /// GET params become query items; other methods send them as a JSON body.
    pub fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        method: HttpMethod,
        params: Option<&Value>,
    ) -> Result<T> {
        let bearer = lock(&self.session)?.bearer();
        let body = match self.execute(path, method, params, bearer.as_deref()) {
            Err(ApiError::Unauthorized) => {
                log::debug!("{} {} returned 401; refreshing", method.as_str(), path);
                self.refresh()?;
                let bearer = lock(&self.session)?.bearer();
                self.execute(path, method, params, bearer.as_deref())?
            }
            other => other?,
        };
        serde_json::from_str(&body)
            .map_err(|err| ApiError::Decode(err.to_string()))
            .with_context(|| format!("decode response of {} {}", method.as_str(), path))
    }

    fn refresh(&self) -> Result<()> {
        let refresh_token = lock(&self.session)?.refresh_token();
        let outcome = match refresh_token.as_deref() {
            Some(token) => self.execute(REFRESH_PATH, HttpMethod::Post, None, Some(token)),
            None => Err(ApiError::Unauthorized),
        };

        match outcome {
            Ok(body) => {
                let renewed = serde_json::from_str::<UserTokens>(&body)
                    .ok()
                    .and_then(|response| response.tokens);
                let mut session = lock(&self.session)?;
                match renewed {
                    Some(tokens) => session.set_tokens(tokens)?,
                    None => session.drop_access_token(),
                }
                log::info!("access token refreshed");
                Ok(())
            }
            Err(err) => {
                log::warn!("token refresh failed: {}; clearing session", err);
                lock(&self.session)?.clear()?;
                Err(ApiError::RefreshFailed.into())
            }
        }
    }

    fn execute(
        &self,
        path: &str,
        method: HttpMethod,
        params: Option<&Value>,
        bearer: Option<&str>,
    ) -> std::result::Result<String, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self.agent.request(method.as_str(), url.as_str());
        if let Some(token) = bearer {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }

        let result = match (method, params) {
            (HttpMethod::Get, Some(Value::Object(map))) => {
                for (key, value) in map {
                    request = request.query(key, &query_value(value));
                }
                request.call()
            }
            (HttpMethod::Get, _) | (_, None) => request.call(),
            (_, Some(body)) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
        };

        match result {
            Ok(response) if response.status() == 204 => Err(ApiError::NoData),
            Ok(response) => response
                .into_string()
                .map_err(|err| ApiError::Transport(err.to_string())),
            Err(ureq::Error::Status(code, _)) => Err(match code {
                401 => ApiError::Unauthorized,
                500 => ApiError::Server,
                other => ApiError::Status(other),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(ApiError::Transport(transport.to_string()))
            }
        }
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|_| ApiError::InvalidUrl(joined))
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn status_errors_render_like_the_app_expects() {
        assert_eq!(ApiError::NoData.to_string(), "No data");
        assert_eq!(ApiError::Server.to_string(), "Internal server error");
        assert_eq!(ApiError::Status(404).to_string(), "HTTP Error 404");
        assert_eq!(ApiError::Status(404).status(), Some(404));
    }

    #[test]
    fn invalid_server_url_is_rejected() {
        let session = Session::shared(Arc::new(InMemoryCredentialStore::new()));
        let err = ApiGateway::new("not a url", session).err().unwrap();
        assert!(matches!(api_error(&err), Some(ApiError::InvalidUrl(_))));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let session = Session::shared(Arc::new(InMemoryCredentialStore::new()));
        let gateway = ApiGateway::new("https://example.test/", session).unwrap();
        assert_eq!(
            gateway.endpoint("/devices/abc").unwrap().as_str(),
            "https://example.test/devices/abc"
        );
    }

    #[test]
    fn query_values_are_unquoted_strings() {
        assert_eq!(query_value(&Value::String("Kitchen".into())), "Kitchen");
        assert_eq!(query_value(&serde_json::json!(3)), "3");
    }
}
