//! Shared HTTP plumbing for the reqwest-backed clients.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Deserializer};

use crate::traits::SourceError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a JSON client, optionally with a bearer token.
pub(crate) fn build_client(token: Option<&str>, timeout: Duration) -> Result<Client, SourceError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );
    if let Some(token) = token {
        let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SourceError::Unavailable(format!("Invalid token: {}", e)))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Unavailable(format!("Failed to create HTTP client: {}", e)))
}

/// Map non-success statuses onto [`SourceError`].
pub(crate) async fn check_status(response: Response, what: &str) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(what.to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(SourceError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    Err(SourceError::RequestFailed {
        status: status.as_u16(),
        message: body,
    })
}

/// Decode a JSON body, reporting failures as parse errors.
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SourceError> {
    response
        .json()
        .await
        .map_err(|e| SourceError::ParseError(e.to_string()))
}

/// Accept identifiers sent either as strings or as numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// A name field that arrives as a plain string or as `{ "name": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NameOrObject {
    Name(String),
    Object {
        #[serde(alias = "title", alias = "label")]
        name: String,
    },
}

impl NameOrObject {
    pub(crate) fn into_name(self) -> String {
        match self {
            NameOrObject::Name(name) | NameOrObject::Object { name } => name,
        }
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
