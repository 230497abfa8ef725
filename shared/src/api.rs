//! REST backend boundary: request builders, response classification and
//! envelope unwrapping. Nothing here performs I/O.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::http::{body_bytes, HttpError, APPLICATION_JSON, HttpRequest, HttpResponse, HttpResult};
use crate::config::ApiConfig;
use crate::entities::{EntityKind, EntityRecord};
use crate::error::{AppError, AppResult, ErrorKind};
use crate::session::{Credentials, LoginGrant, User};

/// `{data: {data: [...]}}` is the deepest envelope seen in practice.
pub const MAX_ENVELOPE_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClient {
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn prepare(&self, request: HttpRequest, token: Option<&SecretString>) -> Result<HttpRequest, HttpError> {
        let request = request.with_header("Accept", APPLICATION_JSON)?;
        match token {
            Some(token) => request.with_header("Authorization", format!("Bearer {}", token.expose_secret())),
            None => Ok(request),
        }
    }

    pub fn login(&self, credentials: &Credentials) -> Result<HttpRequest, HttpError> {
        let body = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password.expose_secret(),
        });
        self.prepare(HttpRequest::post(self.url("auth/login"))?, None)?
            .with_json(&body)
    }

    pub fn logout(&self, token: &SecretString) -> Result<HttpRequest, HttpError> {
        self.prepare(HttpRequest::post(self.url("auth/logout"))?, Some(token))
    }

    pub fn me(&self, token: &SecretString) -> Result<HttpRequest, HttpError> {
        self.prepare(HttpRequest::get(self.url("auth/me"))?, Some(token))
    }

    pub fn list(&self, kind: EntityKind, token: Option<&SecretString>) -> Result<HttpRequest, HttpError> {
        self.prepare(HttpRequest::get(self.url(kind.slug()))?, token)
    }

    pub fn create(
        &self,
        kind: EntityKind,
        body: &Value,
        token: Option<&SecretString>,
    ) -> Result<HttpRequest, HttpError> {
        self.prepare(HttpRequest::post(self.url(kind.slug()))?, token)?
            .with_json(body)
    }

    pub fn update(
        &self,
        kind: EntityKind,
        id: &str,
        body: &Value,
        token: Option<&SecretString>,
    ) -> Result<HttpRequest, HttpError> {
        let path = record_path(kind, id)?;
        self.prepare(HttpRequest::put(self.url(&path))?, token)?
            .with_json(body)
    }

    pub fn delete(&self, kind: EntityKind, id: &str, token: Option<&SecretString>) -> Result<HttpRequest, HttpError> {
        let path = record_path(kind, id)?;
        self.prepare(HttpRequest::delete(self.url(&path))?, token)
    }
}

fn record_path(kind: EntityKind, id: &str) -> Result<String, HttpError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(HttpError::InvalidRequest {
            reason: "record id cannot be empty".into(),
        });
    }
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    Ok(format!("{}/{}", kind.slug(), encoded))
}

/// Success passes through; everything else becomes an [`AppError`].
pub fn classify(result: HttpResult) -> AppResult<HttpResponse> {
    match result {
        Ok(response) if response.status().is_success() => Ok(response),
        Ok(response) => {
            let status = u16::from(response.status());
            tracing::warn!(status, "backend returned an unexpected status");
            Err(AppError::from_http_status(status, Some(body_bytes(&response))))
        }
        Err(crux_http::Error::Http(e)) => {
            let status = u16::from(e.code);
            let error = AppError::from_http_status(status, e.body.as_deref());
            tracing::warn!(status, code = error.code(), "backend returned an error status");
            Err(error)
        }
        Err(e) => {
            let kind = match &e {
                crux_http::Error::Timeout => ErrorKind::Timeout,
                crux_http::Error::Io(_) => ErrorKind::Network,
                crux_http::Error::Url(_) => ErrorKind::Configuration,
                crux_http::Error::Json(_) => ErrorKind::Deserialization,
                crux_http::Error::Http(_) => ErrorKind::InvalidState,
            };
            tracing::warn!(error = %e, code = kind.code(), "request failed before a response");
            Err(AppError::new(kind, "request failed").with_internal(e.to_string()))
        }
    }
}

fn parse_body(body: &[u8]) -> AppResult<Value> {
    serde_json::from_slice(body).map_err(|e| {
        AppError::new(ErrorKind::Deserialization, "response is not valid JSON").with_internal(e.to_string())
    })
}

/// Accepts a bare array, `{data: [...]}` or `{data: {data: [...]}}`.
pub fn unwrap_collection(body: &[u8]) -> AppResult<Vec<EntityRecord>> {
    unwrap_collection_value(parse_body(body)?)
}

pub fn unwrap_collection_value(mut value: Value) -> AppResult<Vec<EntityRecord>> {
    for _ in 0..=MAX_ENVELOPE_DEPTH {
        value = match value {
            Value::Array(items) => return Ok(items),
            Value::Object(mut map) => match map.remove("data") {
                Some(inner) => inner,
                None => break,
            },
            _ => break,
        };
    }
    Err(AppError::new(
        ErrorKind::Deserialization,
        "response does not contain a collection",
    ))
}

/// Accepts `{key: {...}}`, `{data: {...}}` or the bare object.
pub fn unwrap_entity(body: &[u8], key: &str) -> AppResult<EntityRecord> {
    match parse_body(body)? {
        Value::Object(mut map) => {
            for wrapper in [key, "data"] {
                if let Some(Value::Object(inner)) = map.remove(wrapper) {
                    return Ok(Value::Object(inner));
                }
            }
            Ok(Value::Object(map))
        }
        _ => Err(AppError::new(ErrorKind::Deserialization, "response does not contain a record")),
    }
}

/// Identity returned by `GET /auth/me`.
pub fn parse_identity(body: &[u8]) -> AppResult<User> {
    let value = unwrap_entity(body, "user")?;
    serde_json::from_value(value).map_err(|e| {
        AppError::new(ErrorKind::Deserialization, "identity response is malformed").with_internal(e.to_string())
    })
}

pub fn parse_login(body: &[u8]) -> AppResult<LoginGrant> {
    let mut value = parse_body(body)?;
    if value.get("token").is_none() && value.get("access_token").is_none() {
        if let Some(inner) = value.get_mut("data").map(Value::take) {
            value = inner;
        }
    }
    serde_json::from_value(value).map_err(|e| {
        AppError::new(ErrorKind::Deserialization, "login response is malformed").with_internal(e.to_string())
    })
}

/// Identifies one issued fetch. Later tokens compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Latest-issued-wins: a response is applied only if its token is the most
/// recent one issued and not yet completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSequencer {
    issued: u64,
    latest: Option<RequestToken>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self) -> RequestToken {
        self.issued += 1;
        let token = RequestToken(self.issued);
        self.latest = Some(token);
        token
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest == Some(token)
    }

    /// Returns whether the response for `token` should be applied.
    pub fn complete(&mut self, token: RequestToken) -> bool {
        if self.is_current(token) {
            self.latest = None;
            true
        } else {
            tracing::debug!(
                token = token.value(),
                latest = ?self.latest.map(RequestToken::value),
                "discarding stale response"
            );
            false
        }
    }

    pub fn in_flight(&self) -> bool {
        self.latest.is_some()
    }
}
