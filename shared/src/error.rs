use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Unauthorized,
    Forbidden,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Server,
    Storage,
    Serialization,
    Deserialization,
    Configuration,
    InvalidState,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Server => "SERVER_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network
            | Self::Timeout
            | Self::Conflict
            | Self::RateLimited
            | Self::Server
            | Self::Storage => ErrorSeverity::Transient,

            Self::Serialization | Self::Configuration | Self::InvalidState => ErrorSeverity::Fatal,

            Self::Unauthorized
            | Self::Forbidden
            | Self::Validation
            | Self::NotFound
            | Self::Deserialization
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    /// Manual retry (re-submit) is worth offering. Nothing is retried automatically.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Server | Self::Conflict
        )
    }

    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::Validation,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    /// Per-field messages from a validation response, keyed by field name.
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            field_errors: BTreeMap::new(),
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_field_errors(mut self, field_errors: BTreeMap<String, Vec<String>>) -> Self {
        self.field_errors = field_errors;
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.kind, ErrorKind::Unauthorized)
    }

    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        self.context.get("http_status").and_then(|s| s.parse().ok())
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network | ErrorKind::Timeout => {
                "Cannot reach the server. Please check your connection and try again.".into()
            }
            ErrorKind::Unauthorized => "Your session has expired. Please sign in again.".into(),
            ErrorKind::Forbidden => "You don't have permission to perform this action.".into(),
            ErrorKind::Validation => {
                if self.message.is_empty() {
                    "Some fields are invalid. Please review the form and try again.".into()
                } else {
                    self.message.clone()
                }
            }
            ErrorKind::NotFound => "The requested record could not be found.".into(),
            ErrorKind::Conflict => {
                "This record was changed by someone else. Please refresh and try again.".into()
            }
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.".into(),
            ErrorKind::Server => "The server ran into a problem. Please try again later.".into(),
            ErrorKind::Storage => "Unable to access local storage in this browser.".into(),
            ErrorKind::Serialization | ErrorKind::Deserialization => {
                "The server sent a response this client could not read.".into()
            }
            ErrorKind::Configuration => {
                "The application is misconfigured. Please contact your administrator.".into()
            }
            ErrorKind::InvalidState | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }

    /// Classifies a non-success response. Validation bodies of the form
    /// `{ "message": ..., "errors": { field: [..] | "..." } }` populate `field_errors`.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = ErrorKind::from_status(status);

        let parsed = body.and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok());

        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone().or_else(|| e.error.clone()))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        let field_errors = parsed
            .and_then(|e| e.errors)
            .map(normalize_field_errors)
            .unwrap_or_default();

        Self::new(kind, message)
            .with_field_errors(field_errors)
            .with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

fn normalize_field_errors(errors: serde_json::Value) -> BTreeMap<String, Vec<String>> {
    let serde_json::Value::Object(map) = errors else {
        return BTreeMap::new();
    };

    map.into_iter()
        .filter_map(|(field, value)| {
            let messages: Vec<String> = match value {
                serde_json::Value::String(s) => vec![s],
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        serde_json::Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            (!messages.is_empty()).then_some((field, messages))
        })
        .collect()
}

pub type AppResult<T> = Result<T, AppError>;
