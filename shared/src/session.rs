//! Session lifecycle: the single writer of `{token, user}`.
//!
//! `SessionStore` performs no I/O. Each transition mutates the in-memory
//! session and returns the [`SessionCommand`]s the caller must carry out
//! (persist, purge, verify, revoke, redirect).

use secrecy::{ExposeSecret, SecretString};
use serde::{de, ser::SerializeStruct, Deserialize, Deserializer, Serialize, Serializer};

use crate::capabilities::kv::{KeyNamespace, KvError, TypedKvSlot};
use crate::error::AppError;

/// Stored as `session:auth`.
pub const SESSION_STORAGE_KEY: &str = "auth";

pub fn session_slot() -> Result<TypedKvSlot<PersistedSession>, KvError> {
    TypedKvSlot::new(KeyNamespace::Session, SESSION_STORAGE_KEY)
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

name_type!(UserId);
name_type!(RoleName);
name_type!(PermissionName);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Unknown,
    Authenticating,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: UserId,
    #[serde(default, alias = "full_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "deserialize_names")]
    pub roles: Vec<RoleName>,
    #[serde(default, deserialize_with = "deserialize_names")]
    pub permissions: Vec<PermissionName>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            email: email.into(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleName>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PermissionName>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<UserId, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(UserId(s)),
        serde_json::Value::Number(n) => Ok(UserId(n.to_string())),
        other => Err(de::Error::custom(format!("invalid user id: {other}"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameEntry {
    Plain(String),
    Named { name: String },
}

/// Accepts `["admin"]`, `[{"name": "admin"}]`, or `null`.
fn deserialize_names<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let entries = Option::<Vec<NameEntry>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            NameEntry::Plain(name) | NameEntry::Named { name } => T::from(name),
        })
        .collect())
}

impl From<String> for RoleName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<String> for PermissionName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: SecretString::new(password.into()),
        }
    }
}

/// Persisted `{token, user}` document.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedSession {
    pub token: SecretString,
    pub user: User,
}

impl Serialize for PersistedSession {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PersistedSession", 2)?;
        state.serialize_field("token", self.token.expose_secret())?;
        state.serialize_field("user", &self.user)?;
        state.end()
    }
}

/// Successful login payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    #[serde(alias = "access_token")]
    pub token: SecretString,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub loading: bool,
    pub authenticated: bool,
    pub login_pending: bool,
    pub user: Option<User>,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    VerifyIdentity { token: SecretString },
    SubmitLogin { credentials: Credentials },
    Persist(PersistedSession),
    Purge,
    /// Best-effort; its outcome never changes local state.
    RevokeRemote { token: SecretString },
    RedirectToLogin,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::VerifyIdentity { .. } => "verify_identity",
            SessionCommand::SubmitLogin { .. } => "submit_login",
            SessionCommand::Persist(_) => "persist",
            SessionCommand::Purge => "purge",
            SessionCommand::RevokeRemote { .. } => "revoke_remote",
            SessionCommand::RedirectToLogin => "redirect_to_login",
        }
    }
}

/// Short, non-reversible token identifier for logs.
pub fn token_fingerprint(token: &SecretString) -> String {
    let hash = blake3::hash(token.expose_secret().as_bytes());
    hash.to_hex().as_str()[..12].to_string()
}

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    phase: SessionPhase,
    token: Option<SecretString>,
    user: Option<User>,
    login_pending: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Boot-time resolution is still in progress.
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Unknown | SessionPhase::Authenticating)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn is_login_pending(&self) -> bool {
        self.login_pending
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn bearer(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn state(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            loading: self.is_loading(),
            authenticated: self.is_authenticated(),
            login_pending: self.login_pending,
            user: self.user.clone(),
        }
    }

    /// Applies the result of reading persisted material at boot.
    pub fn restore(&mut self, stored: Result<Option<PersistedSession>, KvError>) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Unknown {
            tracing::warn!(phase = ?self.phase, "session restore ignored outside boot");
            return Vec::new();
        }

        match stored {
            Ok(Some(persisted)) => {
                tracing::info!(
                    token = %token_fingerprint(&persisted.token),
                    user_id = %persisted.user.id,
                    "persisted session found, verifying"
                );
                let token = persisted.token.clone();
                self.token = Some(persisted.token);
                self.user = None;
                self.phase = SessionPhase::Authenticating;
                vec![SessionCommand::VerifyIdentity { token }]
            }
            Ok(None) => {
                tracing::debug!("no persisted session");
                self.phase = SessionPhase::Unauthenticated;
                Vec::new()
            }
            Err(e) if e.is_corrupt() => {
                tracing::warn!(error = %e, "persisted session unreadable, purging");
                self.phase = SessionPhase::Unauthenticated;
                vec![SessionCommand::Purge]
            }
            Err(e) => {
                tracing::warn!(error = %e, "session storage unavailable");
                self.phase = SessionPhase::Unauthenticated;
                Vec::new()
            }
        }
    }

    /// Applies the outcome of the boot-time "who am I" call.
    pub fn verified(&mut self, result: Result<User, AppError>) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Authenticating {
            tracing::debug!(phase = ?self.phase, "late verification result discarded");
            return Vec::new();
        }

        match (result, self.token.clone()) {
            (Ok(user), Some(token)) => {
                tracing::info!(user_id = %user.id, roles = user.roles.len(), "session verified");
                self.user = Some(user.clone());
                self.phase = SessionPhase::Authenticated;
                vec![SessionCommand::Persist(PersistedSession { token, user })]
            }
            (Err(e), _) => {
                tracing::info!(code = e.code(), "session verification failed, purging");
                self.clear();
                vec![SessionCommand::Purge]
            }
            (Ok(_), None) => {
                tracing::error!("verification succeeded without a held token");
                self.clear();
                vec![SessionCommand::Purge]
            }
        }
    }

    pub fn begin_login(&mut self, credentials: Credentials) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Unauthenticated {
            tracing::warn!(phase = ?self.phase, "login ignored in current phase");
            return Vec::new();
        }
        if self.login_pending {
            tracing::debug!("login already in flight");
            return Vec::new();
        }

        self.login_pending = true;
        vec![SessionCommand::SubmitLogin { credentials }]
    }

    pub fn login_completed(&mut self, result: Result<LoginGrant, AppError>) -> Vec<SessionCommand> {
        if !self.login_pending {
            tracing::debug!("login response without pending login discarded");
            return Vec::new();
        }
        self.login_pending = false;

        match result {
            Ok(grant) => {
                tracing::info!(
                    token = %token_fingerprint(&grant.token),
                    user_id = %grant.user.id,
                    "login succeeded"
                );
                self.token = Some(grant.token.clone());
                self.user = Some(grant.user.clone());
                self.phase = SessionPhase::Authenticated;
                vec![SessionCommand::Persist(PersistedSession {
                    token: grant.token,
                    user: grant.user,
                })]
            }
            Err(e) => {
                tracing::info!(code = e.code(), "login failed");
                Vec::new()
            }
        }
    }

    /// Local logout always completes; remote revocation is best-effort.
    pub fn logout(&mut self) -> Vec<SessionCommand> {
        let token = self.token.take();
        if let Some(token) = &token {
            tracing::info!(token = %token_fingerprint(token), "logging out");
        }
        self.clear();

        let mut commands = vec![SessionCommand::Purge];
        if let Some(token) = token {
            commands.push(SessionCommand::RevokeRemote { token });
        }
        commands.push(SessionCommand::RedirectToLogin);
        commands
    }

    /// ForcedInvalidation: an unauthorized response arrived while authenticated.
    pub fn invalidate(&mut self) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Authenticated {
            return Vec::new();
        }
        tracing::warn!(
            user_id = ?self.user.as_ref().map(|u| u.id.as_str()),
            "backend rejected credentials, invalidating session"
        );
        self.clear();
        vec![SessionCommand::Purge, SessionCommand::RedirectToLogin]
    }

    fn clear(&mut self) {
        self.token = None;
        self.user = None;
        self.login_pending = false;
        self.phase = SessionPhase::Unauthenticated;
    }
}
