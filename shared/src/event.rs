use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::api::RequestToken;
use crate::capabilities::http::HttpResult;
use crate::capabilities::kv::KvResult;
use crate::config::AppConfig;
use crate::entities::{EntityKind, EntityRecord, Route};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationAction {
    Create,
    Update { id: String },
    Delete { id: String },
}

impl MutationAction {
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update { .. } => "updated",
            Self::Delete { .. } => "deleted",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Event {
    #[default]
    Noop,

    // --- Boot / session ---
    /// Replaces the configuration; only honoured before `AppStarted`.
    Configure(AppConfig),
    AppStarted,
    SessionLoaded(KvResult),
    SessionVerified(HttpResult),
    SessionStored(KvResult),
    SessionPurged(KvResult),

    LoginSubmitted {
        email: String,
        password: SecretString,
    },
    LoginResponse(HttpResult),
    LogoutRequested,
    LogoutResponse(HttpResult),

    // --- Navigation ---
    Navigate(Route),
    RefreshRequested,

    // --- List screen ---
    SearchChanged(String),
    FilterChanged {
        key: String,
        value: String,
    },
    FiltersCleared,
    PageSelected(usize),
    CollectionFetched {
        kind: EntityKind,
        token: RequestToken,
        result: HttpResult,
    },

    // --- Mutations ---
    CreateRequested {
        kind: EntityKind,
        record: EntityRecord,
    },
    UpdateRequested {
        kind: EntityKind,
        id: String,
        record: EntityRecord,
    },
    DeleteRequested {
        kind: EntityKind,
        id: String,
    },
    MutationResponse {
        kind: EntityKind,
        action: MutationAction,
        result: HttpResult,
    },

    DismissError,
    DismissToast,
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::AppStarted => "app_started",
            Self::SessionLoaded(_) => "session_loaded",
            Self::SessionVerified(_) => "session_verified",
            Self::SessionStored(_) => "session_stored",
            Self::SessionPurged(_) => "session_purged",
            Self::LoginSubmitted { .. } => "login_submitted",
            Self::LoginResponse(_) => "login_response",
            Self::LogoutRequested => "logout_requested",
            Self::LogoutResponse(_) => "logout_response",
            Self::Navigate(_) => "navigate",
            Self::RefreshRequested => "refresh_requested",
            Self::SearchChanged(_) => "search_changed",
            Self::FilterChanged { .. } => "filter_changed",
            Self::FiltersCleared => "filters_cleared",
            Self::PageSelected(_) => "page_selected",
            Self::CollectionFetched { .. } => "collection_fetched",
            Self::CreateRequested { .. } => "create_requested",
            Self::UpdateRequested { .. } => "update_requested",
            Self::DeleteRequested { .. } => "delete_requested",
            Self::MutationResponse { .. } => "mutation_response",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::LoginSubmitted { .. }
                | Self::LogoutRequested
                | Self::Navigate(_)
                | Self::RefreshRequested
                | Self::SearchChanged(_)
                | Self::FilterChanged { .. }
                | Self::FiltersCleared
                | Self::PageSelected(_)
                | Self::CreateRequested { .. }
                | Self::UpdateRequested { .. }
                | Self::DeleteRequested { .. }
                | Self::DismissError
                | Self::DismissToast
        )
    }

    pub fn login(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::LoginSubmitted {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }
}
