use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::{ApiClient, RequestSequencer};
use crate::config::AppConfig;
use crate::entities::{EntityKind, EntityRecord, Route};
use crate::error::AppError;
use crate::list_view::ListView;
use crate::session::{SessionStore, UserId};

pub const TOAST_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub kind: ToastKind,
    pub message: String,
}

impl ToastMessage {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        let mut message: String = message.into();
        if message.len() > TOAST_MAX_LEN {
            let cut = (0..=TOAST_MAX_LEN)
                .rev()
                .find(|i| message.is_char_boundary(*i))
                .unwrap_or(0);
            message.truncate(cut);
        }
        Self { kind, message }
    }
}

/// State of one entity list screen. Survives navigation away and back.
#[derive(Debug, Clone)]
pub struct EntityScreen {
    pub kind: EntityKind,
    pub collection: Vec<EntityRecord>,
    pub list: ListView<EntityRecord>,
    pub sequencer: RequestSequencer,
    pub loaded: bool,
    /// Shown instead of an error page when the last fetch failed.
    pub notice: Option<String>,
    pub mutation_pending: bool,
}

impl EntityScreen {
    pub fn new(kind: EntityKind, items_per_page: usize) -> Self {
        Self {
            kind,
            collection: Vec::new(),
            list: ListView::new(kind.list_config(items_per_page)),
            sequencer: RequestSequencer::new(),
            loaded: false,
            notice: None,
            mutation_pending: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.sequencer.in_flight()
    }

    /// Replaces the base collection and re-derives the visible page.
    pub fn replace_collection(&mut self, collection: Vec<EntityRecord>) {
        self.collection = collection;
        self.loaded = true;
        self.recompute();
    }

    pub fn recompute(&mut self) {
        let page = self.list.recompute(&self.collection);
        if page.corrected {
            tracing::debug!(kind = %self.kind, "page reset to 1 after recompute");
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    pub config: AppConfig,
    pub api: ApiClient,
    pub session: SessionStore,
    pub route: Route,
    /// Where to land after sign-in.
    pub return_to: Option<Route>,
    /// Set when `return_to` was kept across an invalidated session; only
    /// that user is taken back there.
    pub return_owner: Option<UserId>,
    pub screens: BTreeMap<EntityKind, EntityScreen>,
    pub error: Option<AppError>,
    pub toast: Option<ToastMessage>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl Model {
    pub fn new(config: AppConfig) -> Self {
        let api = ApiClient::new(&config.api);
        Self {
            config,
            api,
            session: SessionStore::new(),
            route: Route::Dashboard,
            return_to: None,
            return_owner: None,
            screens: BTreeMap::new(),
            error: None,
            toast: None,
        }
    }

    /// Swaps in a new configuration. Screens built for the old one are dropped.
    pub fn configure(&mut self, config: AppConfig) {
        self.api = ApiClient::new(&config.api);
        self.config = config;
        self.screens.clear();
    }

    /// The route to resume after `user` signs in, if it is theirs to resume.
    pub fn take_return_to(&mut self, user: Option<&UserId>) -> Option<Route> {
        let owner = self.return_owner.take();
        let route = self.return_to.take()?;
        match owner {
            Some(owner) if Some(&owner) != user => {
                tracing::debug!(route = %route.path(), "return route belonged to another user, dropped");
                None
            }
            _ => Some(route),
        }
    }

    pub fn screen(&self, kind: EntityKind) -> Option<&EntityScreen> {
        self.screens.get(&kind)
    }

    pub fn screen_mut(&mut self, kind: EntityKind) -> &mut EntityScreen {
        let per_page = self.config.items_per_page;
        self.screens
            .entry(kind)
            .or_insert_with(|| EntityScreen::new(kind, per_page))
    }

    /// The entity screen currently on display, if any.
    pub fn active_kind(&self) -> Option<EntityKind> {
        match self.route {
            Route::Entity(kind) => Some(kind),
            Route::Login | Route::Dashboard => None,
        }
    }

    pub fn set_error(&mut self, error: AppError) {
        self.error = Some(error);
    }

    pub fn show_toast(&mut self, kind: ToastKind, message: impl Into<String>) {
        self.toast = Some(ToastMessage::new(kind, message));
    }

    /// Drops everything fetched under the previous identity.
    pub fn clear_user_data(&mut self) {
        self.screens.clear();
        self.error = None;
        self.toast = None;
    }
}
