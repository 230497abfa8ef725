use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::access::{visible_navigation, GuardDecision};
use crate::entities::{EntityKind, EntityRecord, Route};
use crate::error::AppError;
use crate::list_view::{derive_page, page_window};
use crate::model::{EntityScreen, Model, ToastKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub state: ViewState,
    pub navigation: Vec<NavEntry>,
    pub identity: Option<IdentityView>,
    pub toast: Option<ToastView>,
    pub error: Option<UserFacingError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewState {
    /// Boot resolution still running; nothing protected may be shown yet.
    Loading,
    Login { pending: bool },
    AccessDenied { title: String },
    Dashboard,
    List(ListScreenView),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListScreenView {
    pub kind: EntityKind,
    pub title: String,
    pub rows: Vec<EntityRecord>,
    pub search_term: String,
    pub filters: BTreeMap<String, String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub page_window: Vec<usize>,
    pub filtered_count: usize,
    pub total_count: usize,
    pub loading: bool,
    pub saving: bool,
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavEntry {
    pub route: Route,
    pub path: String,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityView {
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastView {
    pub kind: ToastKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub code: String,
    pub message: String,
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub retryable: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(error: &AppError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.user_facing_message(),
            field_errors: error.field_errors.clone(),
            retryable: error.is_retryable(),
        }
    }
}

pub fn build_view(model: &Model) -> ViewModel {
    let route = model.route;
    let state = match route.requirement() {
        None => ViewState::Login {
            pending: model.session.is_login_pending(),
        },
        Some(requirement) => match model.config.access.evaluate(&model.session, &requirement) {
            GuardDecision::Pending => ViewState::Loading,
            GuardDecision::RedirectToLogin => ViewState::Login {
                pending: model.session.is_login_pending(),
            },
            GuardDecision::AccessDenied => ViewState::AccessDenied {
                title: route.label().to_string(),
            },
            GuardDecision::Granted => match route {
                Route::Entity(kind) => ViewState::List(list_screen(model, kind)),
                Route::Dashboard | Route::Login => ViewState::Dashboard,
            },
        },
    };

    let navigation = visible_navigation(&model.config.access, &model.session)
        .into_iter()
        .map(|entry| NavEntry {
            route: entry,
            path: entry.path(),
            label: entry.label().to_string(),
            active: entry == route,
        })
        .collect();

    let identity = model
        .session
        .state()
        .user
        .filter(|_| model.session.is_authenticated())
        .map(|user| IdentityView {
            name: user.name,
            email: user.email,
            roles: user.roles.into_iter().map(|r| r.0).collect(),
        });

    ViewModel {
        state,
        navigation,
        identity,
        toast: model.toast.as_ref().map(|t| ToastView {
            kind: t.kind,
            message: t.message.clone(),
        }),
        error: model.error.as_ref().map(UserFacingError::from),
    }
}

fn list_screen(model: &Model, kind: EntityKind) -> ListScreenView {
    match model.screen(kind) {
        Some(screen) => list_screen_from(model, screen),
        None => ListScreenView {
            kind,
            title: kind.label().to_string(),
            rows: Vec::new(),
            search_term: String::new(),
            filters: BTreeMap::new(),
            current_page: 1,
            total_pages: 1,
            page_window: vec![1],
            filtered_count: 0,
            total_count: 0,
            loading: true,
            saving: false,
            notice: None,
        },
    }
}

fn list_screen_from(model: &Model, screen: &EntityScreen) -> ListScreenView {
    let query = screen.list.query();
    let page = derive_page(&screen.collection, screen.list.config(), query);

    ListScreenView {
        kind: screen.kind,
        title: screen.kind.label().to_string(),
        rows: page.visible_items.into_iter().cloned().collect(),
        search_term: query.search_term.clone(),
        filters: query.filters.clone(),
        current_page: page.current_page,
        total_pages: page.total_pages,
        page_window: page_window(page.current_page, page.total_pages, model.config.page_window).collect(),
        filtered_count: page.filtered_count,
        total_count: screen.collection.len(),
        loading: screen.is_loading() && !screen.loaded,
        saving: screen.mutation_pending,
        notice: screen.notice.clone(),
    }
}
