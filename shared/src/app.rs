use secrecy::ExposeSecret;
use std::collections::BTreeMap;

use crate::access::GuardDecision;
use crate::api::{self, RequestToken};
use crate::capabilities::http::body_bytes;
use crate::capabilities::{Capabilities, CapabilityError, HttpError, HttpRequest, HttpResult, KvError};
use crate::entities::{EntityKind, EntityRecord, Route};
use crate::error::{AppError, ErrorKind};
use crate::event::{Event, MutationAction};
use crate::model::{EntityScreen, Model, ToastKind};
use crate::session::{session_slot, Credentials, SessionCommand, SessionPhase};
use crate::view::{build_view, ViewModel};

#[derive(Debug, Default, Clone, Copy)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[tracing::instrument(level = "debug", skip_all, fields(event = event.name()))]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let mut fx = Effects::new(caps);

        if event.is_user_initiated() {
            tracing::debug!("user action");
        }

        match event {
            Event::Noop => {}

            // --- Boot / session ---
            Event::Configure(config) => {
                if model.session.phase() != SessionPhase::Unknown {
                    tracing::warn!("configuration ignored after boot");
                } else if let Err(e) = config.validate() {
                    tracing::error!(error = %e, "configuration rejected");
                    model.set_error(e.into());
                } else {
                    tracing::info!(base_url = %config.api.base_url, "configured");
                    model.configure(config.clamped());
                }
                fx.render();
            }

            Event::AppStarted => {
                if model.session.phase() == SessionPhase::Unknown {
                    match session_slot() {
                        Ok(slot) => slot.get(&caps.kv, Event::SessionLoaded),
                        Err(e) => {
                            let commands = model.session.restore(Err(e));
                            Self::apply_session_commands(model, commands, &mut fx);
                            Self::boot_resolved(model, &mut fx);
                        }
                    }
                } else {
                    tracing::warn!("app start received after boot");
                }
                fx.render();
            }

            Event::SessionLoaded(result) => {
                let stored = session_slot()
                    .and_then(|slot| result.map_err(KvError::from).and_then(|bytes| slot.decode(bytes)));
                let commands = model.session.restore(stored);
                Self::apply_session_commands(model, commands, &mut fx);
                if !model.session.is_loading() {
                    Self::boot_resolved(model, &mut fx);
                }
                fx.render();
            }

            Event::SessionVerified(result) => {
                let outcome = api::classify(result).and_then(|response| api::parse_identity(body_bytes(&response)));
                let commands = model.session.verified(outcome);
                Self::apply_session_commands(model, commands, &mut fx);
                Self::boot_resolved(model, &mut fx);
                fx.render();
            }

            Event::SessionStored(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "could not persist session; it will not survive a reload");
                }
            }

            Event::SessionPurged(result) => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "could not purge persisted session");
                }
            }

            Event::LoginSubmitted { email, password } => {
                let credentials = Credentials {
                    email: email.trim().to_string(),
                    password,
                };

                let mut field_errors = BTreeMap::new();
                if credentials.email.is_empty() {
                    field_errors.insert("email".to_string(), vec!["Email is required.".to_string()]);
                }
                if credentials.password.expose_secret().is_empty() {
                    field_errors.insert("password".to_string(), vec!["Password is required.".to_string()]);
                }

                if field_errors.is_empty() {
                    model.error = None;
                    let commands = model.session.begin_login(credentials);
                    Self::apply_session_commands(model, commands, &mut fx);
                } else {
                    model.set_error(
                        AppError::new(ErrorKind::Validation, "Please enter your email and password.")
                            .with_field_errors(field_errors),
                    );
                }
                fx.render();
            }

            Event::LoginResponse(result) => {
                if model.session.is_login_pending() {
                    Self::login_response(model, result, &mut fx);
                } else {
                    tracing::debug!("login response without a pending login ignored");
                }
            }

            Event::LogoutRequested => {
                let commands = model.session.logout();
                model.clear_user_data();
                Self::apply_session_commands(model, commands, &mut fx);
                model.return_to = None;
                model.return_owner = None;
                model.show_toast(ToastKind::Info, "You have been signed out.");
                fx.render();
            }

            Event::LogoutResponse(result) => {
                // Local state is already gone; the remote outcome only matters for logs.
                if let Err(e) = api::classify(result) {
                    tracing::debug!(code = e.code(), "remote logout failed, ignored");
                }
            }

            // --- Navigation ---
            Event::Navigate(route) => {
                model.error = None;
                Self::enter_route(model, route, &mut fx);
                fx.render();
            }

            Event::RefreshRequested => {
                if let Some(kind) = model.active_kind() {
                    if Self::is_granted(model, Route::Entity(kind)) {
                        Self::fetch_collection(model, kind, &mut fx);
                        fx.render();
                    }
                }
            }

            // --- List screen ---
            Event::SearchChanged(term) => {
                if Self::with_active_screen(model, |screen| screen.list.set_search_term(term)) {
                    fx.render();
                }
            }

            Event::FilterChanged { key, value } => {
                if Self::with_active_screen(model, |screen| screen.list.set_filter(key, value)) {
                    fx.render();
                }
            }

            Event::FiltersCleared => {
                if Self::with_active_screen(model, |screen| screen.list.clear_filters()) {
                    fx.render();
                }
            }

            Event::PageSelected(page) => {
                if let Some(screen) = model.active_kind().and_then(|kind| model.screens.get_mut(&kind)) {
                    if screen.list.set_page(page) {
                        screen.recompute();
                        fx.render();
                    } else {
                        tracing::debug!(page, total = screen.list.total_pages(), "out-of-range page ignored");
                    }
                }
            }

            Event::CollectionFetched { kind, token, result } => {
                Self::collection_fetched(model, kind, token, result, &mut fx);
            }

            // --- Mutations ---
            Event::CreateRequested { kind, record } => {
                Self::mutate(model, kind, MutationAction::Create, Some(record), &mut fx);
                fx.render();
            }

            Event::UpdateRequested { kind, id, record } => {
                Self::mutate(model, kind, MutationAction::Update { id }, Some(record), &mut fx);
                fx.render();
            }

            Event::DeleteRequested { kind, id } => {
                Self::mutate(model, kind, MutationAction::Delete { id }, None, &mut fx);
                fx.render();
            }

            Event::MutationResponse { kind, action, result } => {
                if let Some(screen) = model.screens.get_mut(&kind) {
                    screen.mutation_pending = false;
                }

                match api::classify(result) {
                    Ok(_) => {
                        tracing::info!(%kind, action = action.verb(), "mutation succeeded");
                        model.error = None;
                        model.show_toast(ToastKind::Success, format!("Record {}.", action.verb()));
                        Self::fetch_collection(model, kind, &mut fx);
                    }
                    Err(e) if e.is_unauthorized() => Self::unauthorized(model, &mut fx),
                    Err(e) => {
                        tracing::info!(%kind, code = e.code(), fields = e.field_errors.len(), "mutation rejected");
                        model.set_error(e);
                    }
                }
                fx.render();
            }

            Event::DismissError => {
                model.error = None;
                fx.render();
            }

            Event::DismissToast => {
                model.toast = None;
                fx.render();
            }
        }

        fx.finish();
    }

    fn view(&self, model: &Model) -> ViewModel {
        build_view(model)
    }
}

impl App {
    fn login_response(model: &mut Model, result: HttpResult, fx: &mut Effects) {
        let outcome = api::classify(result)
            .and_then(|response| api::parse_login(body_bytes(&response)))
            .map_err(|e| {
                if e.is_unauthorized() {
                    AppError::new(ErrorKind::Validation, "Invalid email or password.")
                        .with_context("http_status", "401")
                } else {
                    e
                }
            });
        let failure = outcome.as_ref().err().cloned();

        let commands = model.session.login_completed(outcome);
        let signed_in = commands.iter().any(|c| matches!(c, SessionCommand::Persist(_)));
        Self::apply_session_commands(model, commands, fx);

        match failure {
            Some(error) => model.set_error(error),
            None if signed_in => {
                model.clear_user_data();
                let user_id = model.session.user().map(|u| u.id.clone());
                let greeting = model
                    .session
                    .user()
                    .map(|u| format!("Signed in as {}", if u.name.is_empty() { &u.email } else { &u.name }))
                    .unwrap_or_else(|| "Signed in".to_string());
                model.show_toast(ToastKind::Success, greeting);
                let target = model.take_return_to(user_id.as_ref()).unwrap_or(Route::Dashboard);
                Self::enter_route(model, target, fx);
            }
            None => {}
        }
        fx.render();
    }

    fn apply_session_commands(model: &mut Model, commands: Vec<SessionCommand>, fx: &mut Effects) {
        for command in commands {
            tracing::debug!(command = command.name(), "session command");
            match command {
                SessionCommand::VerifyIdentity { token } => match model.api.me(&token) {
                    Ok(request) => fx.http(request, Event::SessionVerified),
                    Err(e) => {
                        let follow_up = model.session.verified(Err(request_error(e)));
                        Self::apply_session_commands(model, follow_up, fx);
                    }
                },
                SessionCommand::SubmitLogin { credentials } => match model.api.login(&credentials) {
                    Ok(request) => fx.http(request, Event::LoginResponse),
                    Err(e) => {
                        let error = request_error(e);
                        model.session.login_completed(Err(error.clone()));
                        model.set_error(error);
                    }
                },
                SessionCommand::Persist(session) => {
                    let persisted = session_slot()
                        .and_then(|slot| slot.set(&fx.caps.kv, &session, Event::SessionStored));
                    if let Err(e) = persisted {
                        tracing::warn!(error = %e, "session not persisted");
                    }
                }
                SessionCommand::Purge => match session_slot() {
                    Ok(slot) => slot.delete(&fx.caps.kv, Event::SessionPurged),
                    Err(e) => tracing::warn!(error = %e, "session not purged"),
                },
                SessionCommand::RevokeRemote { token } => match model.api.logout(&token) {
                    Ok(request) => fx.http(request, Event::LogoutResponse),
                    Err(e) => tracing::debug!(error = %e, "remote logout skipped"),
                },
                SessionCommand::RedirectToLogin => {
                    if model.route != Route::Login {
                        model.return_to = Some(model.route);
                        model.return_owner = None;
                        model.route = Route::Login;
                    }
                }
            }
        }
    }

    /// Boot verification just finished: land on a route the session may see.
    fn boot_resolved(model: &mut Model, fx: &mut Effects) {
        if model.session.is_loading() {
            return;
        }
        tracing::info!(authenticated = model.session.is_authenticated(), "session resolved");
        let route = model.route;
        Self::enter_route(model, route, fx);
    }

    fn enter_route(model: &mut Model, route: Route, fx: &mut Effects) {
        let route = if route == Route::Login && model.session.is_authenticated() {
            Route::Dashboard
        } else {
            route
        };
        model.route = route;

        let Some(requirement) = route.requirement() else {
            return;
        };

        match model.config.access.evaluate(&model.session, &requirement) {
            GuardDecision::Pending => {}
            GuardDecision::RedirectToLogin => {
                model.return_to = Some(route);
                model.return_owner = None;
                model.route = Route::Login;
            }
            GuardDecision::AccessDenied => {
                tracing::info!(route = %route.path(), "access denied");
            }
            GuardDecision::Granted => {
                if let Route::Entity(kind) = route {
                    let screen = model.screen_mut(kind);
                    if !screen.loaded && !screen.is_loading() {
                        Self::fetch_collection(model, kind, fx);
                    }
                }
            }
        }
    }

    fn is_granted(model: &Model, route: Route) -> bool {
        route
            .requirement()
            .is_some_and(|req| model.config.access.evaluate(&model.session, &req) == GuardDecision::Granted)
    }

    fn fetch_collection(model: &mut Model, kind: EntityKind, fx: &mut Effects) {
        let request = model.api.list(kind, model.session.bearer());
        let screen = model.screen_mut(kind);

        match request {
            Ok(request) => {
                let token = screen.sequencer.issue();
                tracing::debug!(%kind, token = token.value(), "fetching collection");
                fx.http(request, move |result| Event::CollectionFetched { kind, token, result });
            }
            Err(e) => {
                tracing::error!(%kind, error = %e, "could not build collection request");
                screen.notice = Some(format!("Could not load {}.", kind.label().to_lowercase()));
            }
        }
    }

    fn collection_fetched(
        model: &mut Model,
        kind: EntityKind,
        token: RequestToken,
        result: HttpResult,
        fx: &mut Effects,
    ) {
        let outcome = api::classify(result).and_then(|response| api::unwrap_collection(body_bytes(&response)));

        // A rejected token invalidates the session even when the fetch was superseded.
        if outcome.as_ref().is_err_and(AppError::is_unauthorized) {
            Self::unauthorized(model, fx);
            fx.render();
            return;
        }

        let Some(screen) = model.screens.get_mut(&kind) else {
            tracing::debug!(%kind, "response for a discarded screen");
            return;
        };
        if !screen.sequencer.complete(token) {
            return;
        }

        match outcome {
            Ok(records) => {
                tracing::debug!(%kind, count = records.len(), "collection loaded");
                screen.notice = None;
                screen.replace_collection(records);
            }
            Err(e) => {
                tracing::warn!(%kind, code = e.code(), "collection fetch failed, showing empty list");
                screen.notice = Some(format!(
                    "Could not load {}. {}",
                    kind.label().to_lowercase(),
                    e.user_facing_message()
                ));
                screen.replace_collection(Vec::new());
            }
        }
        fx.render();
    }

    fn mutate(
        model: &mut Model,
        kind: EntityKind,
        action: MutationAction,
        record: Option<EntityRecord>,
        fx: &mut Effects,
    ) {
        if !Self::is_granted(model, Route::Entity(kind)) {
            model.set_error(AppError::new(
                ErrorKind::Forbidden,
                format!("Not allowed to modify {}", kind.label()),
            ));
            return;
        }

        let bearer = model.session.bearer();
        let empty = EntityRecord::Object(Default::default());
        let body = record.as_ref().unwrap_or(&empty);
        let request = match &action {
            MutationAction::Create => model.api.create(kind, body, bearer),
            MutationAction::Update { id } => model.api.update(kind, id, body, bearer),
            MutationAction::Delete { id } => model.api.delete(kind, id, bearer),
        };

        match request {
            Ok(request) => {
                model.error = None;
                model.screen_mut(kind).mutation_pending = true;
                fx.http(request, move |result| Event::MutationResponse { kind, action, result });
            }
            Err(e) => model.set_error(request_error(e)),
        }
    }

    /// ForcedInvalidation. The current route is kept for the same user only.
    fn unauthorized(model: &mut Model, fx: &mut Effects) {
        let previous = model.session.user().map(|u| u.id.clone());
        let commands = model.session.invalidate();
        if commands.is_empty() {
            return;
        }
        model.clear_user_data();
        model.show_toast(ToastKind::Warning, "Your session has expired. Please sign in again.");
        Self::apply_session_commands(model, commands, fx);
        model.return_owner = previous;
    }

    fn with_active_screen<F>(model: &mut Model, change: F) -> bool
    where
        F: FnOnce(&mut EntityScreen),
    {
        match model.active_kind().and_then(|kind| model.screens.get_mut(&kind)) {
            Some(screen) => {
                change(screen);
                screen.recompute();
                true
            }
            None => false,
        }
    }
}

fn request_error(e: HttpError) -> AppError {
    CapabilityError::from(e).into()
}

/// Capability access for one `update` call. Renders collapse into one.
struct Effects<'a> {
    caps: &'a Capabilities,
    render: bool,
}

impl<'a> Effects<'a> {
    fn new(caps: &'a Capabilities) -> Self {
        Self { caps, render: false }
    }

    fn http<F>(&mut self, request: HttpRequest, make_event: F)
    where
        F: FnOnce(HttpResult) -> Event + Send + 'static,
    {
        tracing::debug!(
            method = request.method().as_str(),
            url = request.url().as_str(),
            request_id = request.request_id(),
            "http effect"
        );
        request.send(&self.caps.http, make_event);
    }

    fn render(&mut self) {
        self.render = true;
    }

    fn finish(self) {
        if self.render {
            self.caps.render.render();
        }
    }
}
