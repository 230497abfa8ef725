mod common;

use common::{admin_backend, header, http_requests, ok, patients, signed_in, status};
use crux_core::testing::AppTester;
use crux_core::Request;
use crux_http::protocol::HttpRequest;
use hms_admin_shared::view::{ListScreenView, ViewState};
use hms_admin_shared::{App, Effect, EntityKind, Event, Model, Route, ViewModel};
use serde_json::json;

fn list_of(view: ViewModel) -> ListScreenView {
    match view.state {
        ViewState::List(list) => list,
        other => panic!("expected a list screen, got {other:?}"),
    }
}

fn open_patients() -> Event {
    Event::Navigate(Route::Entity(EntityKind::Patients))
}

#[test]
fn enveloped_collection_is_paginated() {
    let backend = admin_backend(|_| ok(json!({"data": {"data": patients(12)}})));
    let mut harness = signed_in(backend);

    harness.dispatch(open_patients());

    let list = list_of(harness.view());
    assert_eq!(list.total_count, 12);
    assert_eq!(list.filtered_count, 12);
    assert_eq!(list.rows.len(), 5);
    assert_eq!(list.current_page, 1);
    assert_eq!(list.total_pages, 3);
    assert_eq!(list.page_window, vec![1, 2, 3]);
    assert!(!list.loading);
    assert!(list.notice.is_none());

    let fetch = harness.last("GET", "/patients").unwrap();
    assert_eq!(header(fetch, "Authorization"), Some("Bearer tok"));

    harness.dispatch(Event::PageSelected(3));
    let list = list_of(harness.view());
    assert_eq!(list.current_page, 3);
    assert_eq!(list.rows.len(), 2);
    assert_eq!(list.rows[0]["id"], 11);

    harness.dispatch(Event::PageSelected(4));
    assert_eq!(list_of(harness.view()).current_page, 3);
}

#[test]
fn narrowing_search_resets_an_out_of_range_page() {
    let backend = admin_backend(|_| ok(json!(patients(12))));
    let mut harness = signed_in(backend);
    harness.dispatch(open_patients());
    harness.dispatch(Event::PageSelected(3));

    harness.dispatch(Event::SearchChanged("SMITH".into()));

    let list = list_of(harness.view());
    assert_eq!(list.filtered_count, 6);
    assert_eq!(list.total_pages, 2);
    assert_eq!(list.current_page, 1);
    assert_eq!(list.rows.len(), 5);
    assert_eq!(list.search_term, "SMITH");

    harness.dispatch(Event::SearchChanged("patient1".into()));
    let list = list_of(harness.view());
    assert_eq!(list.filtered_count, 4);
    assert_eq!(list.total_pages, 1);
    assert_eq!(list.page_window, vec![1]);
}

#[test]
fn filters_apply_and_clear() {
    let backend = admin_backend(|_| ok(json!(patients(12))));
    let mut harness = signed_in(backend);
    harness.dispatch(open_patients());

    harness.dispatch(Event::FilterChanged {
        key: "gender".into(),
        value: "female".into(),
    });
    let list = list_of(harness.view());
    assert_eq!(list.filtered_count, 4);
    assert_eq!(list.filters.get("gender").map(String::as_str), Some("female"));
    assert!(list.rows.iter().all(|row| row["gender"] == "female"));

    harness.dispatch(Event::SearchChanged("jones".into()));
    assert_eq!(list_of(harness.view()).filtered_count, 2);

    harness.dispatch(Event::FiltersCleared);
    let list = list_of(harness.view());
    assert_eq!(list.filtered_count, 12);
    assert!(list.filters.is_empty());
    assert!(list.search_term.is_empty());
}

#[test]
fn failed_fetch_shows_empty_list_with_notice() {
    let backend = admin_backend(|_| status(500, json!({"message": "Server Error"})));
    let mut harness = signed_in(backend);

    harness.dispatch(open_patients());

    let view = harness.view();
    assert!(view.error.is_none());
    let list = list_of(view);
    assert!(list.rows.is_empty());
    assert_eq!(list.total_pages, 1);
    assert!(!list.loading);
    assert!(list.notice.unwrap().starts_with("Could not load patients."));
    assert!(harness.model().session.is_authenticated());
}

#[test]
fn revisiting_a_loaded_screen_does_not_refetch() {
    let backend = admin_backend(|_| ok(json!(patients(3))));
    let mut harness = signed_in(backend);

    harness.dispatch(open_patients());
    harness.dispatch(Event::Navigate(Route::Dashboard));
    harness.dispatch(open_patients());
    assert_eq!(harness.count("GET", "/patients"), 1);

    harness.dispatch(Event::RefreshRequested);
    assert_eq!(harness.count("GET", "/patients"), 2);
}

#[test]
fn created_record_triggers_toast_and_refetch() {
    let backend = admin_backend(|request| match request.method.as_str() {
        "POST" => status(201, json!({"data": {"id": 13}})),
        _ => ok(json!(patients(3))),
    });
    let mut harness = signed_in(backend);
    harness.dispatch(open_patients());

    harness.dispatch(Event::CreateRequested {
        kind: EntityKind::Patients,
        record: json!({"first_name": "New", "last_name": "Patient"}),
    });

    let view = harness.view();
    assert_eq!(view.toast.as_ref().unwrap().message, "Record created.");
    assert!(view.error.is_none());
    assert!(!list_of(view).saving);
    assert_eq!(harness.count("POST", "/patients"), 1);
    assert_eq!(harness.count("GET", "/patients"), 2);
}

#[test]
fn deleted_record_uses_encoded_id() {
    let backend = admin_backend(|request| match request.method.as_str() {
        "DELETE" => status(204, json!(null)),
        _ => ok(json!(patients(3))),
    });
    let mut harness = signed_in(backend);
    harness.dispatch(open_patients());

    harness.dispatch(Event::DeleteRequested {
        kind: EntityKind::Patients,
        id: "7".into(),
    });

    assert_eq!(harness.count("DELETE", "/patients/7"), 1);
    assert_eq!(harness.view().toast.unwrap().message, "Record deleted.");
}

#[test]
fn rejected_mutation_exposes_field_errors() {
    let backend = admin_backend(|request| match request.method.as_str() {
        "PUT" => status(
            422,
            json!({
                "message": "The given data was invalid.",
                "errors": {"email": ["The email has already been taken."]}
            }),
        ),
        _ => ok(json!(patients(3))),
    });
    let mut harness = signed_in(backend);
    harness.dispatch(open_patients());

    harness.dispatch(Event::UpdateRequested {
        kind: EntityKind::Patients,
        id: "2".into(),
        record: json!({"email": "p1@mail.test"}),
    });

    let error = harness.view().error.unwrap();
    assert_eq!(
        error.field_errors.get("email"),
        Some(&vec!["The email has already been taken.".to_string()])
    );
    assert_eq!(harness.count("GET", "/patients"), 1);
    assert!(!harness.model().screen(EntityKind::Patients).unwrap().mutation_pending);
}

fn signed_in_tester() -> (AppTester<App, Effect>, Model) {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::new(common::config());

    app.update(Event::AppStarted, &mut model);
    app.update(Event::SessionLoaded(Ok(None)), &mut model);
    let mut login = http_requests(app.update(Event::login("ada@hms.test", "pw"), &mut model));
    assert_eq!(login.len(), 1);
    let body = json!({"token": "tok", "user": common::user(1, "Ada Admin", &["admin"])});
    deliver(&app, &mut model, &mut login[0], body);
    assert!(model.session.is_authenticated());
    (app, model)
}

fn deliver(app: &AppTester<App, Effect>, model: &mut Model, request: &mut Request<HttpRequest>, body: serde_json::Value) {
    resolve(app, model, request, common::ok(body));
}

fn resolve(
    app: &AppTester<App, Effect>,
    model: &mut Model,
    request: &mut Request<HttpRequest>,
    result: crux_http::protocol::HttpResult,
) {
    let update = app.resolve(request, result).expect("request resolves");
    for event in update.events {
        app.update(event, model);
    }
}

#[test]
fn older_response_arriving_last_is_discarded() {
    let (app, mut model) = signed_in_tester();

    let mut older = http_requests(app.update(open_patients(), &mut model));
    let mut newer = http_requests(app.update(Event::RefreshRequested, &mut model));
    assert_eq!(older.len(), 1);
    assert_eq!(newer.len(), 1);
    assert_eq!(older[0].operation.url, newer[0].operation.url);

    deliver(&app, &mut model, &mut newer[0], json!(patients(2)));
    deliver(&app, &mut model, &mut older[0], json!(patients(9)));

    let screen = model.screen(EntityKind::Patients).unwrap();
    assert_eq!(screen.collection.len(), 2);
    assert!(!screen.is_loading());
    assert_eq!(list_of(app.view(&model)).total_count, 2);
}

#[test]
fn superseded_fetch_rejected_as_unauthorized_still_signs_out() {
    let (app, mut model) = signed_in_tester();

    let mut older = http_requests(app.update(open_patients(), &mut model));
    let _newer = http_requests(app.update(Event::RefreshRequested, &mut model));

    resolve(&app, &mut model, &mut older[0], status(401, json!({"message": "Token expired"})));

    assert!(!model.session.is_authenticated());
    assert_eq!(model.route, Route::Login);
    assert_eq!(model.return_to, Some(Route::Entity(EntityKind::Patients)));
    assert!(model.screens.is_empty());
}
