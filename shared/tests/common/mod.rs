#![allow(dead_code)]

use crux_core::testing::{AppTester, Update};
use crux_http::protocol::{HttpRequest, HttpResponse, HttpResult};
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use hms_admin_shared::{App, AppConfig, Effect, Event, Model, ViewModel};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};

pub const BASE: &str = "https://hms.test/api";

type Backend = Box<dyn Fn(&HttpRequest) -> HttpResult>;

/// Drives the app the way a shell would: every HTTP request goes to a
/// scripted backend, key-value operations hit an in-memory map, and the
/// resulting events are fed back until nothing is left.
pub struct Harness {
    app: AppTester<App, Effect>,
    model: Model,
    backend: Backend,
    store: HashMap<String, Vec<u8>>,
    requests: Vec<HttpRequest>,
    renders: usize,
}

impl Harness {
    pub fn new<F>(backend: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResult + 'static,
    {
        Self {
            app: AppTester::default(),
            model: Model::new(config()),
            backend: Box::new(backend),
            store: HashMap::new(),
            requests: Vec::new(),
            renders: 0,
        }
    }

    pub fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let update = self.app.update(event, &mut self.model);
            self.run(update, &mut queue);
        }
    }

    fn run(&mut self, update: Update<Effect, Event>, queue: &mut VecDeque<Event>) {
        queue.extend(update.events);
        for effect in update.effects {
            match effect {
                Effect::Http(mut request) => {
                    let result = (self.backend)(&request.operation);
                    self.requests.push(request.operation.clone());
                    let next = self.app.resolve(&mut request, result).expect("http request resolves");
                    self.run(next, queue);
                }
                Effect::KeyValue(mut request) => {
                    let result = self.execute_kv(&request.operation);
                    let next = self.app.resolve(&mut request, result).expect("kv request resolves");
                    self.run(next, queue);
                }
                Effect::Render(_) => self.renders += 1,
            }
        }
    }

    fn execute_kv(&mut self, operation: &KeyValueOperation) -> KeyValueResult {
        let response = match operation {
            KeyValueOperation::Get { key } => KeyValueResponse::Get {
                value: self.store.get(key).cloned().into(),
            },
            KeyValueOperation::Set { key, value } => KeyValueResponse::Set {
                previous: self.store.insert(key.clone(), value.clone()).into(),
            },
            KeyValueOperation::Delete { key } => KeyValueResponse::Delete {
                previous: self.store.remove(key).into(),
            },
            KeyValueOperation::Exists { key } => KeyValueResponse::Exists {
                is_present: self.store.contains_key(key),
            },
            KeyValueOperation::ListKeys { prefix, .. } => KeyValueResponse::ListKeys {
                keys: self.store.keys().filter(|k| k.starts_with(prefix.as_str())).cloned().collect(),
                next_cursor: 0,
            },
        };
        KeyValueResult::Ok { response }
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn renders(&self) -> usize {
        self.renders
    }

    pub fn store(&mut self, key: &str, value: Vec<u8>) {
        self.store.insert(key.to_string(), value);
    }

    pub fn stored(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn requests(&self) -> &[HttpRequest] {
        &self.requests
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests
            .iter()
            .filter(|r| r.method == method && path_of(r) == path)
            .count()
    }

    pub fn last(&self, method: &str, path: &str) -> Option<&HttpRequest> {
        self.requests
            .iter()
            .rev()
            .find(|r| r.method == method && path_of(r) == path)
    }
}

/// Path relative to the API base, e.g. `/auth/me`.
pub fn path_of(request: &HttpRequest) -> String {
    request
        .url
        .strip_prefix(BASE)
        .unwrap_or(request.url.as_str())
        .to_string()
}

pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

pub fn ok(body: Value) -> HttpResult {
    HttpResult::Ok(HttpResponse::ok().json(body).build())
}

pub fn status(code: u16, body: Value) -> HttpResult {
    HttpResult::Ok(HttpResponse::status(code).json(body).build())
}

pub fn unreachable_host() -> HttpResult {
    HttpResult::Err(crux_http::Error::Io("connection refused".into()))
}

pub fn config() -> AppConfig {
    AppConfig::from_json(&format!(r#"{{"api": {{"base_url": "{BASE}"}}, "items_per_page": 5}}"#)).unwrap()
}

pub fn user(id: u64, name: &str, roles: &[&str]) -> Value {
    json!({
        "id": id,
        "name": name,
        "email": format!("{}@hms.test", name.to_lowercase().replace(' ', ".")),
        "roles": roles,
        "permissions": []
    })
}

pub fn patients(count: usize) -> Vec<Value> {
    (1..=count)
        .map(|i| {
            json!({
                "id": i,
                "first_name": format!("Patient{i}"),
                "last_name": if i % 2 == 0 { "Smith" } else { "Jones" },
                "gender": if i % 3 == 0 { "female" } else { "male" },
                "email": format!("p{i}@mail.test")
            })
        })
        .collect()
}

/// Backend that signs in an administrator and routes everything else to `rest`.
pub fn admin_backend<F>(rest: F) -> impl Fn(&HttpRequest) -> HttpResult + 'static
where
    F: Fn(&HttpRequest) -> HttpResult + 'static,
{
    move |request| {
        if path_of(request) == "/auth/login" {
            ok(json!({"token": "tok", "user": user(1, "Ada Admin", &["admin"])}))
        } else {
            rest(request)
        }
    }
}

pub fn signed_in<F>(backend: F) -> Harness
where
    F: Fn(&HttpRequest) -> HttpResult + 'static,
{
    let mut harness = Harness::new(backend);
    harness.dispatch(Event::AppStarted);
    harness.dispatch(Event::login("ada@hms.test", "pw"));
    assert!(harness.model().session.is_authenticated());
    harness
}

/// Splits an update into its pending HTTP requests, ignoring renders.
pub fn http_requests(update: Update<Effect, Event>) -> Vec<crux_core::Request<HttpRequest>> {
    update.into_effects().filter_map(Effect::into_http).collect()
}
