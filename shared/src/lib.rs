// lib.rs - shared core of the hospital administration client

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod access;
pub mod api;
pub mod app;
pub mod capabilities;
pub mod config;
pub mod entities;
pub mod error;
pub mod event;
pub mod list_view;
pub mod model;
pub mod session;
pub mod view;

pub use access::{visible_navigation, AccessPolicy, GuardDecision, MissingRoleData, RouteRequirement};
pub use api::{unwrap_collection, RequestSequencer, RequestToken};
pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::AppConfig;
pub use entities::{EntityKind, EntityRecord, Route};
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
pub use event::{Event, MutationAction};
pub use list_view::{ListConfig, ListPage, ListView, Record};
pub use model::Model;
pub use session::{SessionPhase, SessionStore, User};
pub use view::{ViewModel, ViewState};
