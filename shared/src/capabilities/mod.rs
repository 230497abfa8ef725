pub mod http;
pub mod kv;

pub use self::http::{HttpError, HttpRequest, HttpResponse, HttpResult};
pub use self::kv::{KvError, KvResult, TypedKvSlot};

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crate::app::App;
use crate::event::Event;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Storage error: {0}")]
    Kv(#[from] KvError),
}

impl From<CapabilityError> for crate::error::AppError {
    fn from(e: CapabilityError) -> Self {
        use crate::error::{AppError, ErrorKind};
        match e {
            CapabilityError::Http(e) => AppError::new(ErrorKind::InvalidState, "could not build request")
                .with_internal(e.to_string()),
            CapabilityError::Kv(e) => AppError::new(ErrorKind::Storage, "could not access local storage")
                .with_internal(e.to_string()),
        }
    }
}

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub kv: KeyValue<Event>,
    pub render: Render<Event>,
}

impl Effect {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::KeyValue(_) => "key_value",
            Self::Render(_) => "render",
        }
    }
}
