use crux_kv::error::KeyValueError;
use crux_kv::KeyValue;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use thiserror::Error;

use crate::event::Event;

pub const MAX_KEY_LENGTH: usize = 512;
/// Browser local storage quotas are small; persisted values stay well under them.
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Storage key as seen by the host, e.g. `session:auth`.
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        if key.contains(':') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "':' is reserved as the namespace separator".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
}

impl KeyNamespace {
    pub fn prefix(&self) -> &str {
        match self {
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?})")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
        }
    }

    /// The stored bytes exist but cannot be decoded.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, KvError::Serialization { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Unavailable,
}

/// What the shell reports for a get, set or delete: the value under the key
/// (the previous one for writes and deletes).
pub type KvResult = Result<Option<Vec<u8>>, KeyValueError>;

impl From<KeyValueError> for KvError {
    fn from(e: KeyValueError) -> Self {
        match e {
            KeyValueError::Io { message } | KeyValueError::Other { message } => {
                KvError::storage(StorageErrorCode::Unavailable, message)
            }
            KeyValueError::Timeout => KvError::storage(StorageErrorCode::Unavailable, "timeout"),
            KeyValueError::CursorNotFound => KvError::storage(StorageErrorCode::Unknown, "cursor not found"),
        }
    }
}

/// A single JSON-encoded document stored under one fixed key.
#[derive(Debug, Clone)]
pub struct TypedKvSlot<T> {
    key: KvKey,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvSlot<T> {
    pub fn new(namespace: KeyNamespace, key: &'static str) -> Result<Self, KvError> {
        Ok(Self {
            key: KvKey::new(namespace, key)?,
            _phantom: PhantomData,
        })
    }

    pub fn key(&self) -> &KvKey {
        &self.key
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
            key: Some(self.key.raw()),
        })?;
        if data.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(data)
    }

    /// `Ok(None)` when nothing is stored; `Err` (corrupt) when bytes don't decode.
    pub fn decode(&self, stored: Option<Vec<u8>>) -> Result<Option<T>, KvError> {
        match stored {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                    key: Some(self.key.raw()),
                }),
            None => Ok(None),
        }
    }

    pub fn get<F>(&self, kv: &KeyValue<Event>, make_event: F)
    where
        F: FnOnce(KvResult) -> Event + Send + Sync + 'static,
    {
        kv.get(self.key.raw(), make_event);
    }

    pub fn set<F>(&self, kv: &KeyValue<Event>, value: &T, make_event: F) -> Result<(), KvError>
    where
        F: FnOnce(KvResult) -> Event + Send + Sync + 'static,
    {
        kv.set(self.key.raw(), self.encode(value)?, make_event);
        Ok(())
    }

    pub fn delete<F>(&self, kv: &KeyValue<Event>, make_event: F)
    where
        F: FnOnce(KvResult) -> Event + Send + Sync + 'static,
    {
        kv.delete(self.key.raw(), make_event);
    }
}
