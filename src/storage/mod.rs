mod backend;
mod value;

use std::io;

use thiserror::Error;

#[cfg(test)]
pub use backend::MemoryStore;
pub use backend::{JsonFileStore, KeyValueStore};
pub use value::StoredValue;

pub const LABEL_COUNTER_KEY: &str = "classifier.label_counter";
pub const CAMERA_INDEX_KEY: &str = "camera.index";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode value for key `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode value for key `{key}`: {reason}")]
    Decode { key: String, reason: String },
    #[error("storage backend failed for key `{key}`")]
    Backend {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Typed values on top of a string-only backend.
pub struct PersistentStore<B: KeyValueStore> {
    backend: B,
}

impl<B: KeyValueStore> PersistentStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn store(&mut self, key: &str, value: impl Into<StoredValue>) -> Result<(), StoreError> {
        let value = value.into();
        let encoded = value::encode(&value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend
            .set_item(key, encoded)
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?;
        log::debug!("stored {} value under `{key}`", value.type_tag());
        Ok(())
    }

    /// `Ok(None)` means the key was never written.
    pub fn load(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        let raw = self
            .backend
            .get_item(key)
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Ok(value) = serde_json::from_str::<StoredValue>(&raw) {
            return Ok(Some(value));
        }

        value::decode_legacy(&raw)
            .map(Some)
            .map_err(|err| StoreError::Decode {
                key: key.to_string(),
                reason: err.to_string(),
            })
    }

    /// Reads a small non-negative integer setting. Unreadable or mistyped
    /// entries are logged and replaced by `default`.
    pub fn load_u32_or(&self, key: &str, default: u32) -> u32 {
        match self.load(key) {
            Ok(Some(value)) => value.as_u32().unwrap_or_else(|| {
                log::warn!("ignoring {} value stored under `{key}`", value.type_tag());
                default
            }),
            Ok(None) => default,
            Err(err) => {
                log::warn!("{err}");
                default
            }
        }
    }

    #[cfg(test)]
    fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
