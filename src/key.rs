//! Compound cache keys: `<resource id>@<variant>`.

use std::fmt;
use thiserror::Error;

/// Separator between the resource identifier and the variant discriminator.
pub const KEY_SEPARATOR: char = '@';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("resource id is required")]
    MissingResourceId,

    #[error("resource id must be alphanumeric: {0:?}")]
    InvalidResourceId(String),

    #[error("variant is required")]
    MissingVariant,
}

/// A validated thumbnail key.
///
/// Built by the request layer from its two parameters; the cache only ever
/// sees the joined string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    raw: String,
    split: usize,
}

impl ThumbnailKey {
    pub fn new(resource_id: &str, variant: &str) -> Result<Self, KeyError> {
        if resource_id.is_empty() {
            return Err(KeyError::MissingResourceId);
        }
        if !resource_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(KeyError::InvalidResourceId(resource_id.to_string()));
        }
        if variant.is_empty() {
            return Err(KeyError::MissingVariant);
        }

        Ok(Self {
            raw: format!("{resource_id}{KEY_SEPARATOR}{variant}"),
            split: resource_id.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn resource_id(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn variant(&self) -> &str {
        &self.raw[self.split + KEY_SEPARATOR.len_utf8()..]
    }
}

impl fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for ThumbnailKey {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

/// Resource identifier portion of a raw key (everything before the first
/// separator, or the whole key when there is none).
pub fn resource_id_of(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR)
        .map_or(key, |(resource_id, _)| resource_id)
}
