use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ApiError;

/// The two list shapes the API returns: a bare array, or `{ items, nextOffset? }`.
///
/// Any other shape fails to decode; it is never treated as an empty list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Paged {
        items: Vec<T>,
        #[serde(rename = "nextOffset", default)]
        next_offset: Option<u64>,
    },
}

/// A decoded list with its continuation offset, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<u64>,
}

impl<T> From<ListEnvelope<T>> for Page<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        match envelope {
            ListEnvelope::Bare(items) => Page {
                items,
                next_offset: None,
            },
            ListEnvelope::Paged { items, next_offset } => Page { items, next_offset },
        }
    }
}

impl<T: DeserializeOwned> Page<T> {
    /// Decode either list shape from a response body.
    pub fn from_body(body: &str) -> Result<Self, ApiError> {
        serde_json::from_str::<ListEnvelope<T>>(body)
            .map(Page::from)
            .map_err(|e| ApiError::decode("unrecognized list envelope", &e))
    }
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next_offset.is_some()
    }
}
