//! Extracted document plus its archive metadata

use serde::{Deserialize, Serialize};

use crate::archive::WarcHeaders;

/// One kept document, serialized as-is into shard output files.
///
/// Header-derived fields are copied verbatim and may be missing (`null`).
/// `len` is the declared `Content-Length` of the archive block, which can
/// differ from the decoded text length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub uri: Option<String>,
    pub date: Option<String>,
    pub id: Option<String>,
    /// Record this conversion was derived from
    pub refer: Option<String>,
    pub sha1: Option<String>,
    pub lang: Option<String>,
    pub len: u64,
    pub content: String,
}

impl Record {
    /// Build from archive headers and already-decoded text
    pub fn from_headers(h: &WarcHeaders, content: String) -> Self {
        Self {
            uri: h.target_uri().map(str::to_string),
            date: h.date().map(str::to_string),
            id: h.record_id().map(str::to_string),
            refer: h.refers_to().map(str::to_string),
            sha1: h.block_digest().map(str::to_string),
            lang: h.identified_language().map(str::to_string),
            len: h.content_length(),
            content,
        }
    }
}
