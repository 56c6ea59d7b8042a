//! Decoding and encoding of the documents the engine reads and writes.
//!
//! The engine never looks at wire bytes directly. Policy documents and
//! container listings go through a [`DocumentCodec`], so the linked-data
//! encoding used by a particular pod stays outside the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{PolicyDocument, WebId};

mod json;
pub use json::*;

/// Errors raised by a [`DocumentCodec`].
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec cannot read documents of this media type
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The bytes are not a valid document
    #[error("Failed to decode document: {0}")]
    Decode(String),

    /// The document could not be written
    #[error("Failed to encode document: {0}")]
    Encode(String),
}

/// One member of a container, as reported by the container's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMember {
    /// Where the member lives
    pub url: Url,
    /// Whether the member is itself a container
    #[serde(default)]
    pub container: bool,
    /// Media type of the member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    /// Last modifying agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<WebId>,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ContainerMember {
    /// A member with nothing but its location; containers are recognized by
    /// a trailing `/`.
    pub fn new(url: Url) -> Self {
        Self {
            container: url.path().ends_with('/'),
            url,
            media_type: None,
            modified: None,
            modified_by: None,
            size: None,
        }
    }
}

/// Converts between wire bytes and the engine's document model.
pub trait DocumentCodec: Send + Sync {
    /// The media type this codec writes.
    fn media_type(&self) -> &str;

    /// Decode a policy document.
    fn parse_policy(
        &self,
        bytes: &[u8],
        media_type: Option<&str>,
    ) -> Result<PolicyDocument, CodecError>;

    /// Encode a policy document.
    fn serialize_policy(&self, document: &PolicyDocument) -> Result<Vec<u8>, CodecError>;

    /// Decode a container listing into its members.
    fn parse_listing(
        &self,
        bytes: &[u8],
        media_type: Option<&str>,
    ) -> Result<Vec<ContainerMember>, CodecError>;

    /// Encode a container listing.
    fn serialize_listing(&self, members: &[ContainerMember]) -> Result<Vec<u8>, CodecError>;
}
