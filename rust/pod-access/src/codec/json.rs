use serde::{Deserialize, Serialize};

use crate::{CodecError, ContainerMember, DocumentCodec, PolicyDocument};

const JSON: &str = "application/json";
const JSON_LD: &str = "application/ld+json";

#[derive(Serialize, Deserialize)]
struct ContainerListing {
    #[serde(default)]
    contains: Vec<ContainerMember>,
}

/// A [`DocumentCodec`] for JSON documents.
///
/// Policy documents carry a `vocabulary` member naming their system's
/// namespace; listings are `{"contains": [...]}` objects. Documents without
/// a declared media type are read as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn check(media_type: Option<&str>) -> Result<(), CodecError> {
        match media_type {
            None | Some(JSON) | Some(JSON_LD) => Ok(()),
            Some(other) => Err(CodecError::UnsupportedMediaType(other.to_string())),
        }
    }
}

impl DocumentCodec for JsonCodec {
    fn media_type(&self) -> &str {
        JSON
    }

    fn parse_policy(
        &self,
        bytes: &[u8],
        media_type: Option<&str>,
    ) -> Result<PolicyDocument, CodecError> {
        Self::check(media_type)?;
        serde_json::from_slice(bytes).map_err(|error| CodecError::Decode(error.to_string()))
    }

    fn serialize_policy(&self, document: &PolicyDocument) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(document).map_err(|error| CodecError::Encode(error.to_string()))
    }

    fn parse_listing(
        &self,
        bytes: &[u8],
        media_type: Option<&str>,
    ) -> Result<Vec<ContainerMember>, CodecError> {
        Self::check(media_type)?;
        serde_json::from_slice::<ContainerListing>(bytes)
            .map(|listing| listing.contains)
            .map_err(|error| CodecError::Decode(error.to_string()))
    }

    fn serialize_listing(&self, members: &[ContainerMember]) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&ContainerListing {
            contains: members.to_vec(),
        })
        .map_err(|error| CodecError::Encode(error.to_string()))
    }
}
