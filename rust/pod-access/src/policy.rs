//! The two authorization systems and their decoded policy documents.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use url::Url;

mod wac;
pub use wac::*;

mod acp;
pub use acp::*;

/// Namespace of the Web Access Control vocabulary.
pub const WAC_VOCABULARY: &str = "http://www.w3.org/ns/auth/acl#";

/// Namespace of the Access Control Policies vocabulary.
pub const ACP_VOCABULARY: &str = "http://www.w3.org/ns/solid/acp#";

/// The authorization system governing a pod.
///
/// A pod uses exactly one system for all of its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicySystem {
    /// Web Access Control: rules attach to a resource or are inherited from
    /// the nearest enclosing container that defines them
    Wac,
    /// Access Control Policies: named policies attach to resources, directly
    /// or through their ancestors, and all matching grants are combined
    Acp,
}

impl PolicySystem {
    /// The namespace marking documents of this system.
    pub fn vocabulary(&self) -> &'static str {
        match self {
            PolicySystem::Wac => WAC_VOCABULARY,
            PolicySystem::Acp => ACP_VOCABULARY,
        }
    }

    /// Classify a raw policy document by the vocabulary it uses.
    ///
    /// Only the ACP namespace is looked for; anything else is WAC.
    pub fn classify(document: &[u8]) -> PolicySystem {
        let marker = ACP_VOCABULARY.as_bytes();
        if document
            .windows(marker.len())
            .any(|window| window == marker)
        {
            PolicySystem::Acp
        } else {
            PolicySystem::Wac
        }
    }

    /// Where a pod conventionally keeps the policy document of `resource`
    /// when it does not advertise one.
    pub fn conventional_policy_url(&self, resource: &Url) -> Option<Url> {
        match self {
            PolicySystem::Wac => Url::parse(&format!("{}.acl", resource.as_str())).ok(),
            PolicySystem::Acp => {
                let mut url = resource.clone();
                url.set_query(Some("ext=acr"));
                Some(url)
            }
        }
    }
}

impl Display for PolicySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PolicySystem::Wac => "WAC",
            PolicySystem::Acp => "ACP",
        })
    }
}

/// A decoded policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "vocabulary")]
pub enum PolicyDocument {
    /// An ACL document
    #[serde(rename = "http://www.w3.org/ns/auth/acl#")]
    Wac(AclDocument),
    /// An access control resource
    #[serde(rename = "http://www.w3.org/ns/solid/acp#")]
    Acp(AccessControlResource),
}

impl PolicyDocument {
    /// The system this document belongs to.
    pub fn system(&self) -> PolicySystem {
        match self {
            PolicyDocument::Wac(_) => PolicySystem::Wac,
            PolicyDocument::Acp(_) => PolicySystem::Acp,
        }
    }
}

impl From<AclDocument> for PolicyDocument {
    fn from(document: AclDocument) -> Self {
        PolicyDocument::Wac(document)
    }
}

impl From<AccessControlResource> for PolicyDocument {
    fn from(document: AccessControlResource) -> Self {
        PolicyDocument::Acp(document)
    }
}

/// A stable fragment identifier derived from an agent, for rules the engine
/// writes on that agent's behalf.
pub(crate) fn rule_id(prefix: &str, agent: &crate::AgentRef) -> String {
    let slug: String = agent
        .to_string()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("#{prefix}-{}", slug.trim_matches('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_classifies_documents_by_vocabulary() {
        let acp = br#"@prefix acp: <http://www.w3.org/ns/solid/acp#> . <#p> a acp:Policy ."#;
        let wac = br#"@prefix acl: <http://www.w3.org/ns/auth/acl#> . <#r> a acl:Authorization ."#;

        assert_eq!(PolicySystem::classify(acp), PolicySystem::Acp);
        assert_eq!(PolicySystem::classify(wac), PolicySystem::Wac);
        assert_eq!(PolicySystem::classify(b""), PolicySystem::Wac);
    }

    #[test]
    fn it_derives_conventional_policy_locations() {
        let resource = Url::parse("https://pod.example/data/notes").unwrap();

        assert_eq!(
            PolicySystem::Wac.conventional_policy_url(&resource).unwrap().as_str(),
            "https://pod.example/data/notes.acl"
        );
        assert_eq!(
            PolicySystem::Acp.conventional_policy_url(&resource).unwrap().as_str(),
            "https://pod.example/data/notes?ext=acr"
        );
    }

    #[test]
    fn it_tags_documents_with_their_vocabulary() {
        let json = serde_json::to_string(&PolicyDocument::Wac(AclDocument::default())).unwrap();
        assert!(json.contains(WAC_VOCABULARY));

        let json =
            serde_json::to_string(&PolicyDocument::Acp(AccessControlResource::default())).unwrap();
        assert_eq!(PolicySystem::classify(json.as_bytes()), PolicySystem::Acp);
    }
}
