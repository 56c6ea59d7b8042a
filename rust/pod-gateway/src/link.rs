//! `Link` header parsing ([RFC 8288]).
//!
//! Pods advertise the location of a resource's policy document with
//! `Link: <...>; rel="acl"`, and mark containers with
//! `rel="type"` links. Only the target and `rel` parameter are retained.
//!
//! [RFC 8288]: https://www.rfc-editor.org/rfc/rfc8288

use url::Url;

/// One link value from a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute target of the link
    pub target: Url,
    /// Relation types, lower-cased
    pub rels: Vec<String>,
}

impl Link {
    /// Whether this link carries the given relation type.
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|candidate| candidate.eq_ignore_ascii_case(rel))
    }
}

/// Parse a `Link` header value, resolving targets against `base`.
///
/// Malformed link values are skipped rather than failing the whole header.
pub fn parse_link_header(value: &str, base: &Url) -> Vec<Link> {
    split_outside(value, ',')
        .into_iter()
        .filter_map(|link_value| parse_link_value(link_value, base))
        .collect()
}

fn parse_link_value(value: &str, base: &Url) -> Option<Link> {
    let value = value.trim();
    let rest = value.strip_prefix('<')?;
    let end = rest.find('>')?;
    let target = base.join(rest[..end].trim()).ok()?;

    let mut rels = Vec::new();
    for param in split_outside(&rest[end + 1..], ';') {
        let Some((name, param_value)) = param.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("rel") {
            rels.extend(
                param_value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .map(|rel| rel.to_ascii_lowercase()),
            );
        }
    }

    Some(Link { target, rels })
}

/// Split on `separator` where it is not inside `<...>` or a quoted string.
fn split_outside(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_angle = false;
    let mut in_quote = false;
    let mut start = 0;

    for (index, character) in value.char_indices() {
        match character {
            '<' if !in_quote => in_angle = true,
            '>' if !in_quote => in_angle = false,
            '"' if !in_angle => in_quote = !in_quote,
            c if c == separator && !in_angle && !in_quote => {
                parts.push(&value[start..index]);
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);

    parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect()
}
