//! URN grammar and wildcard matching
//!
//! Resources are identified by URNs of the form
//! `urn:<namespace>:<resource-type>:<org-or-instance>:resource/<path>`.
//! A URN containing `*` is a pattern; anything else is a full URN.
//!
//! The only wildcard form is a single trailing `*`, which matches any suffix
//! (including the empty one). Patterns with a `*` anywhere else are invalid and
//! never match; they are rejected at write time by [`is_valid_resources`] and
//! [`is_valid_actions`].

use crate::error::{AuthzError, Result};

/// Prefix shared by every resource URN
pub const URN_PREFIX: &str = "urn:";

/// Wildcard character allowed in trailing position
pub const WILDCARD: char = '*';

const MAX_URN_LEN: usize = 1024;
const MAX_ACTION_LEN: usize = 128;

/// Build a resource URN from its parts
pub fn resource_urn(namespace: &str, resource_type: &str, org: &str, path: &str) -> String {
    format!(
        "{}{}:{}:{}:resource/{}",
        URN_PREFIX,
        namespace,
        resource_type,
        org,
        path.trim_start_matches('/')
    )
}

/// A full URN contains no wildcard at all
pub fn is_full_urn(urn: &str) -> bool {
    !urn.contains(WILDCARD)
}

/// Match a pattern (resource or action) against a full candidate
pub fn matches(pattern: &str, candidate: &str) -> bool {
    match pattern.find(WILDCARD) {
        None => pattern == candidate,
        Some(idx) if idx == pattern.len() - 1 => candidate.starts_with(&pattern[..idx]),
        Some(_) => false,
    }
}

/// True when the value holds no wildcard or exactly one, in last position
fn has_trailing_wildcard_only(value: &str) -> bool {
    match value.find(WILDCARD) {
        None => true,
        Some(idx) => idx == value.len() - 1,
    }
}

/// RFC 3986 pchar plus `/` and the wildcard
fn is_urn_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '-' | '_' | '.' | '~' | ':' | '/' | '@' | '%' | '*'
                | '!' | '$' | '&' | '\'' | '(' | ')' | '+' | ',' | ';' | '='
        )
}

fn is_action_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '*')
}

/// Check a single resource URN or URN pattern
pub fn is_valid_resource(pattern: &str) -> bool {
    pattern.len() > URN_PREFIX.len()
        && pattern.len() <= MAX_URN_LEN
        && pattern.starts_with(URN_PREFIX)
        && pattern.chars().all(is_urn_char)
        && has_trailing_wildcard_only(pattern)
}

/// Check a single action or action pattern
///
/// Full actions must have the `service:verb` shape. Patterns may truncate at
/// any point with a trailing `*`; a lone `*` matches every action.
pub fn is_valid_action(action: &str) -> bool {
    if action.is_empty() || action.len() > MAX_ACTION_LEN {
        return false;
    }
    if !action.chars().all(is_action_char) || !has_trailing_wildcard_only(action) {
        return false;
    }
    if action.ends_with(WILDCARD) {
        return true;
    }
    match action.split_once(':') {
        Some((service, verb)) => !service.is_empty() && !verb.is_empty(),
        None => false,
    }
}

/// Validate a set of resource patterns, reporting the first offender
pub fn is_valid_resources<S: AsRef<str>>(resources: &[S]) -> Result<()> {
    for resource in resources {
        let resource = resource.as_ref();
        if !is_valid_resource(resource) {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid resource '{}'",
                resource
            )));
        }
    }
    Ok(())
}

/// Validate a set of action patterns, reporting the first offender
pub fn is_valid_actions<S: AsRef<str>>(actions: &[S]) -> Result<()> {
    for action in actions {
        let action = action.as_ref();
        if !is_valid_action(action) {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid action '{}'",
                action
            )));
        }
    }
    Ok(())
}
