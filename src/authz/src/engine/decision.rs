//! Statement resolution: deny overrides allow, default deny

use crate::model::{Effect, Statement};
use serde::{Deserialize, Serialize};

/// Outcome of evaluating a set of statements against one action + URN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// At least one Allow statement applied and no Deny did
    Allow,
    /// A Deny statement applied
    ExplicitDeny,
    /// No statement applied
    DefaultDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Resolve the applicable effects for `action` on `urn`
///
/// The first applicable Deny short-circuits; otherwise one applicable Allow is
/// enough; with nothing applicable the result is a default deny.
pub fn evaluate<'a, I>(statements: I, action: &str, urn: &str) -> Decision
where
    I: IntoIterator<Item = &'a Statement>,
{
    let mut allowed = false;
    for statement in statements {
        if !statement.applies(action, urn) {
            continue;
        }
        match statement.effect {
            Effect::Deny => return Decision::ExplicitDeny,
            Effect::Allow => allowed = true,
        }
    }

    if allowed {
        Decision::Allow
    } else {
        Decision::DefaultDeny
    }
}
