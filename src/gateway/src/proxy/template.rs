//! URN template resolution against captured route parameters

use warden_authz::model::urn_placeholders;
use warden_authz::{urn, AuthzError, Result};

/// Substitute every `{param}` in `template` with its captured value
///
/// The result must be a full, valid resource URN; a template that still
/// holds a wildcard after substitution is an `InvalidParameter`.
pub fn resolve_urn(template: &str, params: &[(String, String)]) -> Result<String> {
    let mut resolved = template.to_string();

    for name in urn_placeholders(template)? {
        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| {
                AuthzError::InvalidParameter(format!("route does not capture '{}'", name))
            })?;
        resolved = resolved.replace(&format!("{{{}}}", name), value);
    }

    if !urn::is_full_urn(&resolved) {
        return Err(AuthzError::InvalidParameter(format!(
            "resolved urn '{}' is not a full urn",
            resolved
        )));
    }
    if !urn::is_valid_resource(&resolved) {
        return Err(AuthzError::InvalidParameter(format!(
            "resolved urn '{}' is invalid",
            resolved
        )));
    }

    Ok(resolved)
}
