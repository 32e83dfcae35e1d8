//! Key-naming protocol shared with any pre-existing store contents.
//!
//! ```text
//! applications                       list of application names
//! toggle:<application>:<feature>     JSON toggle value
//! meta:<application>:<feature>       hash { description, categoryId }
//! audit:<application>                application audit list
//! audit:<application>:<feature>      feature audit list
//! ```

use crate::errors::{Error, Result};

/// List holding registered application names.
pub const APPLICATIONS_KEY: &str = "applications";

const TOGGLE_PREFIX: &str = "toggle";
const META_PREFIX: &str = "meta";
const AUDIT_PREFIX: &str = "audit";

/// Metadata hash field holding the description.
pub const DESCRIPTION_FIELD: &str = "description";
/// Metadata hash field holding the category id.
pub const CATEGORY_ID_FIELD: &str = "categoryId";

const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];

#[must_use]
pub fn toggle_key(application: &str, feature: &str) -> String {
    format!("{TOGGLE_PREFIX}:{application}:{feature}")
}

#[must_use]
pub fn meta_key(application: &str, feature: &str) -> String {
    format!("{META_PREFIX}:{application}:{feature}")
}

#[must_use]
pub fn application_audit_key(application: &str) -> String {
    format!("{AUDIT_PREFIX}:{application}")
}

#[must_use]
pub fn feature_audit_key(application: &str, feature: &str) -> String {
    format!("{AUDIT_PREFIX}:{application}:{feature}")
}

/// Pattern listing every toggle key of an application.
#[must_use]
pub fn toggle_pattern(application: &str) -> String {
    format!("{TOGGLE_PREFIX}:{}:*", escape_glob(application))
}

/// Pattern listing every metadata key of an application.
#[must_use]
pub fn meta_pattern(application: &str) -> String {
    format!("{META_PREFIX}:{}:*", escape_glob(application))
}

/// Pattern matching every per-feature key of an application, whatever its prefix.
#[must_use]
pub fn application_keys_pattern(application: &str) -> String {
    format!("*:{}:*", escape_glob(application))
}

/// Metadata key paired with a toggle key, `None` when `key` is not a toggle key.
#[must_use]
pub fn meta_key_for_toggle(key: &str) -> Option<String> {
    let (application, feature) = split_feature_key(key, TOGGLE_PREFIX)?;
    Some(meta_key(application, feature))
}

/// `(application, feature)` of a `<prefix>:<application>:<feature>` key.
#[must_use]
pub fn split_feature_key<'a>(key: &'a str, prefix: &str) -> Option<(&'a str, &'a str)> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    let (application, feature) = rest.split_once(':')?;
    if application.is_empty() || feature.is_empty() {
        return None;
    }
    Some((application, feature))
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if GLOB_METACHARACTERS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Reject names that would make keys ambiguous or patterns unsafe.
///
/// `kind` names the thing being validated in the error message.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("{kind} name cannot be empty")));
    }
    if name.contains(':') {
        return Err(Error::validation(format!(
            "{kind} name {name:?} cannot contain ':'"
        )));
    }
    if name.contains(GLOB_METACHARACTERS) {
        return Err(Error::validation(format!(
            "{kind} name {name:?} cannot contain glob characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::glob_matcher;

    #[test]
    fn test_key_layout() {
        assert_eq!(toggle_key("myapp", "dark-mode"), "toggle:myapp:dark-mode");
        assert_eq!(meta_key("myapp", "dark-mode"), "meta:myapp:dark-mode");
        assert_eq!(application_audit_key("myapp"), "audit:myapp");
        assert_eq!(
            feature_audit_key("myapp", "dark-mode"),
            "audit:myapp:dark-mode"
        );
    }

    #[test]
    fn test_meta_key_for_toggle() {
        assert_eq!(
            meta_key_for_toggle("toggle:myapp:dark-mode").as_deref(),
            Some("meta:myapp:dark-mode")
        );
        assert_eq!(meta_key_for_toggle("meta:myapp:dark-mode"), None);
        assert_eq!(meta_key_for_toggle("toggle:myapp"), None);
    }

    #[test]
    fn test_patterns_escape_application_names() -> crate::errors::Result<()> {
        let matcher = glob_matcher(&toggle_pattern("a*b"))?;
        assert!(matcher.is_match("toggle:a*b:feature"));
        assert!(!matcher.is_match("toggle:axxb:feature"));
        Ok(())
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("application", "myapp").is_ok());
        assert!(validate_name("application", "").is_err());
        assert!(validate_name("application", "   ").is_err());
        assert!(validate_name("application", "my:app").is_err());
        assert!(validate_name("feature", "dark*").is_err());
    }
}
