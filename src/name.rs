//! Validation of organization and application names.
//!
//! Both names end up as directory components (`~/.config/{org}/{app}`,
//! `/etc/{org}/{app}`), so anything that could escape or confuse a path is
//! rejected. Unicode letters are fine.

use thiserror::Error;

use crate::error::{ClapwireError, NameField};

/// Characters that may not appear anywhere in a name.
pub const FORBIDDEN_CHARS: &[char] = &[
    '/', '\\', ':', '*', '?', '"', '<', '>', '|', '(', ')', '[', ']', '{', '}', '!', '@', '#',
    '$', '%', '^', '&', '+', '=', '~', '`',
];

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameIssue {
    Empty,
    PathSeparator,
    DotName,
    SurroundingWhitespace,
    EmbeddedWhitespace,
    Forbidden(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{name}' {}", describe(.issue))]
pub struct InvalidName {
    pub name: String,
    pub issue: NameIssue,
}

fn describe(issue: &NameIssue) -> String {
    match issue {
        NameIssue::Empty => "is empty".into(),
        NameIssue::PathSeparator => "contains a path separator".into(),
        NameIssue::DotName => "is a relative path component".into(),
        NameIssue::SurroundingWhitespace => "has leading or trailing whitespace".into(),
        NameIssue::EmbeddedWhitespace => "contains whitespace".into(),
        NameIssue::Forbidden(c) => format!("contains forbidden character '{c}'"),
    }
}

/// Check that `name` is usable as a single directory component.
pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    let fail = |issue| {
        Err(InvalidName {
            name: name.to_string(),
            issue,
        })
    };

    if name.trim().is_empty() {
        return fail(NameIssue::Empty);
    }
    if name.contains('/') || name.contains('\\') || name.contains(std::path::MAIN_SEPARATOR) {
        return fail(NameIssue::PathSeparator);
    }
    if name == "." || name == ".." {
        return fail(NameIssue::DotName);
    }
    if name.trim() != name {
        return fail(NameIssue::SurroundingWhitespace);
    }
    if name.chars().any(char::is_whitespace) {
        return fail(NameIssue::EmbeddedWhitespace);
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return fail(NameIssue::Forbidden(c));
    }
    Ok(())
}

/// Validate both identifiers, reporting which one failed.
pub fn validate_org_and_app_name(org: &str, app: &str) -> Result<(), ClapwireError> {
    validate_name(org).map_err(|source| ClapwireError::InvalidName {
        field: NameField::Organization,
        source,
    })?;
    validate_name(app).map_err(|source| ClapwireError::InvalidName {
        field: NameField::Application,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(name: &str) -> NameIssue {
        validate_name(name).unwrap_err().issue
    }

    #[test]
    fn plain_names_pass() {
        assert!(validate_name("validname").is_ok());
        assert!(validate_name("org-name_with-dash").is_ok());
        assert!(validate_name("v1.2").is_ok());
    }

    #[test]
    fn unicode_letters_pass() {
        assert!(validate_name("组织").is_ok());
        assert!(validate_name("café").is_ok());
    }

    #[test]
    fn empty_and_blank_fail() {
        assert_eq!(issue(""), NameIssue::Empty);
        assert_eq!(issue("   "), NameIssue::Empty);
    }

    #[test]
    fn separators_fail() {
        assert_eq!(issue("org/name"), NameIssue::PathSeparator);
        assert_eq!(issue("org\\name"), NameIssue::PathSeparator);
    }

    #[test]
    fn dot_names_fail() {
        assert_eq!(issue("."), NameIssue::DotName);
        assert_eq!(issue(".."), NameIssue::DotName);
    }

    #[test]
    fn whitespace_fails() {
        assert_eq!(issue(" orgname"), NameIssue::SurroundingWhitespace);
        assert_eq!(issue("orgname "), NameIssue::SurroundingWhitespace);
        assert_eq!(issue("org with spaces"), NameIssue::EmbeddedWhitespace);
        assert_eq!(issue("org\tname"), NameIssue::EmbeddedWhitespace);
    }

    #[test]
    fn every_forbidden_character_fails() {
        for c in FORBIDDEN_CHARS {
            let name = format!("org{c}name");
            assert!(validate_name(&name).is_err(), "{name:?} should be rejected");
        }
        assert_eq!(issue("org:name"), NameIssue::Forbidden(':'));
    }

    #[test]
    fn pair_reports_failing_field() {
        let err = validate_org_and_app_name("acme", "my app").unwrap_err();
        assert!(matches!(
            err,
            ClapwireError::InvalidName {
                field: NameField::Application,
                ..
            }
        ));

        let err = validate_org_and_app_name("", "tool").unwrap_err();
        assert!(matches!(
            err,
            ClapwireError::InvalidName {
                field: NameField::Organization,
                ..
            }
        ));
    }

    #[test]
    fn pair_accepts_valid_names() {
        assert!(validate_org_and_app_name("acme", "tool").is_ok());
    }
}
