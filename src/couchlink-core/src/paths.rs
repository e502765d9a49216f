use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Everything except RFC 3986 unreserved characters is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

static DATABASE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_$()+\-/]*$").expect("database name pattern"));

/// Percent-encode a value for use as one path segment or query value.
pub fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Check a database name before any request is made.
pub fn validate_database_name(name: &str) -> Result<()> {
    if DATABASE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid database name '{}': a database must be named with lowercase letters (a-z), \
             digits (0-9), or any of the _$()+-/ characters, and must start with a lowercase letter",
            name
        )))
    }
}

/// Encode each `/`-separated part of a design document id, keeping the separators.
pub fn encode_design_doc(design_doc: &str) -> String {
    design_doc
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_accepts_valid_database_names() {
        for name in ["az09_$()+-/", "a", "mydb", "logs/2024-01", "x(1)+y$"] {
            assert!(validate_database_name(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_rejects_invalid_database_names() {
        for name in ["InVaLidName", "inv@lid", "name with spaces", "", "1starts-with-digit", "dots.not.allowed", "comma,name"] {
            let err = validate_database_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{} should be rejected", name);
        }
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("plain-id_1.0~"), "plain-id_1.0~");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_segment("1-abc?x=y&z"), "1-abc%3Fx%3Dy%26z");
        assert_eq!(encode_segment("db$(x)+"), "db%24%28x%29%2B");
        assert_eq!(encode_segment("é"), "%C3%A9");
    }

    #[test]
    fn test_encode_design_doc_keeps_prefix_separator() {
        assert_eq!(encode_design_doc("_design/my ddoc"), "_design/my%20ddoc");
        assert_eq!(encode_design_doc("plain"), "plain");
    }
}
