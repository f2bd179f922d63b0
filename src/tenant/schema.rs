//! Validation gate for tenant schema identifiers.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Hard cap on schema identifiers, well under the Postgres limit of 63 bytes.
pub const MAX_SCHEMA_LEN: usize = 48;

static SAFE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidSchemaName;

impl fmt::Display for InvalidSchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid schema name")
    }
}

impl std::error::Error for InvalidSchemaName {}

/// A tenant schema identifier that passed validation.
///
/// This is the single choke point for every schema name used in dynamically
/// composed query text. Construction outside `parse` is impossible, so a
/// `SchemaName` in hand is proof the identifier is injection-safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validates `name` against the conservative identifier pattern
    /// `^[A-Za-z_][A-Za-z0-9_]*$` with a bounded length.
    ///
    /// # Errors
    /// Returns `InvalidSchemaName` for anything containing quotes, semicolons,
    /// whitespace, or any other character outside the whitelist. The failure
    /// is fatal to the calling request: there is no fallback.
    pub fn parse(name: &str) -> Result<Self, InvalidSchemaName> {
        if name.is_empty() || name.len() > MAX_SCHEMA_LEN {
            return Err(InvalidSchemaName);
        }

        if !SAFE_IDENTIFIER.is_match(name) {
            return Err(InvalidSchemaName);
        }

        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `"schema".table` for use in the fixed set of query templates
    /// that must address a tenant schema explicitly.
    #[must_use]
    pub fn qualify(&self, table: &str) -> String {
        format!("\"{}\".{table}", self.0)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_safe_identifiers() {
        for name in ["tenant_northridge", "s1", "_internal", "Tenant_A_2024"] {
            let schema = SchemaName::parse(name).unwrap();
            assert_eq!(schema.as_str(), name);
        }
    }

    #[test]
    fn rejects_quotes_semicolons_and_whitespace() {
        for name in [
            "tenant'; DROP SCHEMA shared;--",
            "tenant\"x",
            "tenant name",
            "tenant;name",
            "tenant\tname",
            "tenant\nname",
            "tenant'x",
        ] {
            assert_eq!(SchemaName::parse(name), Err(InvalidSchemaName), "{name}");
        }
    }

    #[test]
    fn rejects_sql_metacharacters() {
        for name in ["tenant-x", "tenant.x", "tenant$x", "tenant(x)", "a%", "a*"] {
            assert_eq!(SchemaName::parse(name), Err(InvalidSchemaName), "{name}");
        }
    }

    #[test]
    fn rejects_leading_digit_and_empty() {
        assert_eq!(SchemaName::parse("1tenant"), Err(InvalidSchemaName));
        assert_eq!(SchemaName::parse(""), Err(InvalidSchemaName));
    }

    #[test]
    fn rejects_overlong_names() {
        let name = "a".repeat(MAX_SCHEMA_LEN + 1);
        assert_eq!(SchemaName::parse(&name), Err(InvalidSchemaName));

        let name = "a".repeat(MAX_SCHEMA_LEN);
        assert!(SchemaName::parse(&name).is_ok());
    }

    #[test]
    fn qualify_quotes_the_schema() {
        let schema = SchemaName::parse("tenant_northridge").unwrap();
        assert_eq!(
            schema.qualify("audit_log"),
            "\"tenant_northridge\".audit_log"
        );
    }
}
