//! Tenant schema provisioning.
//!
//! Applies the per-tenant DDL template with the schema name substituted
//! through a validated `SchemaName`. This, `TenantDb::acquire`, and the audit
//! insert templates are the only places in the crate where a schema name is
//! interpolated into query text.

use crate::tenant::schema::SchemaName;
use sqlx::{Executor, PgPool};
use tracing::info;

const TENANT_TEMPLATE: &str = include_str!("../../db/tenant_schema.sql");

/// Creates (or completes) the schema and tables for one tenant.
///
/// Idempotent: every statement in the template is `IF NOT EXISTS`. Used by
/// onboarding flows and by test fixtures.
///
/// # Errors
/// Returns the first statement execution error.
pub async fn provision_tenant_schema(pool: &PgPool, schema: &SchemaName) -> sqlx::Result<()> {
    let ddl = TENANT_TEMPLATE.replace("{schema}", schema.as_str());

    let mut tx = pool.begin().await?;
    for statement in ddl.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        tx.execute(statement).await?;
    }
    tx.commit().await?;

    info!("Provisioned tenant schema {schema}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_no_unsubstituted_placeholders_after_replace() {
        let schema = SchemaName::parse("tenant_northridge").unwrap();
        let ddl = TENANT_TEMPLATE.replace("{schema}", schema.as_str());
        assert!(!ddl.contains("{schema}"));
        assert!(ddl.contains("\"tenant_northridge\".audit_log"));
    }

    #[test]
    fn template_statements_are_splittable() {
        let statements: Vec<&str> = TENANT_TEMPLATE
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        // Schema + seven tables + one index.
        assert_eq!(statements.len(), 9);
    }
}
