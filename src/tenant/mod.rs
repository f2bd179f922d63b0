//! Tenant context resolution and schema-per-tenant isolation.
//!
//! Every request is pinned to exactly one tenant schema. `SchemaName` is the
//! only type that may be interpolated into query text, and it can only be
//! built through validation, so schema-name injection is structurally
//! impossible outside this module.

pub mod provision;
pub mod resolver;
pub mod schema;

pub use resolver::{TenantContext, TenantDb, TenantError, TenantStatus};
pub use schema::{InvalidSchemaName, SchemaName};
