//! Multi-tenant school operations platform core.
//!
//! The crate covers the authorization and audit pipeline shared by every
//! school ("tenant"): tenant resolution with schema-per-tenant isolation,
//! role/permission evaluation, teacher-assignment verification, dual-target
//! audit logging, manual administrative overrides, and idempotent handling
//! of payment-provider webhooks.

pub mod api;
pub mod audit;
pub mod authz;
pub mod cli;
pub mod overrides;
pub mod tenant;
pub mod webhooks;
