//! Database access for finops-pl
//!
//! Tenant-scoped query modules over the shared SQLite database. Every query
//! filters on `tenant_id`; nothing here is ever visible across tenants.

pub mod entities;
pub mod notifications;
pub mod patterns;
pub mod rules;
pub mod transactions;
