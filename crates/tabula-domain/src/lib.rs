//! Domain tables for Tabula.
//!
//! Row types for accounts, organisations, organisation members and
//! invoices, typed access to their tables, and typed lifecycle hooks that
//! sit behind the store's generic database events.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe string id wrappers for every table
//! - [`enums`] -- Enumerations stored as text columns (plan, role, invoice status)
//! - [`structs`] -- Row types, one per table
//! - [`entity`] -- The [`Entity`] trait and the typed [`Table`] wrapper
//! - [`hooks`] -- [`EntityHooks`] table routers and the [`DomainHooks`] bundle
//! - [`rules`] -- Built-in invariants enforced as Before-hook vetoes
//! - [`schema`] -- Embedded `CREATE TABLE IF NOT EXISTS` scripts and [`bootstrap`]

pub mod entity;
pub mod enums;
pub mod hooks;
pub mod ids;
pub mod rules;
pub mod schema;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use entity::{Entity, Table, to_record};
pub use enums::{InvoiceStatus, MemberRole, Plan};
pub use hooks::{DomainHooks, EntityEvent, EntityHooks};
pub use ids::{AccountId, InvoiceId, MemberId, OrganisationId};
pub use rules::RuleViolation;
pub use schema::{POSTGRES_SCHEMA, SQLITE_SCHEMA, bootstrap, schema_for};
pub use structs::{Account, Invoice, Organisation, OrganisationMember};
