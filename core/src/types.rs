//! Shared primitive types used across the entire engine.

/// Tenant identifier. Unique within a billing period.
pub type TenantId = String;

/// Sub-meter identifier printed on statements.
pub type MeterId = String;

/// Organization key used to address a property's documents locally and remotely.
pub type OrgKey = String;

/// A stable, unique identifier for a generated statement.
pub type StatementId = String;

/// Billing year.
pub type Year = i32;
