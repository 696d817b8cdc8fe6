//! Monthly utility sub-billing cycle engine.
//!
//! One billing period per organization is "current". Field staff capture
//! sub-meter readings, an administrator approves them, and the period is
//! reconciled against the master utility bill, solar credit and DG backup
//! before being finalized and rolled over into the next month.

pub mod allocation;
pub mod capture;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod extraction;
pub mod inputs;
pub mod period;
pub mod reconciliation;
pub mod rollover;
pub mod roster;
pub mod statement;
pub mod store;
pub mod sync;
pub mod types;
pub mod workflow;
