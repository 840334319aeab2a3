//! Versioned schema migrations.
//!
//! A [`MigrationRunner`] opens a store at its target version. Older stores are
//! reopened at each intermediate version with the [`MigrationStep`] registered
//! for that version applied through an [`UpgradeTransaction`].

pub mod plan;
pub mod runner;
pub mod steps;
pub mod transaction;

pub use plan::{MigrationStep, MigrationTable, StepFn};
pub use runner::{InitReport, MigrationRunner, MigrationStatus, ReadyStore};
pub use steps::wallet_migrations;
pub use transaction::UpgradeTransaction;
