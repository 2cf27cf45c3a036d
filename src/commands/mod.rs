// ABOUTME: Command implementations for the migrate CLI
// ABOUTME: Exports the externally controlled migrate sequence

pub mod migrate;

pub use migrate::{resolve_source_controller, Migrator, ReadinessPolicy, FORCED_PHASES};
