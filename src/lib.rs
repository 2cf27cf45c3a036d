// ABOUTME: Library crate for the ext-migrate test driver
// ABOUTME: Exposes argument parsing, store lookups, the control-plane client and the migrate sequence

pub mod args;
pub mod commands;
pub mod error;
pub mod macaroon;
pub mod names;
pub mod phase;
pub mod remote;
pub mod spec;
pub mod store;

pub use args::{MachineIdentity, MigrateArgs};
pub use error::{ArgumentField, MigrateError, Rejection};
pub use phase::MigrationPhase;
pub use spec::{build_migration_request, MigrationRequest};
