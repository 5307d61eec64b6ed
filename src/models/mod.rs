//! Data model for the backup subsystem
//!
//! Destinations, per-database policies, global settings and the status
//! values reported while backups run.

pub mod destination;
pub mod policy;
pub mod settings;
pub mod status;

pub use destination::{BackupDestination, DestinationKind};
pub use policy::DatabasePolicy;
pub use settings::GlobalSettings;
pub use status::BackupStatus;
