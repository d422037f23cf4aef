//! App lifecycle management for Atrium.
//!
//! Owns the registry of installed apps, dock ordering, and the single
//! active/open app. Every mutation of the registry, the dock list, or the
//! active slot goes through [`AppLifecycleManager`] actions; no other
//! component writes these structures directly.

mod manager;
mod state;
mod status;

pub use manager::{AppLifecycleManager, InstalledApp, WorkspaceSnapshot};
pub use state::{load_lifecycle_state, save_lifecycle_state, LIFECYCLE_STATE_SCHEMA_VERSION};
pub use status::{AppSource, AppStatus};
