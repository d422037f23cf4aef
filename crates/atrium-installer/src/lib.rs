//! Quick App installation registry for Atrium.
//!
//! The integration point every UI layer calls: orchestrates parse → compile
//! → persist → register, keeps the Lifecycle Manager and the installation
//! map in lockstep, caches live components, and hosts the development
//! hot-reload bridge.

use serde::{Deserialize, Serialize};

use atrium_compiler::CompiledQuickApp;

mod dev_bridge;
mod installer;

pub use dev_bridge::{DevBridge, DevReloadEvent, DEV_BRIDGE_EVENTS_PATH, DEV_BRIDGE_SOURCE_PATH};
pub use installer::{
    InstallOutcome, QuickAppInstallReport, QuickAppInstaller, INSTALLATION_STATE_SCHEMA_VERSION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `InstallOrigin` values.
pub enum InstallOrigin {
    File,
    Url,
    Paste,
}

impl InstallOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Url => "url",
            Self::Paste => "paste",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A compiled Quick App wrapped with installation provenance. The only
/// Quick-App entity that is durably persisted across sessions; live
/// components are rebuilt from it on demand, never persisted.
pub struct QuickAppInstallation {
    pub compiled: CompiledQuickApp,
    pub installed_at_unix: u64,
    pub updated_at_unix: u64,
    pub origin: InstallOrigin,
    #[serde(default)]
    pub origin_location: Option<String>,
}
