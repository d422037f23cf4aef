use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use atrium_core::write_json_atomic;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::manager::{AppLifecycleManager, InstalledApp};

/// Schema version of the persisted lifecycle record.
pub const LIFECYCLE_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LifecycleState {
    schema_version: u32,
    apps: BTreeMap<String, InstalledApp>,
    dock: Vec<String>,
}

/// Persists the installed-app registry and dock order as one durable
/// record. The active slot is session state and is not persisted.
pub fn save_lifecycle_state(manager: &AppLifecycleManager, path: &Path) -> Result<()> {
    let (apps, dock) = manager.parts();
    let state = LifecycleState {
        schema_version: LIFECYCLE_STATE_SCHEMA_VERSION,
        apps: apps.clone(),
        dock: dock.to_vec(),
    };
    write_json_atomic(path, &state)
}

/// Loads a previously persisted lifecycle record. A missing file yields an
/// empty manager. Dock entries that no longer reference a registry key are
/// dropped on load to restore the dock invariant.
pub fn load_lifecycle_state(path: &Path) -> Result<AppLifecycleManager> {
    if !path.exists() {
        return Ok(AppLifecycleManager::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read lifecycle state {}", path.display()))?;
    let state: LifecycleState = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse lifecycle state {}", path.display()))?;
    if state.schema_version != LIFECYCLE_STATE_SCHEMA_VERSION {
        bail!(
            "unsupported lifecycle state schema_version {} in {}",
            state.schema_version,
            path.display()
        );
    }
    let mut dock = Vec::with_capacity(state.dock.len());
    for id in state.dock {
        if state.apps.contains_key(&id) {
            dock.push(id);
        } else {
            warn!(app_id = %id, "dropping dangling dock entry from persisted state");
        }
    }
    Ok(AppLifecycleManager::from_parts(state.apps, dock))
}
