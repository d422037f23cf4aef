use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use atrium_core::{current_unix_timestamp, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::taxonomy::{find_capability, is_always_granted};

/// Schema version of the persisted permission ledger record.
pub const PERMISSION_LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `PermissionGrant` used across Atrium components.
pub struct PermissionGrant {
    pub app_id: String,
    pub capability: String,
    pub granted: bool,
    pub granted_at_unix: u64,
    #[serde(default)]
    pub revoked_at_unix: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Per-app grant ledger. Single writer: every mutation goes through these
/// methods, nothing else touches the grant map.
pub struct PermissionLedger {
    grants: BTreeMap<String, Vec<PermissionGrant>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PermissionLedgerState {
    schema_version: u32,
    grants: BTreeMap<String, Vec<PermissionGrant>>,
}

impl PermissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the app may use the capability. Universally-safe
    /// capabilities short-circuit true regardless of per-app state.
    pub fn has_permission(&self, app_id: &str, capability: &str) -> bool {
        if is_always_granted(capability) {
            return true;
        }
        self.grants
            .get(app_id)
            .and_then(|records| {
                records
                    .iter()
                    .find(|record| record.capability == capability)
            })
            .map(|record| record.granted)
            .unwrap_or(false)
    }

    /// Upserts a grant record for the app. Re-granting an existing
    /// capability updates the record in place rather than appending a
    /// duplicate.
    pub fn grant(&mut self, app_id: &str, capability: &str) -> Result<()> {
        self.upsert(app_id, capability, true)
    }

    /// Upserts a revocation for the app. Revoking a capability with no
    /// prior record creates a denied record so the revocation is durable.
    pub fn revoke(&mut self, app_id: &str, capability: &str) -> Result<()> {
        self.upsert(app_id, capability, false)
    }

    /// Grants every capability in the list. Each grant is independently
    /// idempotent, so sequential application needs no rollback.
    pub fn grant_all(&mut self, app_id: &str, capabilities: &[String]) -> Result<()> {
        for capability in capabilities {
            self.grant(app_id, capability)?;
        }
        Ok(())
    }

    /// Returns the subset of `capabilities` not yet satisfied for the app.
    /// Installers use this to decide what consent UI to show.
    pub fn get_required_permissions(&self, app_id: &str, capabilities: &[String]) -> Vec<String> {
        capabilities
            .iter()
            .filter(|capability| !self.has_permission(app_id, capability))
            .cloned()
            .collect()
    }

    /// Removes the app's entire ledger slice. Other apps' records are not
    /// affected.
    pub fn clear_app_permissions(&mut self, app_id: &str) {
        if self.grants.remove(app_id).is_some() {
            debug!(app_id, "cleared permission ledger slice");
        }
    }

    /// Read accessor for consent UI.
    pub fn grants_for_app(&self, app_id: &str) -> &[PermissionGrant] {
        self.grants
            .get(app_id)
            .map(|records| records.as_slice())
            .unwrap_or(&[])
    }

    fn upsert(&mut self, app_id: &str, capability: &str, granted: bool) -> Result<()> {
        if find_capability(capability).is_none() {
            bail!("unknown capability tag '{}'", capability);
        }
        let now_unix = current_unix_timestamp();
        let records = self.grants.entry(app_id.to_string()).or_default();
        match records
            .iter_mut()
            .find(|record| record.capability == capability)
        {
            Some(record) => {
                record.granted = granted;
                if granted {
                    record.granted_at_unix = now_unix;
                    record.revoked_at_unix = None;
                } else {
                    record.revoked_at_unix = Some(now_unix);
                }
            }
            None => records.push(PermissionGrant {
                app_id: app_id.to_string(),
                capability: capability.to_string(),
                granted,
                granted_at_unix: now_unix,
                revoked_at_unix: if granted { None } else { Some(now_unix) },
            }),
        }
        Ok(())
    }
}

/// Persists the ledger as a map of app id to grant list.
pub fn save_permission_ledger(ledger: &PermissionLedger, path: &Path) -> Result<()> {
    let state = PermissionLedgerState {
        schema_version: PERMISSION_LEDGER_SCHEMA_VERSION,
        grants: ledger.grants.clone(),
    };
    write_json_atomic(path, &state)
}

/// Loads a previously persisted ledger. A missing file yields an empty
/// ledger; an unsupported schema version is an error.
pub fn load_permission_ledger(path: &Path) -> Result<PermissionLedger> {
    if !path.exists() {
        return Ok(PermissionLedger::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read permission ledger {}", path.display()))?;
    let state: PermissionLedgerState = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse permission ledger {}", path.display()))?;
    if state.schema_version != PERMISSION_LEDGER_SCHEMA_VERSION {
        bail!(
            "unsupported permission ledger schema_version {} in {}",
            state.schema_version,
            path.display()
        );
    }
    Ok(PermissionLedger {
        grants: state.grants,
    })
}
