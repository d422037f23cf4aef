use std::collections::BTreeMap;

use anyhow::{bail, Result};
use atrium_core::current_unix_timestamp;
use atrium_manifest::AppManifest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::status::{AppSource, AppStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `InstalledApp` used across Atrium components.
pub struct InstalledApp {
    pub manifest: AppManifest,
    pub status: AppStatus,
    pub installed_at_unix: u64,
    pub updated_at_unix: u64,
    pub version: String,
    pub source: AppSource,
    #[serde(default)]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Restoration snapshot recorded when an app opens and restored when it
/// closes: the shell's scroll position and route at open time.
pub struct WorkspaceSnapshot {
    pub scroll_position: f64,
    pub route: String,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveApp {
    id: String,
    snapshot: WorkspaceSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Single-writer owner of the installed-app registry, the dock list, and
/// the active slot. At most one app is active at any time.
pub struct AppLifecycleManager {
    apps: BTreeMap<String, InstalledApp>,
    dock: Vec<String>,
    active: Option<ActiveApp>,
}

impl AppLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(apps: BTreeMap<String, InstalledApp>, dock: Vec<String>) -> Self {
        Self {
            apps,
            dock,
            active: None,
        }
    }

    pub(crate) fn parts(&self) -> (&BTreeMap<String, InstalledApp>, &[String]) {
        (&self.apps, &self.dock)
    }

    /// Creates or overwrites the registry entry and, when the manifest's
    /// dock integration is enabled, places the app id in the dock list.
    pub fn install_app(&mut self, manifest: AppManifest, source: AppSource) -> Result<()> {
        let id = manifest.id.clone();
        self.begin_install(manifest, source)?;
        self.finalize_install(&id)
    }

    /// Registers the app with `installing` status and no dock entry yet.
    /// The remote loader uses this so integrity failures can surface as an
    /// `error` status on a visible entry.
    pub fn begin_install(&mut self, manifest: AppManifest, source: AppSource) -> Result<()> {
        if manifest.id.trim().is_empty() {
            bail!("app manifest id cannot be empty");
        }
        // Overwriting an open app closes it first, like uninstall does.
        if self.active.as_ref().map(|active| active.id.as_str()) == Some(manifest.id.as_str()) {
            self.close_app();
        }
        let now_unix = current_unix_timestamp();
        let installed_at_unix = self
            .apps
            .get(&manifest.id)
            .map(|existing| existing.installed_at_unix)
            .unwrap_or(now_unix);
        let version = manifest.version.clone();
        info!(app_id = %manifest.id, source = source.as_str(), "installing app");
        self.apps.insert(
            manifest.id.clone(),
            InstalledApp {
                manifest,
                status: AppStatus::Installing,
                installed_at_unix,
                updated_at_unix: now_unix,
                version,
                source,
                last_error: None,
            },
        );
        Ok(())
    }

    /// Completes an in-flight install: transitions to `installed` and wires
    /// the dock placement declared by the manifest (deduplicated; a declared
    /// position is clamped into the current dock list).
    pub fn finalize_install(&mut self, id: &str) -> Result<()> {
        self.set_status(id, AppStatus::Installed)?;
        let Some(app) = self.apps.get(id) else {
            bail!("unknown app id '{}'", id);
        };
        let dock = app.manifest.integrations.dock.clone();
        if dock.enabled {
            self.dock.retain(|entry| entry != id);
            let index = dock
                .position
                .map(|position| (position as usize).min(self.dock.len()))
                .unwrap_or(self.dock.len());
            self.dock.insert(index, id.to_string());
        }
        Ok(())
    }

    /// Removes the app from the registry and the dock, closing it first if
    /// it is currently active. Unknown ids are a no-op.
    pub fn uninstall_app(&mut self, id: &str) {
        if !self.apps.contains_key(id) {
            return;
        }
        if self.active.as_ref().map(|active| active.id.as_str()) == Some(id) {
            self.close_app();
        }
        self.apps.remove(id);
        self.dock.retain(|entry| entry != id);
        info!(app_id = %id, "uninstalled app");
    }

    /// Replaces manifest, resolved version, and update timestamp on an
    /// existing entry. Unknown ids are a no-op; this never creates entries.
    pub fn update_app(&mut self, id: &str, new_manifest: AppManifest) -> Result<()> {
        if !self.apps.contains_key(id) {
            return Ok(());
        }
        self.set_status(id, AppStatus::Updating)?;
        let app = self.apps.get_mut(id).expect("entry checked above");
        app.version = new_manifest.version.clone();
        app.manifest = new_manifest;
        app.updated_at_unix = current_unix_timestamp();
        self.set_status(id, AppStatus::Installed)
    }

    /// Records a restoration snapshot and sets the app active. Opening while
    /// another app is active replaces it directly; there is no stacking.
    pub fn open_app(&mut self, id: &str, snapshot: WorkspaceSnapshot) -> Result<()> {
        if !self.apps.contains_key(id) {
            bail!("cannot open unknown app id '{}'", id);
        }
        if let Some(previous) = self.active.take() {
            if previous.id != id {
                self.set_status(&previous.id, AppStatus::Installed)?;
            } else {
                self.active = Some(previous);
                return Ok(());
            }
        }
        self.set_status(id, AppStatus::Active)?;
        self.active = Some(ActiveApp {
            id: id.to_string(),
            snapshot,
        });
        debug!(app_id = %id, "opened app");
        Ok(())
    }

    /// Clears the active slot and returns the snapshot recorded at open so
    /// the shell can restore it. No-op (None) when nothing is active.
    pub fn close_app(&mut self) -> Option<WorkspaceSnapshot> {
        let active = self.active.take()?;
        // The entry may already be gone mid-uninstall; status bookkeeping
        // only applies while it exists.
        if self.apps.contains_key(&active.id) {
            let _ = self.set_status(&active.id, AppStatus::Installed);
        }
        debug!(app_id = %active.id, "closed app");
        Some(active.snapshot)
    }

    /// Moves the active app to `suspended`, clearing the active slot, and
    /// returns its restoration snapshot.
    pub fn suspend_app(&mut self, id: &str) -> Result<WorkspaceSnapshot> {
        match self.active.as_ref() {
            Some(active) if active.id == id => {}
            _ => bail!("app '{}' is not active and cannot be suspended", id),
        }
        self.set_status(id, AppStatus::Suspended)?;
        let active = self.active.take().expect("active checked above");
        Ok(active.snapshot)
    }

    /// Reopens a suspended app, recording a fresh restoration snapshot.
    pub fn resume_app(&mut self, id: &str, snapshot: WorkspaceSnapshot) -> Result<()> {
        match self.apps.get(id) {
            Some(app) if app.status == AppStatus::Suspended => {}
            Some(app) => bail!(
                "app '{}' is {} and cannot be resumed",
                id,
                app.status.as_str()
            ),
            None => bail!("cannot resume unknown app id '{}'", id),
        }
        self.open_app(id, snapshot)
    }

    /// Validated status transition. Entering `installed` clears any recorded
    /// error; invalid edges are rejected with a descriptive error.
    pub fn set_status(&mut self, id: &str, status: AppStatus) -> Result<()> {
        let Some(app) = self.apps.get_mut(id) else {
            bail!("unknown app id '{}'", id);
        };
        if !app.status.can_transition_to(status) {
            bail!(
                "invalid status transition {} -> {} for app '{}'",
                app.status.as_str(),
                status.as_str(),
                id
            );
        }
        app.status = status;
        if status == AppStatus::Installed {
            app.last_error = None;
        }
        Ok(())
    }

    /// Moves the app to `error` status and records the message.
    pub fn set_error(&mut self, id: &str, message: &str) -> Result<()> {
        self.set_status(id, AppStatus::Error)?;
        let app = self.apps.get_mut(id).expect("entry checked in set_status");
        app.last_error = Some(message.to_string());
        Ok(())
    }

    /// Appends the app id to the dock. Duplicate insertion and unknown app
    /// ids are rejected: every dock entry must reference a registry entry.
    pub fn add_to_dock(&mut self, id: &str) -> Result<()> {
        if !self.apps.contains_key(id) {
            bail!("cannot dock unknown app id '{}'", id);
        }
        if self.dock.iter().any(|entry| entry == id) {
            bail!("app '{}' is already in the dock", id);
        }
        self.dock.push(id.to_string());
        Ok(())
    }

    /// Removes the app id from the dock; unknown entries are a no-op.
    pub fn remove_from_dock(&mut self, id: &str) {
        self.dock.retain(|entry| entry != id);
    }

    /// Replaces the dock ordering. The new order must contain exactly the
    /// current dock ids, each once.
    pub fn reorder_dock(&mut self, order: &[String]) -> Result<()> {
        if order.len() != self.dock.len() {
            bail!(
                "dock reorder expects {} ids, got {}",
                self.dock.len(),
                order.len()
            );
        }
        let mut remaining: Vec<&String> = self.dock.iter().collect();
        for id in order {
            let Some(index) = remaining.iter().position(|entry| *entry == id) else {
                bail!("dock reorder references '{}' which is not docked", id);
            };
            remaining.remove(index);
        }
        self.dock = order.to_vec();
        Ok(())
    }

    pub fn get_app(&self, id: &str) -> Option<&InstalledApp> {
        self.apps.get(id)
    }

    pub fn list_apps(&self) -> impl Iterator<Item = &InstalledApp> {
        self.apps.values()
    }

    pub fn dock_apps(&self) -> &[String] {
        &self.dock
    }

    pub fn active_app_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use atrium_manifest::{AppManifest, DockIntegration};

    use super::*;

    fn docked_manifest(id: &str, position: Option<u32>) -> AppManifest {
        let mut manifest = AppManifest::minimal(id, id, "Box");
        manifest.integrations.dock = DockIntegration {
            enabled: true,
            position,
            badge_source: None,
        };
        manifest
    }

    fn snapshot(route: &str) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            scroll_position: 120.0,
            route: route.to_string(),
        }
    }

    #[test]
    fn functional_install_app_registers_and_docks() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("install");

        let app = manager.get_app("notes").expect("registered");
        assert_eq!(app.status, AppStatus::Installed);
        assert_eq!(app.source, AppSource::Local);
        assert_eq!(manager.dock_apps(), ["notes".to_string()]);
    }

    #[test]
    fn unit_install_app_without_dock_integration_skips_dock() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(AppManifest::minimal("quiet", "Quiet", "Moon"), AppSource::Local)
            .expect("install");
        assert!(manager.dock_apps().is_empty());
    }

    #[test]
    fn functional_install_app_honors_clamped_dock_position() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("first", None), AppSource::Local)
            .expect("install first");
        manager
            .install_app(docked_manifest("second", None), AppSource::Local)
            .expect("install second");
        manager
            .install_app(docked_manifest("front", Some(0)), AppSource::Local)
            .expect("install front");
        manager
            .install_app(docked_manifest("far", Some(99)), AppSource::Local)
            .expect("install far");

        assert_eq!(
            manager.dock_apps(),
            [
                "front".to_string(),
                "first".to_string(),
                "second".to_string(),
                "far".to_string()
            ]
        );
    }

    #[test]
    fn regression_reinstall_moves_dock_entry_instead_of_duplicating() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("install");
        manager
            .install_app(docked_manifest("other", None), AppSource::Local)
            .expect("install other");
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("reinstall");

        assert_eq!(
            manager.dock_apps(),
            ["other".to_string(), "notes".to_string()]
        );
    }

    #[test]
    fn regression_reinstall_preserves_first_install_timestamp() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("install");
        let first = manager.get_app("notes").expect("entry").installed_at_unix;
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("reinstall");
        assert_eq!(
            manager.get_app("notes").expect("entry").installed_at_unix,
            first
        );
    }

    #[test]
    fn functional_open_replaces_active_app_directly() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install a");
        manager
            .install_app(docked_manifest("b", None), AppSource::Local)
            .expect("install b");

        manager.open_app("a", snapshot("/home")).expect("open a");
        manager.open_app("b", snapshot("/docs")).expect("open b");

        assert_eq!(manager.active_app_id(), Some("b"));
        assert_eq!(
            manager.get_app("a").expect("a").status,
            AppStatus::Installed
        );
        assert_eq!(manager.get_app("b").expect("b").status, AppStatus::Active);
    }

    #[test]
    fn functional_close_app_returns_restoration_snapshot() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install");
        manager.open_app("a", snapshot("/canvas")).expect("open");

        let restored = manager.close_app().expect("snapshot");
        assert_eq!(restored.route, "/canvas");
        assert_eq!(manager.active_app_id(), None);
        assert!(manager.close_app().is_none());
    }

    #[test]
    fn regression_uninstall_active_app_closes_it_first() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install");
        manager.open_app("a", snapshot("/home")).expect("open");

        manager.uninstall_app("a");
        assert_eq!(manager.active_app_id(), None);
        assert!(manager.get_app("a").is_none());
        assert!(manager.dock_apps().is_empty());
    }

    #[test]
    fn regression_reinstalling_open_app_closes_it_first() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install");
        manager.open_app("a", snapshot("/home")).expect("open");

        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("reinstall");
        assert_eq!(manager.active_app_id(), None);
        assert_eq!(
            manager.get_app("a").expect("a").status,
            AppStatus::Installed
        );
    }

    #[test]
    fn unit_uninstall_unknown_id_is_a_no_op() {
        let mut manager = AppLifecycleManager::new();
        manager.uninstall_app("ghost");
        assert!(manager.get_app("ghost").is_none());
    }

    #[test]
    fn functional_update_app_replaces_manifest_and_version() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("notes", None), AppSource::Local)
            .expect("install");

        let mut updated = docked_manifest("notes", None);
        updated.version = "2.0.0".to_string();
        manager.update_app("notes", updated).expect("update");

        let app = manager.get_app("notes").expect("entry");
        assert_eq!(app.version, "2.0.0");
        assert_eq!(app.status, AppStatus::Installed);
    }

    #[test]
    fn regression_update_unknown_id_never_creates_entries() {
        let mut manager = AppLifecycleManager::new();
        manager
            .update_app("ghost", docked_manifest("ghost", None))
            .expect("no-op update");
        assert!(manager.get_app("ghost").is_none());
    }

    #[test]
    fn functional_suspend_and_resume_round_trip() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install");
        manager.open_app("a", snapshot("/deep")).expect("open");

        let restored = manager.suspend_app("a").expect("suspend");
        assert_eq!(restored.route, "/deep");
        assert_eq!(
            manager.get_app("a").expect("a").status,
            AppStatus::Suspended
        );
        assert_eq!(manager.active_app_id(), None);

        manager.resume_app("a", snapshot("/back")).expect("resume");
        assert_eq!(manager.get_app("a").expect("a").status, AppStatus::Active);
    }

    #[test]
    fn regression_error_status_is_recoverable() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(docked_manifest("a", None), AppSource::Local)
            .expect("install");
        manager.set_error("a", "bundle digest mismatch").expect("error");
        assert_eq!(manager.get_app("a").expect("a").status, AppStatus::Error);
        assert_eq!(
            manager.get_app("a").expect("a").last_error.as_deref(),
            Some("bundle digest mismatch")
        );

        manager
            .set_status("a", AppStatus::Installed)
            .expect("recover");
        assert_eq!(
            manager.get_app("a").expect("a").status,
            AppStatus::Installed
        );
        assert!(manager.get_app("a").expect("a").last_error.is_none());
    }

    #[test]
    fn unit_dock_operations_reject_duplicates_and_unknown_ids() {
        let mut manager = AppLifecycleManager::new();
        manager
            .install_app(AppManifest::minimal("a", "A", "Box"), AppSource::Local)
            .expect("install");

        manager.add_to_dock("a").expect("dock");
        let duplicate = manager.add_to_dock("a").expect_err("duplicate should fail");
        assert!(duplicate.to_string().contains("already in the dock"));

        let unknown = manager.add_to_dock("ghost").expect_err("unknown should fail");
        assert!(unknown.to_string().contains("unknown app id"));

        manager.remove_from_dock("ghost");
        manager.remove_from_dock("a");
        assert!(manager.dock_apps().is_empty());
    }

    #[test]
    fn functional_reorder_dock_requires_exact_id_set() {
        let mut manager = AppLifecycleManager::new();
        for id in ["a", "b", "c"] {
            manager
                .install_app(docked_manifest(id, None), AppSource::Local)
                .expect("install");
        }

        manager
            .reorder_dock(&["c".to_string(), "a".to_string(), "b".to_string()])
            .expect("reorder");
        assert_eq!(
            manager.dock_apps(),
            ["c".to_string(), "a".to_string(), "b".to_string()]
        );

        let error = manager
            .reorder_dock(&["c".to_string(), "a".to_string(), "ghost".to_string()])
            .expect_err("unknown id should fail");
        assert!(error.to_string().contains("not docked"));

        let short = manager
            .reorder_dock(&["c".to_string()])
            .expect_err("short list should fail");
        assert!(short.to_string().contains("expects 3 ids"));
    }

    #[test]
    fn regression_dock_invariant_holds_after_uninstall() {
        let mut manager = AppLifecycleManager::new();
        for id in ["a", "b"] {
            manager
                .install_app(docked_manifest(id, None), AppSource::Local)
                .expect("install");
        }
        manager.uninstall_app("a");
        for id in manager.dock_apps() {
            assert!(manager.get_app(id).is_some(), "dangling dock entry {id}");
        }
    }
}
