use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use atrium_compiler::{
    compile_quick_app, instantiate_quick_app, CompilerBootstrap, QuickAppComponent,
};
use atrium_core::{current_unix_timestamp, write_json_atomic};
use atrium_lifecycle::{AppLifecycleManager, AppSource};
use atrium_quickapp::{parse_quick_app, validate_quick_app, ValidationWarning};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{InstallOrigin, QuickAppInstallation};

/// Schema version of the persisted installation record.
pub const INSTALLATION_STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `InstallOutcome` values.
pub enum InstallOutcome {
    Installed,
    Updated,
}

impl InstallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Public struct `QuickAppInstallReport` used across Atrium components.
pub struct QuickAppInstallReport {
    pub app_id: String,
    pub outcome: InstallOutcome,
    pub warnings: Vec<ValidationWarning>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstallationState {
    schema_version: u32,
    installations: BTreeMap<String, QuickAppInstallation>,
}

/// Single-writer owner of the Quick App installation map and the live
/// component cache. Installation ids are kept in lockstep with the
/// Lifecycle Manager's registry: both are only ever updated here.
pub struct QuickAppInstaller {
    state_path: PathBuf,
    bootstrap: CompilerBootstrap,
    installations: BTreeMap<String, QuickAppInstallation>,
    components: HashMap<String, QuickAppComponent>,
}

impl std::fmt::Debug for QuickAppInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickAppInstaller")
            .field("state_path", &self.state_path)
            .field("installations", &self.installations)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl QuickAppInstaller {
    pub fn new(state_path: &Path, bootstrap: CompilerBootstrap) -> Self {
        Self {
            state_path: state_path.to_path_buf(),
            bootstrap,
            installations: BTreeMap::new(),
            components: HashMap::new(),
        }
    }

    /// Loads persisted installations from disk. A missing state file yields
    /// an empty installer; an unsupported schema version is an error.
    pub fn load(state_path: &Path, bootstrap: CompilerBootstrap) -> Result<Self> {
        let mut installer = Self::new(state_path, bootstrap);
        if !state_path.exists() {
            return Ok(installer);
        }
        let content = std::fs::read_to_string(state_path).with_context(|| {
            format!("failed to read installation state {}", state_path.display())
        })?;
        let state: InstallationState = serde_json::from_str(&content).with_context(|| {
            format!("failed to parse installation state {}", state_path.display())
        })?;
        if state.schema_version != INSTALLATION_STATE_SCHEMA_VERSION {
            bail!(
                "unsupported installation state schema_version {} in {}",
                state.schema_version,
                state_path.display()
            );
        }
        installer.installations = state.installations;
        Ok(installer)
    }

    /// Parses, compiles, persists, and registers one Quick App document.
    /// Validation warnings are logged and never block; compile errors abort
    /// the whole install with nothing persisted. Installing an id twice
    /// overwrites the prior installation entirely, including its cached
    /// component.
    pub async fn install_from_markdown(
        &mut self,
        manager: &mut AppLifecycleManager,
        text: &str,
        origin: InstallOrigin,
        origin_location: Option<&str>,
    ) -> Result<QuickAppInstallReport> {
        let parsed = parse_quick_app(text)?;
        let warnings = validate_quick_app(&parsed);
        for warning in &warnings {
            warn!(app_id = %parsed.id, code = %warning.code, "{}", warning.message);
        }

        let host = self.bootstrap.host().await?;
        let compiled = compile_quick_app(&host, &parsed).await;
        if compiled.has_errors() {
            let details = compiled
                .errors
                .iter()
                .map(|diagnostic| {
                    format!(
                        "{}:{} {}",
                        diagnostic.line, diagnostic.column, diagnostic.message
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            bail!(
                "quick app '{}' failed to compile with {} error(s): {}",
                parsed.id,
                compiled.errors.len(),
                details
            );
        }

        let app_id = compiled.manifest.id.clone();
        let manifest = compiled.manifest.clone();
        let now_unix = current_unix_timestamp();
        let (outcome, installed_at_unix) = match self.installations.get(&app_id) {
            Some(existing) => (InstallOutcome::Updated, existing.installed_at_unix),
            None => (InstallOutcome::Installed, now_unix),
        };
        self.installations.insert(
            app_id.clone(),
            QuickAppInstallation {
                compiled,
                installed_at_unix,
                updated_at_unix: now_unix,
                origin,
                origin_location: origin_location.map(str::to_string),
            },
        );
        self.persist()?;
        self.components.remove(&app_id);
        manager.install_app(manifest, AppSource::Local)?;
        info!(
            app_id = %app_id,
            origin = origin.as_str(),
            outcome = outcome.as_str(),
            "quick app installed"
        );

        Ok(QuickAppInstallReport {
            app_id,
            outcome,
            warnings,
        })
    }

    /// Downloads document text and delegates to the markdown path with
    /// origin `url`.
    pub async fn install_from_url(
        &mut self,
        manager: &mut AppLifecycleManager,
        url: &str,
    ) -> Result<QuickAppInstallReport> {
        let response = reqwest::get(url)
            .await
            .with_context(|| format!("failed to download quick app document {url}"))?;
        if !response.status().is_success() {
            bail!(
                "quick app document '{url}' returned status {}",
                response.status()
            );
        }
        let text = response
            .text()
            .await
            .with_context(|| format!("failed to read quick app document body {url}"))?;
        self.install_from_markdown(manager, &text, InstallOrigin::Url, Some(url))
            .await
    }

    /// Evicts the cached component, removes the installation record, and
    /// uninstalls from the Lifecycle Manager. Unknown ids are a no-op.
    pub fn uninstall(&mut self, manager: &mut AppLifecycleManager, app_id: &str) -> Result<()> {
        self.components.remove(app_id);
        if self.installations.remove(app_id).is_some() {
            self.persist()?;
            info!(app_id, "quick app uninstalled");
        }
        manager.uninstall_app(app_id);
        Ok(())
    }

    /// Returns a cached component, synthesizing and caching one from the
    /// persisted installation when absent. Unknown ids yield `None`.
    pub fn get_component(&mut self, app_id: &str) -> Option<&mut QuickAppComponent> {
        if !self.components.contains_key(app_id) {
            let installation = self.installations.get(app_id)?;
            let component =
                instantiate_quick_app(app_id, &installation.compiled.executable_source);
            self.components.insert(app_id.to_string(), component);
        }
        self.components.get_mut(app_id)
    }

    /// Drops a cached component. The cache is an optimization, never a
    /// source of truth; the installation record survives.
    pub fn evict_component(&mut self, app_id: &str) {
        self.components.remove(app_id);
    }

    /// Re-registers every persisted installation's manifest with the
    /// Lifecycle Manager. Used once after a cold process start, since the
    /// manager's registry is not assumed to outlive a restart while Quick
    /// App installations are.
    pub fn reload_all(&mut self, manager: &mut AppLifecycleManager) -> Result<usize> {
        let mut reloaded = 0;
        for installation in self.installations.values() {
            manager.install_app(installation.compiled.manifest.clone(), AppSource::Local)?;
            reloaded += 1;
        }
        Ok(reloaded)
    }

    pub fn installation(&self, app_id: &str) -> Option<&QuickAppInstallation> {
        self.installations.get(app_id)
    }

    pub fn installation_ids(&self) -> impl Iterator<Item = &str> {
        self.installations.keys().map(String::as_str)
    }

    fn persist(&self) -> Result<()> {
        let state = InstallationState {
            schema_version: INSTALLATION_STATE_SCHEMA_VERSION,
            installations: self.installations.clone(),
        };
        write_json_atomic(&self.state_path, &state)
    }
}
