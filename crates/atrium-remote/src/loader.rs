use std::fmt;

use anyhow::{bail, Context, Result};
use atrium_capability::{find_capability, PermissionLedger, RiskTier};
use atrium_lifecycle::{AppLifecycleManager, AppSource};
use atrium_manifest::AppManifest;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::bundles::{BundleRegistration, BundleStore};
use crate::client::RegistryClient;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured remote-bundle integrity failure: the downloaded bytes do not
/// match the digest the manifest declared.
pub struct IntegrityError {
    pub app_id: String,
    pub expected_sha256: String,
    pub actual_sha256: String,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bundle sha256 mismatch for app '{}': expected {}, got {}",
            self.app_id, self.expected_sha256, self.actual_sha256
        )
    }
}

impl std::error::Error for IntegrityError {}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One version mismatch reported by update polling. Nothing is installed.
pub struct UpdateReport {
    pub app_id: String,
    pub installed_version: String,
    pub latest_version: String,
}

#[derive(Debug, Clone, Default)]
/// Downloads, verifies, and registers remotely hosted app bundles.
pub struct RemoteBundleLoader {
    client: reqwest::Client,
}

impl RemoteBundleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a remote app: download `GET {source_url}/bundle`, verify the
    /// declared digest, register the bundle under the manifest's isolation
    /// strategy, auto-grant only the universally-safe declared capabilities,
    /// and transition the app to `installed`. On integrity mismatch the app
    /// status becomes `error` and nothing is registered.
    pub async fn install_remote_app(
        &self,
        manager: &mut AppLifecycleManager,
        ledger: &mut PermissionLedger,
        bundles: &mut BundleStore,
        manifest: AppManifest,
    ) -> Result<()> {
        let Some(remote) = manifest.remote.clone() else {
            bail!(
                "app '{}' has no remote descriptor and cannot be installed remotely",
                manifest.id
            );
        };
        let app_id = manifest.id.clone();
        let declared_capabilities = manifest.capabilities.clone();
        manager.begin_install(manifest, AppSource::Remote)?;

        let bundle_url = format!("{}/bundle", remote.source_url.trim_end_matches('/'));
        let bytes = match self.download_bundle(&bundle_url).await {
            Ok(bytes) => bytes,
            Err(error) => {
                manager.set_error(&app_id, &error.to_string())?;
                return Err(error)
                    .with_context(|| format!("remote install of '{app_id}' failed"));
            }
        };

        if let Some(expected) = remote.integrity_sha256.as_deref() {
            let actual = format!("{:x}", Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                let error = IntegrityError {
                    app_id: app_id.clone(),
                    expected_sha256: expected.trim().to_ascii_lowercase(),
                    actual_sha256: actual,
                };
                manager.set_error(&app_id, &error.to_string())?;
                return Err(error.into());
            }
        }

        let registration = if remote.sandboxed {
            BundleRegistration::Sandboxed { bytes }
        } else {
            BundleRegistration::Trusted { bytes }
        };
        info!(
            app_id = %app_id,
            isolation = registration.isolation().as_str(),
            "registered remote bundle"
        );
        bundles.register(&app_id, registration);

        for capability in &declared_capabilities {
            let Some(descriptor) = find_capability(capability) else {
                warn!(app_id = %app_id, capability, "skipping unknown declared capability");
                continue;
            };
            if descriptor.risk == RiskTier::Low {
                ledger.grant(&app_id, capability)?;
            }
        }
        let required = ledger.get_required_permissions(&app_id, &declared_capabilities);
        if !required.is_empty() {
            info!(
                app_id = %app_id,
                required = ?required,
                "declared capabilities awaiting explicit user consent"
            );
        }

        manager.finalize_install(&app_id)
    }

    /// Polls the registry for each remote app's latest manifest and reports
    /// version mismatches without installing anything.
    pub async fn check_for_updates(
        &self,
        manager: &AppLifecycleManager,
        registry: &RegistryClient,
    ) -> Result<Vec<UpdateReport>> {
        let mut reports = Vec::new();
        for app in manager.list_apps() {
            if app.source != AppSource::Remote {
                continue;
            }
            let latest = match registry.fetch_entry(&app.manifest.id).await {
                Ok(latest) => latest,
                Err(error) => {
                    warn!(app_id = %app.manifest.id, %error, "update poll failed");
                    continue;
                }
            };
            if latest.version != app.version {
                reports.push(UpdateReport {
                    app_id: app.manifest.id.clone(),
                    installed_version: app.version.clone(),
                    latest_version: latest.version,
                });
            }
        }
        Ok(reports)
    }

    /// Uninstalls a remote app, releasing both its permission ledger slice
    /// and the bundle it registered for loading.
    pub fn uninstall_remote_app(
        &self,
        manager: &mut AppLifecycleManager,
        ledger: &mut PermissionLedger,
        bundles: &mut BundleStore,
        app_id: &str,
    ) {
        manager.uninstall_app(app_id);
        ledger.clear_app_permissions(app_id);
        bundles.release(app_id);
    }

    async fn download_bundle(&self, bundle_url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(bundle_url)
            .send()
            .await
            .with_context(|| format!("failed to download bundle {bundle_url}"))?;
        if !response.status().is_success() {
            bail!(
                "bundle download '{bundle_url}' returned status {}",
                response.status()
            );
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read bundle body {bundle_url}"))?;
        Ok(bytes.to_vec())
    }
}
