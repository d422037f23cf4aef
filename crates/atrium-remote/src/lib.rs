//! Remote bundle loading and registry access for Atrium.
//!
//! Downloads externally hosted app bundles, verifies declared integrity
//! digests, registers bundles under one of two isolation strategies, and
//! auto-grants only the universally-safe capabilities. Also hosts the
//! read-only registry catalog client and update polling.

mod bundles;
mod client;
mod loader;

pub use bundles::{BundleIsolation, BundleRegistration, BundleStore};
pub use client::RegistryClient;
pub use loader::{IntegrityError, RemoteBundleLoader, UpdateReport};
