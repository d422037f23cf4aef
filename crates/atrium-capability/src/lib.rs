//! Capability taxonomy and per-app permission ledger for Atrium.
//!
//! The taxonomy is a fixed table of named capabilities across six domains.
//! A small set of universally-safe capabilities is always considered granted
//! and bypasses the ledger entirely; everything else requires an explicit
//! grant record. The ledger persists independently of app installation so
//! revocations survive reinstalls unless explicitly cleared.

mod ledger;
mod taxonomy;

pub use ledger::{
    load_permission_ledger, save_permission_ledger, PermissionGrant, PermissionLedger,
    PERMISSION_LEDGER_SCHEMA_VERSION,
};
pub use taxonomy::{
    all_capabilities, find_capability, is_always_granted, Capability, CapabilityDomain, RiskTier,
    ALWAYS_GRANTED_CAPABILITIES,
};
