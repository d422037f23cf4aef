//! Shared app manifest data model for the Atrium platform.
//!
//! Manifests are immutable value objects: every update replaces the whole
//! manifest, nothing mutates one in place. The lifecycle manager, remote
//! bundle loader, and Quick App pipeline all consume these types.

use serde::{Deserialize, Serialize};

/// Default panel width applied when a manifest declares no size.
pub const WINDOW_WIDTH_DEFAULT: u32 = 720;
/// Default panel height applied when a manifest declares no size.
pub const WINDOW_HEIGHT_DEFAULT: u32 = 480;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `AppManifest` used across Atrium components.
pub struct AppManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub icon: String,
    pub entry: EntryReference,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub integrations: IntegrationConfig,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub remote: Option<RemoteDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
/// Enumerates supported `EntryReference` values.
pub enum EntryReference {
    /// Conventional component path resolved by the host shell.
    Path { path: String },
    /// Marker meaning the component is compiled at runtime from a Quick App
    /// installation.
    QuickApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `WindowMode` values.
pub enum WindowMode {
    Panel,
    Fullscreen,
    Floating,
}

impl WindowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Fullscreen => "fullscreen",
            Self::Floating => "floating",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `WindowConfig` used across Atrium components.
pub struct WindowConfig {
    pub mode: WindowMode,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            mode: WindowMode::Panel,
            width: WINDOW_WIDTH_DEFAULT,
            height: WINDOW_HEIGHT_DEFAULT,
            x: None,
            y: None,
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Public struct `IntegrationConfig` used across Atrium components.
pub struct IntegrationConfig {
    #[serde(default)]
    pub dock: DockIntegration,
    #[serde(default)]
    pub ai_context: Option<AiContextHint>,
    #[serde(default)]
    pub commands: Vec<CommandPaletteEntry>,
    #[serde(default)]
    pub shortcuts: Vec<ShortcutBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Public struct `DockIntegration` used across Atrium components.
pub struct DockIntegration {
    pub enabled: bool,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub badge_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `AiContextHint` used across Atrium components.
pub struct AiContextHint {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `CommandPaletteEntry` used across Atrium components.
pub struct CommandPaletteEntry {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `ShortcutBinding` used across Atrium components.
pub struct ShortcutBinding {
    pub key: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Remote provenance of an externally hosted app bundle.
pub struct RemoteDescriptor {
    pub source_url: String,
    #[serde(default)]
    pub integrity_sha256: Option<String>,
    #[serde(default)]
    pub sandboxed: bool,
}

impl AppManifest {
    /// Returns a manifest with the given identity and every other field at
    /// its default. Test fixtures and derivation code fill in the rest.
    pub fn minimal(id: &str, name: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: "0.1.0".to_string(),
            description: String::new(),
            category: String::new(),
            keywords: Vec::new(),
            icon: icon.to_string(),
            entry: EntryReference::QuickApp,
            window: WindowConfig::default(),
            integrations: IntegrationConfig::default(),
            capabilities: Vec::new(),
            remote: None,
        }
    }
}
