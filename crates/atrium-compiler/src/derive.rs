use std::collections::BTreeSet;

use atrium_manifest::{
    AiContextHint, AppManifest, CommandPaletteEntry, DockIntegration, EntryReference,
    IntegrationConfig, ShortcutBinding, WindowConfig, WindowMode, WINDOW_HEIGHT_DEFAULT,
    WINDOW_WIDTH_DEFAULT,
};
use atrium_quickapp::{DockRequest, ParsedQuickApp, ParsedWindowMode};

const QUICK_APP_CATEGORY_DEFAULT: &str = "quick-app";

/// Derives an [`AppManifest`] deterministically from a parsed Quick App:
/// window mode/size/resizability, dock placement, AI-context hints, and
/// command-palette entries map directly from the front-matter with the
/// platform defaults, and the capability list is the set union of inferred
/// and explicitly declared capabilities.
pub fn derive_manifest(parsed: &ParsedQuickApp) -> AppManifest {
    let capabilities: BTreeSet<String> = parsed
        .inferred_capabilities
        .iter()
        .chain(parsed.declared_capabilities.iter())
        .cloned()
        .collect();

    let dock = match parsed.dock {
        DockRequest::Disabled => DockIntegration::default(),
        DockRequest::Enabled => DockIntegration {
            enabled: true,
            position: None,
            badge_source: None,
        },
        DockRequest::Position { position } => DockIntegration {
            enabled: true,
            position: Some(position),
            badge_source: None,
        },
    };

    AppManifest {
        id: parsed.id.clone(),
        name: parsed.name.clone(),
        version: parsed.version.clone(),
        description: parsed.description.clone(),
        category: parsed
            .category
            .clone()
            .unwrap_or_else(|| QUICK_APP_CATEGORY_DEFAULT.to_string()),
        keywords: parsed.tags.clone(),
        icon: parsed.icon.clone(),
        entry: EntryReference::QuickApp,
        window: WindowConfig {
            mode: match parsed.window.mode {
                Some(ParsedWindowMode::Fullscreen) => WindowMode::Fullscreen,
                Some(ParsedWindowMode::Floating) => WindowMode::Floating,
                Some(ParsedWindowMode::Panel) | None => WindowMode::Panel,
            },
            width: parsed.window.width.unwrap_or(WINDOW_WIDTH_DEFAULT),
            height: parsed.window.height.unwrap_or(WINDOW_HEIGHT_DEFAULT),
            x: None,
            y: None,
            resizable: parsed.window.resizable.unwrap_or(true),
        },
        integrations: IntegrationConfig {
            dock,
            ai_context: parsed
                .ai_prompt
                .clone()
                .map(|prompt| AiContextHint { prompt }),
            commands: parsed
                .commands
                .iter()
                .map(|entry| CommandPaletteEntry {
                    command: entry.command.clone(),
                    description: entry.description.clone(),
                })
                .collect(),
            shortcuts: parsed
                .shortcuts
                .iter()
                .map(|entry| ShortcutBinding {
                    key: entry.key.clone(),
                    action: entry.action.clone(),
                })
                .collect(),
        },
        capabilities: capabilities.into_iter().collect(),
        remote: None,
    }
}
