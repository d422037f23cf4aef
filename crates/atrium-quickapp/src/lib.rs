//! Quick App document parser for Atrium.
//!
//! Turns one self-contained markdown document (front-matter, description,
//! fenced tagged code blocks, optional shortcut/command tables) into a
//! structured, typed app definition with an inferred capability list.
//! Parsing is deterministic: identical input yields an identical id,
//! description, and capability set. A separate validation pass returns
//! advisory warnings only.

use std::fmt;

use serde::{Deserialize, Serialize};

mod front_matter;
mod inference;
mod sections;
mod validation;

pub use inference::{generate_app_id, infer_capabilities, QUICK_APP_DEFAULT_ID};
pub use validation::{validate_quick_app, ValidationWarning};

use front_matter::{extract_front_matter, FrontMatterFields};
use sections::{extract_code_blocks, extract_description, extract_section_table};

/// Upper bound applied to the extracted description.
pub const DESCRIPTION_MAX_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured parse failure: always synchronous and fatal to the call that
/// triggered it.
pub struct ParseError {
    pub reason_code: String,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.reason_code)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Enumerates supported `ParsedWindowMode` values.
pub enum ParsedWindowMode {
    Panel,
    Fullscreen,
    Floating,
}

impl ParsedWindowMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Fullscreen => "fullscreen",
            Self::Floating => "floating",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Window-related front-matter fields with nothing defaulted yet; manifest
/// derivation applies the platform defaults.
pub struct ParsedWindow {
    #[serde(default)]
    pub mode: Option<ParsedWindowMode>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub resizable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
/// Enumerates supported `DockRequest` values.
pub enum DockRequest {
    Disabled,
    Enabled,
    Position { position: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `ShortcutEntry` used across Atrium components.
pub struct ShortcutEntry {
    pub key: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Public struct `CommandEntry` used across Atrium components.
pub struct CommandEntry {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The structured result of parsing one Quick App document. Immutable once
/// produced.
pub struct ParsedQuickApp {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub version: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub app_source: String,
    #[serde(default)]
    pub helpers_source: Option<String>,
    #[serde(default)]
    pub store_source: Option<String>,
    #[serde(default)]
    pub settings_source: Option<String>,
    #[serde(default)]
    pub stylesheet: Option<String>,
    #[serde(default)]
    pub shortcuts: Vec<ShortcutEntry>,
    #[serde(default)]
    pub commands: Vec<CommandEntry>,
    pub dock: DockRequest,
    #[serde(default)]
    pub ai_prompt: Option<String>,
    #[serde(default)]
    pub window: ParsedWindow,
    #[serde(default)]
    pub declared_capabilities: Vec<String>,
    #[serde(default)]
    pub inferred_capabilities: Vec<String>,
}

/// Parses one Quick App document into a [`ParsedQuickApp`].
pub fn parse_quick_app(text: &str) -> Result<ParsedQuickApp, ParseError> {
    let (fields, body) = extract_front_matter(text)?;
    let FrontMatterFields {
        name,
        icon,
        version,
        category,
        tags,
        dock,
        window,
        declared_capabilities,
        ai_prompt,
    } = fields;

    let blocks = extract_code_blocks(&body);
    let app_source = blocks.app.ok_or_else(|| {
        ParseError::new(
            "app_block_missing",
            "document is missing the mandatory ```tsx App code block",
        )
    })?;

    let description = extract_description(&body, DESCRIPTION_MAX_CHARS);
    let shortcuts = extract_section_table(&body, "Shortcuts")
        .into_iter()
        .map(|(key, action)| ShortcutEntry { key, action })
        .collect();
    let commands = extract_section_table(&body, "Commands")
        .into_iter()
        .map(|(command, description)| CommandEntry {
            command,
            description,
        })
        .collect();

    let mut combined_sources = String::new();
    combined_sources.push_str(&app_source);
    for source in [
        blocks.helpers.as_deref(),
        blocks.store.as_deref(),
        blocks.settings.as_deref(),
        blocks.stylesheet.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        combined_sources.push('\n');
        combined_sources.push_str(source);
    }
    let inferred_capabilities = infer_capabilities(&combined_sources);

    Ok(ParsedQuickApp {
        id: generate_app_id(&name),
        name,
        icon,
        version,
        category,
        tags,
        description,
        app_source,
        helpers_source: blocks.helpers,
        store_source: blocks.store,
        settings_source: blocks.settings,
        stylesheet: blocks.stylesheet,
        shortcuts,
        commands,
        dock,
        ai_prompt,
        window,
        declared_capabilities,
        inferred_capabilities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POMODORO_DOC: &str = r#"---
name: Pomodoro Timer
icon: Clock
dock: true
---
A focused work timer with gentle break reminders for long sessions.

```tsx App
export default function PomodoroTimer() {
  const sync = () => fetch("https://worldtimeapi.org/api/ip");
  return <div>25:00</div>;
}
```
"#;

    #[test]
    fn functional_parse_pomodoro_scenario() {
        let parsed = parse_quick_app(POMODORO_DOC).expect("parse");
        assert_eq!(parsed.id, "pomodoro-timer");
        assert_eq!(parsed.name, "Pomodoro Timer");
        assert_eq!(parsed.icon, "Clock");
        assert_eq!(parsed.dock, DockRequest::Enabled);
        assert!(parsed
            .inferred_capabilities
            .contains(&"network:http".to_string()));
        assert!(parsed.declared_capabilities.is_empty());

        let warnings = validate_quick_app(&parsed);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn unit_parse_is_deterministic_across_calls() {
        let first = parse_quick_app(POMODORO_DOC).expect("first parse");
        let second = parse_quick_app(POMODORO_DOC).expect("second parse");
        assert_eq!(first, second);
    }

    #[test]
    fn regression_missing_app_block_is_a_parse_error() {
        let doc = r#"---
name: Broken
icon: Bug
---
No code here.

```tsx helpers
export const x = 1;
```
"#;
        let error = parse_quick_app(doc).expect_err("missing App block should fail");
        assert_eq!(error.reason_code, "app_block_missing");
        assert!(error.message.contains("```tsx App"));
    }

    #[test]
    fn regression_missing_front_matter_fields_are_parse_errors() {
        let doc = "---\nicon: Bug\n---\n```tsx App\nexport default () => null;\n```\n";
        let error = parse_quick_app(doc).expect_err("missing name should fail");
        assert_eq!(error.reason_code, "front_matter_missing_field");
        assert!(error.message.contains("name"));
    }

    #[test]
    fn functional_parse_full_document_collects_all_sections() {
        let doc = r#"---
name: Notes Shelf
icon: Notebook
category: productivity
tags: [notes, writing]
version: 1.2.0
dock: 2
window: floating
width: 420
height: 600
resizable: false
capabilities: [system:clipboard]
ai:
  prompt: Helps the user capture short notes
---
Capture and organize short notes on a floating shelf.

```tsx App
export default function NotesShelf() {
  const store = useNotes();
  return <Shelf notes={store.items} />;
}
```

```tsx helpers
export function formatTitle(raw) { return raw.trim(); }
```

```tsx store
export function useNotes() { return useStoredState("notes", []); }
```

```tsx settings
export default function Settings() { return <div />; }
```

```css
.shelf { display: grid; }
```

## Shortcuts
| Key | Action |
|-----|--------|
| mod+n | New note |
| mod+d | Delete note |

## Commands
| Command | Description |
|---------|-------------|
| notes:new | Create a new note |
"#;
        let parsed = parse_quick_app(doc).expect("parse");
        assert_eq!(parsed.id, "notes-shelf");
        assert_eq!(parsed.version, "1.2.0");
        assert_eq!(parsed.category.as_deref(), Some("productivity"));
        assert_eq!(parsed.tags, vec!["notes".to_string(), "writing".to_string()]);
        assert_eq!(parsed.dock, DockRequest::Position { position: 2 });
        assert_eq!(parsed.window.mode, Some(ParsedWindowMode::Floating));
        assert_eq!(parsed.window.width, Some(420));
        assert_eq!(parsed.window.resizable, Some(false));
        assert_eq!(
            parsed.declared_capabilities,
            vec!["system:clipboard".to_string()]
        );
        assert_eq!(
            parsed.ai_prompt.as_deref(),
            Some("Helps the user capture short notes")
        );
        assert!(parsed.helpers_source.is_some());
        assert!(parsed.store_source.is_some());
        assert!(parsed.settings_source.is_some());
        assert!(parsed.stylesheet.is_some());
        assert_eq!(parsed.shortcuts.len(), 2);
        assert_eq!(parsed.shortcuts[0].key, "mod+n");
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.commands[0].command, "notes:new");
        assert_eq!(
            parsed.description,
            "Capture and organize short notes on a floating shelf."
        );
        assert!(parsed
            .inferred_capabilities
            .contains(&"storage:local".to_string()));
    }

    #[test]
    fn unit_parsed_quick_app_round_trips_through_json() {
        let parsed = parse_quick_app(POMODORO_DOC).expect("parse");
        let encoded = serde_json::to_string(&parsed).expect("serialize");
        let decoded: ParsedQuickApp = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, parsed);
    }
}
