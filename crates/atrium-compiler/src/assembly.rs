use std::sync::OnceLock;

use atrium_quickapp::ParsedQuickApp;
use regex::Regex;

/// The one module specifier the runtime provides globally: the glyph icon
/// symbol set. Imports of it are stripped before compilation since no module
/// resolution exists at this layer. All other imports are author error
/// surface and reach the compiler untouched.
pub const GLYPH_MODULE_SPECIFIER: &str = "@atrium/glyphs";

/// Broad fixed allow-list of glyph names injected into component scope at
/// instantiation. Authors reference these by name.
pub const GLYPH_SET: &[&str] = &[
    "Activity",
    "AlarmClock",
    "Archive",
    "ArrowDown",
    "ArrowUp",
    "Bell",
    "Bookmark",
    "Box",
    "Brain",
    "Calculator",
    "Calendar",
    "Camera",
    "ChartBar",
    "Check",
    "ChevronDown",
    "ChevronUp",
    "Clipboard",
    "Clock",
    "Cloud",
    "Compass",
    "Database",
    "Download",
    "File",
    "Folder",
    "Globe",
    "Heart",
    "Home",
    "Image",
    "Inbox",
    "Key",
    "Layers",
    "Link",
    "List",
    "Mail",
    "Map",
    "Mic",
    "Moon",
    "Music",
    "Notebook",
    "Pencil",
    "Pin",
    "Play",
    "Radar",
    "Search",
    "Settings",
    "Star",
    "Sun",
    "Terminal",
    "Timer",
    "Trash",
    "Upload",
    "User",
    "Zap",
];

/// Runtime shim prepended to every compile unit: small helper hooks bridged
/// to the host shell (durable per-app keyed storage, a notification bridge,
/// a theme observer, a clipboard helper).
const QUICK_APP_RUNTIME_SHIM: &str = r#"// Atrium runtime shim (injected)
declare const __atrium: {
  storageGet(key: string): string | null;
  storageSet(key: string, value: string): void;
  notifyToast(message: string): void;
  themeKind(): "light" | "dark";
  clipboardCopy(text: string): void;
};
export function useStoredState(key, initial) {
  const raw = __atrium.storageGet(key);
  let value = raw === null ? initial : JSON.parse(raw);
  const set = (next) => { value = next; __atrium.storageSet(key, JSON.stringify(next)); };
  return [value, set];
}
export function notify(message) { __atrium.notifyToast(String(message)); }
export function useTheme() { return __atrium.themeKind(); }
export function copyToClipboard(text) { __atrium.clipboardCopy(String(text)); }
"#;

fn glyph_import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*import\s+(?:[^;'"]+\s+from\s+)?["']@atrium/glyphs["'];?\s*$"#,
        )
        .expect("glyph import pattern must compile")
    })
}

/// Removes import statements that reference the glyph symbol set. Every
/// other import statement is left in place for the compiler to reject.
pub fn strip_glyph_imports(source: &str) -> String {
    glyph_import_pattern().replace_all(source, "").into_owned()
}

/// Concatenates the runtime shim and all source fragments into one combined
/// unit, in shim → helpers → store → settings → App order, with glyph
/// imports stripped from each fragment.
pub fn assemble_compile_unit(parsed: &ParsedQuickApp) -> String {
    let mut unit = String::from(QUICK_APP_RUNTIME_SHIM);
    for fragment in [
        parsed.helpers_source.as_deref(),
        parsed.store_source.as_deref(),
        parsed.settings_source.as_deref(),
        Some(parsed.app_source.as_str()),
    ]
    .into_iter()
    .flatten()
    {
        unit.push('\n');
        unit.push_str(&strip_glyph_imports(fragment));
    }
    unit
}

#[cfg(test)]
mod tests {
    use atrium_quickapp::parse_quick_app;

    use super::*;

    #[test]
    fn unit_strip_glyph_imports_removes_only_glyph_specifier() {
        let source = "import { Clock, Bell } from \"@atrium/glyphs\";\nimport lodash from \"lodash\";\nconst x = 1;\n";
        let stripped = strip_glyph_imports(source);
        assert!(!stripped.contains("@atrium/glyphs"));
        assert!(stripped.contains("import lodash from \"lodash\";"));
        assert!(stripped.contains("const x = 1;"));
    }

    #[test]
    fn unit_strip_glyph_imports_handles_single_quotes_and_bare_imports() {
        let source = "import '@atrium/glyphs'\nimport { Sun } from '@atrium/glyphs';\n";
        assert!(strip_glyph_imports(source).trim().is_empty());
    }

    #[test]
    fn functional_assemble_compile_unit_orders_fragments() {
        let doc = r#"---
name: Layered
icon: Layers
---
Layered sources in a fixed order.

```tsx App
export default function Layered() { return <div />; }
```

```tsx helpers
export const helper = 1;
```

```tsx store
export const store = 2;
```
"#;
        let parsed = parse_quick_app(doc).expect("parse");
        let unit = assemble_compile_unit(&parsed);

        let shim = unit.find("Atrium runtime shim").expect("shim");
        let helpers = unit.find("export const helper").expect("helpers");
        let store = unit.find("export const store").expect("store");
        let app = unit.find("export default function Layered").expect("app");
        assert!(shim < helpers && helpers < store && store < app);
    }

    #[test]
    fn unit_glyph_set_is_broad_and_duplicate_free() {
        let mut seen = std::collections::BTreeSet::new();
        for name in GLYPH_SET {
            assert!(seen.insert(name), "duplicate glyph {name}");
        }
        assert!(GLYPH_SET.len() >= 40);
    }
}
