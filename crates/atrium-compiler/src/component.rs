use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;
use wasmtime::{
    Caller, Config, Engine, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc,
};

use crate::assembly::GLYPH_SET;

/// Import module name for the narrow host bridge handed to components.
pub const HOST_BRIDGE_MODULE: &str = "atrium";
const COMPONENT_MEMORY_EXPORT: &str = "memory";
/// Alloc export every compiled component must provide.
pub const COMPONENT_ALLOC_EXPORT: &str = "component_alloc";
/// The component entry: the module's default export.
pub const COMPONENT_ENTRY_DEFAULT: &str = "default";
/// Fallback entry used when no default export exists.
pub const COMPONENT_ENTRY_NAMED: &str = "App";

const RENDER_FUEL_LIMIT: u64 = 10_000_000;
const COMPONENT_MEMORY_LIMIT_BYTES: u64 = 32 * 1024 * 1024;
const COMPONENT_MAX_RENDER_BYTES: usize = 512_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `ThemeKind` values.
pub enum ThemeKind {
    #[default]
    Light,
    Dark,
}

impl ThemeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    fn code(self) -> i32 {
        match self {
            Self::Light => 0,
            Self::Dark => 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Read-only view of a component's host bridge state.
pub struct HostBridgeSnapshot {
    pub storage: BTreeMap<String, String>,
    pub notifications: Vec<String>,
    pub clipboard: Option<String>,
    pub theme: ThemeKind,
}

#[derive(Debug)]
struct HostBridgeState {
    app_id: String,
    storage: BTreeMap<String, String>,
    notifications: Vec<String>,
    clipboard: Option<String>,
    theme: ThemeKind,
    limits: StoreLimits,
}

impl HostBridgeState {
    fn new(app_id: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            storage: BTreeMap::new(),
            notifications: Vec::new(),
            clipboard: None,
            theme: ThemeKind::default(),
            limits: StoreLimitsBuilder::new()
                .memory_size(COMPONENT_MEMORY_LIMIT_BYTES as usize)
                .build(),
        }
    }
}

/// A live, isolated Quick App component or the fallback that stands in for
/// one. Construction never fails: every instantiation failure mode produces
/// the fallback variant instead.
pub enum QuickAppComponent {
    Live(LiveComponent),
    Fallback(FallbackComponent),
}

impl QuickAppComponent {
    /// Renders the component with the given props. Runtime failures are
    /// contained here: the result is always a displayable string.
    pub fn render(&mut self, props: &Value) -> String {
        match self {
            Self::Live(live) => match live.render(props) {
                Ok(output) => output,
                Err(error) => {
                    warn!(app_id = %live.app_id, %error, "quick app render failed");
                    format!(
                        "quick app '{}' failed to render: {}. Reload the app to retry.",
                        live.app_id, error
                    )
                }
            },
            Self::Fallback(fallback) => fallback.render(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// Snapshot of the bridge state (per-app keyed storage, notifications,
    /// clipboard, theme). Fallback components have an empty bridge.
    pub fn bridge_snapshot(&self) -> HostBridgeSnapshot {
        match self {
            Self::Live(live) => {
                let state = live.store.data();
                HostBridgeSnapshot {
                    storage: state.storage.clone(),
                    notifications: state.notifications.clone(),
                    clipboard: state.clipboard.clone(),
                    theme: state.theme,
                }
            }
            Self::Fallback(_) => HostBridgeSnapshot::default(),
        }
    }

    /// Updates the theme observed by the component's theme hook.
    pub fn set_theme(&mut self, theme: ThemeKind) {
        if let Self::Live(live) = self {
            live.store.data_mut().theme = theme;
        }
    }

    /// Seeds the per-app keyed storage, used when the shell restores a
    /// component from durable state.
    pub fn restore_storage(&mut self, storage: BTreeMap<String, String>) {
        if let Self::Live(live) = self {
            live.store.data_mut().storage = storage;
        }
    }
}

/// A component instance backed by an isolated wasm store.
pub struct LiveComponent {
    app_id: String,
    store: Store<HostBridgeState>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    entry: TypedFunc<(i32, i32), i64>,
}

impl LiveComponent {
    fn render(&mut self, props: &Value) -> Result<String, String> {
        self.store
            .set_fuel(RENDER_FUEL_LIMIT)
            .map_err(|error| format!("failed to configure render fuel: {error}"))?;

        let envelope = serde_json::json!({
            "props": props,
            "theme": self.store.data().theme.as_str(),
            "icons": GLYPH_SET,
        });
        let envelope_json = envelope.to_string();
        let envelope_bytes = envelope_json.as_bytes();
        let envelope_len: i32 = envelope_bytes
            .len()
            .try_into()
            .map_err(|_| "render envelope exceeds wasm i32 length boundary".to_string())?;

        let envelope_ptr = self
            .alloc
            .call(&mut self.store, envelope_len)
            .map_err(|error| format!("component alloc failed: {error}"))?;
        if envelope_ptr < 0 {
            return Err("component alloc returned a negative pointer".to_string());
        }
        self.memory
            .write(&mut self.store, envelope_ptr as usize, envelope_bytes)
            .map_err(|error| format!("failed to write render envelope: {error}"))?;

        let packed = self
            .entry
            .call(&mut self.store, (envelope_ptr, envelope_len))
            .map_err(|error| format!("component entry trapped: {error}"))?;
        let packed = packed as u64;
        let output_ptr = (packed >> 32) as usize;
        let output_len = (packed & 0xFFFF_FFFF) as usize;
        if output_len > COMPONENT_MAX_RENDER_BYTES {
            return Err(format!(
                "render output length {} exceeds limit {}",
                output_len, COMPONENT_MAX_RENDER_BYTES
            ));
        }
        let memory_size = self.memory.data_size(&self.store);
        let end = output_ptr
            .checked_add(output_len)
            .ok_or_else(|| "render output range overflow".to_string())?;
        if end > memory_size {
            return Err(format!(
                "render output outside component memory: end={} size={}",
                end, memory_size
            ));
        }
        let mut output = vec![0u8; output_len];
        self.memory
            .read(&self.store, output_ptr, &mut output)
            .map_err(|error| format!("failed to read render output: {error}"))?;
        String::from_utf8(output).map_err(|error| format!("render output is not UTF-8: {error}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Stands in for a component whose construction failed: renders the error
/// message and offers a manual reload instead of propagating.
pub struct FallbackComponent {
    pub app_id: String,
    pub message: String,
}

impl FallbackComponent {
    fn render(&self) -> String {
        format!(
            "quick app '{}' could not be loaded: {}. Reload the app to retry.",
            self.app_id, self.message
        )
    }
}

/// Materializes a live component from compiled executable source. The
/// component receives only the explicit host bridge and the injected glyph
/// symbol set; there is no ambient global access. Every failure mode
/// returns a fallback component — this boundary never throws.
pub fn instantiate_quick_app(app_id: &str, executable_source: &str) -> QuickAppComponent {
    match try_instantiate(app_id, executable_source) {
        Ok(component) => QuickAppComponent::Live(component),
        Err(message) => {
            warn!(app_id, %message, "quick app instantiation fell back");
            QuickAppComponent::Fallback(FallbackComponent {
                app_id: app_id.to_string(),
                message,
            })
        }
    }
}

fn try_instantiate(app_id: &str, executable_source: &str) -> Result<LiveComponent, String> {
    if executable_source.trim().is_empty() {
        return Err("compiled artifact has no executable body".to_string());
    }

    let mut config = Config::new();
    config.consume_fuel(true);
    let engine = Engine::new(&config)
        .map_err(|error| format!("failed to initialize component engine: {error}"))?;
    let module = Module::new(&engine, executable_source.as_bytes())
        .map_err(|error| format!("executable source does not assemble: {error}"))?;

    let mut store = Store::new(&engine, HostBridgeState::new(app_id));
    store.limiter(|state| &mut state.limits);
    store
        .set_fuel(RENDER_FUEL_LIMIT)
        .map_err(|error| format!("failed to configure instantiation fuel: {error}"))?;

    let linker = build_host_bridge(&engine)?;
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|error| format!("component instantiation failed: {error}"))?;

    let memory = instance
        .get_memory(&mut store, COMPONENT_MEMORY_EXPORT)
        .ok_or_else(|| format!("component missing memory export '{COMPONENT_MEMORY_EXPORT}'"))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, COMPONENT_ALLOC_EXPORT)
        .map_err(|error| {
            format!("component missing alloc export '{COMPONENT_ALLOC_EXPORT}': {error}")
        })?;
    let entry = instance
        .get_typed_func::<(i32, i32), i64>(&mut store, COMPONENT_ENTRY_DEFAULT)
        .or_else(|_| instance.get_typed_func::<(i32, i32), i64>(&mut store, COMPONENT_ENTRY_NAMED))
        .map_err(|_| {
            format!(
                "component exports neither '{COMPONENT_ENTRY_DEFAULT}' nor '{COMPONENT_ENTRY_NAMED}'"
            )
        })?;

    Ok(LiveComponent {
        app_id: app_id.to_string(),
        store,
        memory,
        alloc,
        entry,
    })
}

fn read_guest_string(
    caller: &mut Caller<'_, HostBridgeState>,
    ptr: i32,
    len: i32,
) -> Option<String> {
    if ptr < 0 || len < 0 {
        return None;
    }
    let memory = caller.get_export(COMPONENT_MEMORY_EXPORT)?.into_memory()?;
    let mut buffer = vec![0u8; len as usize];
    memory.read(&caller, ptr as usize, &mut buffer).ok()?;
    String::from_utf8(buffer).ok()
}

fn build_host_bridge(engine: &Engine) -> Result<Linker<HostBridgeState>, String> {
    let mut linker = Linker::<HostBridgeState>::new(engine);
    linker
        .func_wrap(
            HOST_BRIDGE_MODULE,
            "storage_get",
            |mut caller: Caller<'_, HostBridgeState>,
             key_ptr: i32,
             key_len: i32,
             dest_ptr: i32,
             dest_cap: i32|
             -> i32 {
                let Some(key) = read_guest_string(&mut caller, key_ptr, key_len) else {
                    return -1;
                };
                let Some(value) = caller.data().storage.get(&key).cloned() else {
                    return -1;
                };
                if dest_ptr < 0 || dest_cap < 0 || value.len() > dest_cap as usize {
                    return -2;
                }
                let Some(memory) = caller
                    .get_export(COMPONENT_MEMORY_EXPORT)
                    .and_then(|export| export.into_memory())
                else {
                    return -1;
                };
                if memory
                    .write(&mut caller, dest_ptr as usize, value.as_bytes())
                    .is_err()
                {
                    return -1;
                }
                value.len() as i32
            },
        )
        .map_err(|error| format!("failed to register storage_get: {error}"))?;
    linker
        .func_wrap(
            HOST_BRIDGE_MODULE,
            "storage_set",
            |mut caller: Caller<'_, HostBridgeState>,
             key_ptr: i32,
             key_len: i32,
             value_ptr: i32,
             value_len: i32| {
                let Some(key) = read_guest_string(&mut caller, key_ptr, key_len) else {
                    return;
                };
                let Some(value) = read_guest_string(&mut caller, value_ptr, value_len) else {
                    return;
                };
                caller.data_mut().storage.insert(key, value);
            },
        )
        .map_err(|error| format!("failed to register storage_set: {error}"))?;
    linker
        .func_wrap(
            HOST_BRIDGE_MODULE,
            "notify_toast",
            |mut caller: Caller<'_, HostBridgeState>, message_ptr: i32, message_len: i32| {
                let Some(message) = read_guest_string(&mut caller, message_ptr, message_len)
                else {
                    return;
                };
                caller.data_mut().notifications.push(message);
            },
        )
        .map_err(|error| format!("failed to register notify_toast: {error}"))?;
    linker
        .func_wrap(
            HOST_BRIDGE_MODULE,
            "theme_kind",
            |caller: Caller<'_, HostBridgeState>| -> i32 { caller.data().theme.code() },
        )
        .map_err(|error| format!("failed to register theme_kind: {error}"))?;
    linker
        .func_wrap(
            HOST_BRIDGE_MODULE,
            "clipboard_copy",
            |mut caller: Caller<'_, HostBridgeState>, text_ptr: i32, text_len: i32| {
                let Some(text) = read_guest_string(&mut caller, text_ptr, text_len) else {
                    return;
                };
                caller.data_mut().clipboard = Some(text);
            },
        )
        .map_err(|error| format!("failed to register clipboard_copy: {error}"))?;
    Ok(linker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_component_wat(entry_name: &str) -> String {
        format!(
            "(module\n  (memory (export \"memory\") 1)\n  (func (export \"component_alloc\") (param i32) (result i32) i32.const 8192)\n  (func (export \"{entry_name}\") (param $ptr i32) (param $len i32) (result i64)\n    local.get $ptr\n    i64.extend_i32_u\n    i64.const 32\n    i64.shl\n    local.get $len\n    i64.extend_i32_u\n    i64.or)\n)"
        )
    }

    const BRIDGE_COMPONENT_WAT: &str = r#"(module
  (import "atrium" "storage_set" (func $storage_set (param i32 i32 i32 i32)))
  (import "atrium" "notify_toast" (func $notify_toast (param i32 i32)))
  (import "atrium" "clipboard_copy" (func $clipboard_copy (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "count42hello<ok/>")
  (func (export "component_alloc") (param i32) (result i32) i32.const 8192)
  (func (export "default") (param i32 i32) (result i64)
    i32.const 0 i32.const 5 i32.const 5 i32.const 2 call $storage_set
    i32.const 7 i32.const 5 call $notify_toast
    i32.const 7 i32.const 5 call $clipboard_copy
    i64.const 51539607557)
)"#;

    const TRAPPING_COMPONENT_WAT: &str = r#"(module
  (memory (export "memory") 1)
  (func (export "component_alloc") (param i32) (result i32) i32.const 8192)
  (func (export "default") (param i32 i32) (result i64) unreachable)
)"#;

    #[test]
    fn functional_default_export_renders_injected_envelope() {
        let mut component = instantiate_quick_app("echo", &echo_component_wat("default"));
        assert!(!component.is_fallback());

        let output = component.render(&serde_json::json!({"count": 3}));
        assert!(output.contains("\"count\":3"));
        assert!(output.contains("\"theme\":\"light\""));
        assert!(output.contains("\"icons\""));
        assert!(output.contains("Clock"), "glyph set must be injected");
    }

    #[test]
    fn functional_named_app_export_is_used_when_no_default_exists() {
        let mut component = instantiate_quick_app("named", &echo_component_wat("App"));
        assert!(!component.is_fallback());
        let output = component.render(&serde_json::json!({}));
        assert!(output.contains("\"props\""));
    }

    #[test]
    fn unit_theme_change_is_observed_on_next_render() {
        let mut component = instantiate_quick_app("themed", &echo_component_wat("default"));
        component.set_theme(ThemeKind::Dark);
        let output = component.render(&serde_json::json!({}));
        assert!(output.contains("\"theme\":\"dark\""));
    }

    #[test]
    fn functional_host_bridge_records_storage_notifications_and_clipboard() {
        let mut component = instantiate_quick_app("bridge", BRIDGE_COMPONENT_WAT);
        let output = component.render(&serde_json::json!({}));
        assert_eq!(output, "<ok/>");

        let snapshot = component.bridge_snapshot();
        assert_eq!(snapshot.storage.get("count").map(String::as_str), Some("42"));
        assert_eq!(snapshot.notifications, vec!["hello".to_string()]);
        assert_eq!(snapshot.clipboard.as_deref(), Some("hello"));
    }

    #[test]
    fn regression_missing_entry_export_falls_back() {
        let source = "(module\n  (memory (export \"memory\") 1)\n  (func (export \"component_alloc\") (param i32) (result i32) i32.const 0)\n)";
        let mut component = instantiate_quick_app("entryless", source);
        assert!(component.is_fallback());
        let output = component.render(&serde_json::json!({}));
        assert!(output.contains("could not be loaded"));
        assert!(output.contains("Reload the app to retry"));
    }

    #[test]
    fn regression_invalid_executable_source_falls_back() {
        let mut component = instantiate_quick_app("broken", "definitely not a module");
        assert!(component.is_fallback());
        assert!(component
            .render(&serde_json::json!({}))
            .contains("could not be loaded"));
    }

    #[test]
    fn regression_empty_executable_source_falls_back() {
        let component = instantiate_quick_app("empty", "   ");
        assert!(component.is_fallback());
    }

    #[test]
    fn regression_render_trap_is_contained_and_recoverable() {
        let mut component = instantiate_quick_app("trap", TRAPPING_COMPONENT_WAT);
        assert!(!component.is_fallback());

        let first = component.render(&serde_json::json!({}));
        assert!(first.contains("failed to render"));
        let second = component.render(&serde_json::json!({}));
        assert!(second.contains("failed to render"), "render must stay contained");
    }

    #[test]
    fn unit_restore_storage_seeds_bridge_state() {
        let mut component = instantiate_quick_app("seeded", &echo_component_wat("default"));
        let mut storage = BTreeMap::new();
        storage.insert("count".to_string(), "9".to_string());
        component.restore_storage(storage.clone());
        assert_eq!(component.bridge_snapshot().storage, storage);
    }
}
