//! Quick App compiler and component runtime for Atrium.
//!
//! Transforms parsed Quick App source texts into one executable unit using a
//! wasm-hosted single-file compiler (no build server), and materializes live,
//! isolated components from the compiled output. The compiler is bootstrapped
//! lazily exactly once per process; compile errors are collected, never
//! thrown; component construction never fails past the instantiation
//! boundary — every failure mode produces a fallback component instead.

use atrium_core::current_unix_timestamp;
use serde::{Deserialize, Serialize};

mod assembly;
mod bootstrap;
mod component;
mod derive;

pub use assembly::{
    assemble_compile_unit, strip_glyph_imports, GLYPH_MODULE_SPECIFIER, GLYPH_SET,
};
pub use bootstrap::{
    CompileBootstrapError, CompileRequest, CompileResponse, CompilerBootstrap, CompilerHost,
    CompilerSource, COMPILER_ALLOC_EXPORT, COMPILER_COMPILE_EXPORT, COMPILE_TARGET_DEFAULT,
};
pub use component::{
    instantiate_quick_app, FallbackComponent, HostBridgeSnapshot, LiveComponent,
    QuickAppComponent, ThemeKind, COMPONENT_ALLOC_EXPORT, COMPONENT_ENTRY_DEFAULT,
    COMPONENT_ENTRY_NAMED, HOST_BRIDGE_MODULE,
};
pub use derive::derive_manifest;

use atrium_manifest::AppManifest;
use atrium_quickapp::ParsedQuickApp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One compiler diagnostic with its source position.
pub struct CompileDiagnostic {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A parsed Quick App plus its compiled executable source, derived manifest,
/// and collected diagnostics. A non-empty error list still carries the
/// artifact (with an empty executable body) so the caller decides what to do.
pub struct CompiledQuickApp {
    pub parsed: ParsedQuickApp,
    pub executable_source: String,
    pub manifest: AppManifest,
    pub compiled_at_unix: u64,
    pub compiler_version: String,
    pub warnings: Vec<CompileDiagnostic>,
    pub errors: Vec<CompileDiagnostic>,
}

impl CompiledQuickApp {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Compiles a parsed Quick App into a [`CompiledQuickApp`]. All failure
/// modes of the compile call itself are collected into the error list; only
/// the bootstrap (obtaining `host`) can fail ahead of this.
pub async fn compile_quick_app(host: &CompilerHost, parsed: &ParsedQuickApp) -> CompiledQuickApp {
    let unit = assemble_compile_unit(parsed);
    let request = CompileRequest {
        filename: format!("{}.tsx", parsed.id),
        source: unit,
        target: COMPILE_TARGET_DEFAULT.to_string(),
        source_maps: false,
        minify: false,
    };

    let (executable_source, compiler_version, warnings, errors) =
        match host.compile(request).await {
            Ok(response) => {
                let code = if response.errors.is_empty() {
                    response.code
                } else {
                    String::new()
                };
                (
                    code,
                    response.compiler_version.unwrap_or_else(|| "unknown".to_string()),
                    response.warnings,
                    response.errors,
                )
            }
            Err(error) => (
                String::new(),
                "unknown".to_string(),
                Vec::new(),
                vec![CompileDiagnostic {
                    line: 0,
                    column: 0,
                    message: format!("compiler invocation failed: {error}"),
                }],
            ),
        };

    CompiledQuickApp {
        manifest: derive_manifest(parsed),
        parsed: parsed.clone(),
        executable_source,
        compiled_at_unix: current_unix_timestamp(),
        compiler_version,
        warnings,
        errors,
    }
}
