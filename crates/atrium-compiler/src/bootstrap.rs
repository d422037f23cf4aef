use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use wasmparser::{Parser, Payload};
use wasmtime::{Config, Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder};

use crate::CompileDiagnostic;

const WASM_PAGE_SIZE_BYTES: u64 = 65_536;
const COMPILER_MEMORY_EXPORT: &str = "memory";
/// Alloc export the hosted compiler module must provide.
pub const COMPILER_ALLOC_EXPORT: &str = "quick_compiler_alloc";
/// Compile export the hosted compiler module must provide.
pub const COMPILER_COMPILE_EXPORT: &str = "quick_compiler_compile";
/// Fixed baseline language level every compile targets.
pub const COMPILE_TARGET_DEFAULT: &str = "es2020";

const COMPILER_FUEL_LIMIT: u64 = 50_000_000;
const COMPILER_MEMORY_LIMIT_BYTES: u64 = 64 * 1024 * 1024;
const COMPILE_TIMEOUT_MS: u64 = 10_000;
const COMPILER_MAX_RESPONSE_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured bootstrap failure. Memoized by [`CompilerBootstrap`] and
/// re-raised to every subsequent caller without retrying.
pub struct CompileBootstrapError {
    pub reason_code: String,
    pub message: String,
}

impl CompileBootstrapError {
    fn new(reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileBootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.reason_code)
    }
}

impl std::error::Error for CompileBootstrapError {}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `CompilerSource` values.
pub enum CompilerSource {
    /// Single-file compiler module on local disk.
    Path(PathBuf),
    /// Remotely hosted compiler module, optionally digest-pinned.
    Url {
        url: String,
        sha256: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Request payload handed to the hosted compiler module.
pub struct CompileRequest {
    pub filename: String,
    pub source: String,
    pub target: String,
    pub source_maps: bool,
    pub minify: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Response payload produced by the hosted compiler module.
pub struct CompileResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub compiler_version: Option<String>,
    #[serde(default)]
    pub warnings: Vec<CompileDiagnostic>,
    #[serde(default)]
    pub errors: Vec<CompileDiagnostic>,
}

/// Initialized compiler engine: one instantiation per compile call, shared
/// module and engine for the process lifetime. Stateless per call.
pub struct CompilerHost {
    engine: Engine,
    module: Module,
}

impl std::fmt::Debug for CompilerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerHost").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct CompileStoreState {
    limits: StoreLimits,
}

impl CompilerHost {
    /// Invokes the hosted compiler on one combined source unit. Failures
    /// here are collected into diagnostics by the caller, never thrown
    /// further.
    pub async fn compile(&self, request: CompileRequest) -> anyhow::Result<CompileResponse> {
        let engine = self.engine.clone();
        let module = self.module.clone();
        let request_json = serde_json::to_string(&request)?;
        let join = tokio::task::spawn_blocking(move || {
            compile_with_timeout(engine, module, request_json)
        });
        join.await
            .map_err(|error| anyhow::anyhow!("failed to join compile task: {error}"))?
    }
}

fn compile_with_timeout(
    engine: Engine,
    module: Module,
    request_json: String,
) -> anyhow::Result<CompileResponse> {
    let (sender, receiver) = mpsc::sync_channel(1);
    std::thread::Builder::new()
        .name("atrium-quick-compiler".to_string())
        .spawn(move || {
            let _ = sender.send(compile_blocking(engine, module, request_json));
        })
        .map_err(|error| anyhow::anyhow!("failed to spawn compile worker: {error}"))?;

    match receiver.recv_timeout(Duration::from_millis(COMPILE_TIMEOUT_MS)) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => anyhow::bail!(
            "compile timed out after {} ms",
            COMPILE_TIMEOUT_MS
        ),
        Err(RecvTimeoutError::Disconnected) => {
            anyhow::bail!("compile worker terminated before returning a result")
        }
    }
}

fn compile_blocking(
    engine: Engine,
    module: Module,
    request_json: String,
) -> anyhow::Result<CompileResponse> {
    let mut store = Store::new(
        &engine,
        CompileStoreState {
            limits: StoreLimitsBuilder::new()
                .memory_size(COMPILER_MEMORY_LIMIT_BYTES as usize)
                .build(),
        },
    );
    store.limiter(|state| &mut state.limits);
    store
        .set_fuel(COMPILER_FUEL_LIMIT)
        .map_err(|error| anyhow::anyhow!("failed to configure compile fuel: {error}"))?;

    let linker = Linker::<CompileStoreState>::new(&engine);
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|error| anyhow::anyhow!("failed to instantiate compiler module: {error}"))?;

    let memory = instance
        .get_memory(&mut store, COMPILER_MEMORY_EXPORT)
        .ok_or_else(|| {
            anyhow::anyhow!("compiler module missing memory export '{COMPILER_MEMORY_EXPORT}'")
        })?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut store, COMPILER_ALLOC_EXPORT)
        .map_err(|error| {
            anyhow::anyhow!("compiler module missing alloc export '{COMPILER_ALLOC_EXPORT}': {error}")
        })?;
    let compile = instance
        .get_typed_func::<(i32, i32), i64>(&mut store, COMPILER_COMPILE_EXPORT)
        .map_err(|error| {
            anyhow::anyhow!(
                "compiler module missing compile export '{COMPILER_COMPILE_EXPORT}': {error}"
            )
        })?;

    let request_bytes = request_json.as_bytes();
    let request_len: i32 = request_bytes
        .len()
        .try_into()
        .map_err(|_| anyhow::anyhow!("compile request exceeds wasm i32 length boundary"))?;
    let request_ptr = alloc
        .call(&mut store, request_len)
        .map_err(|error| anyhow::anyhow!("compiler alloc export failed: {error}"))?;
    if request_ptr < 0 {
        anyhow::bail!("compiler alloc export returned a negative pointer");
    }
    let request_ptr = request_ptr as usize;
    validate_memory_range(&memory, &store, request_ptr, request_bytes.len())?;
    memory
        .write(&mut store, request_ptr, request_bytes)
        .map_err(|error| anyhow::anyhow!("failed to write compile request: {error}"))?;

    let packed = compile
        .call(&mut store, (request_ptr as i32, request_len))
        .map_err(|error| anyhow::anyhow!("compiler invoke trapped: {error}"))?;
    let packed = packed as u64;
    let response_ptr = (packed >> 32) as usize;
    let response_len = (packed & 0xFFFF_FFFF) as usize;
    if response_len > COMPILER_MAX_RESPONSE_BYTES {
        anyhow::bail!(
            "compile response length {} exceeds limit {}",
            response_len,
            COMPILER_MAX_RESPONSE_BYTES
        );
    }
    validate_memory_range(&memory, &store, response_ptr, response_len)?;
    let mut response_bytes = vec![0u8; response_len];
    memory
        .read(&store, response_ptr, &mut response_bytes)
        .map_err(|error| anyhow::anyhow!("failed to read compile response: {error}"))?;
    let response_json = String::from_utf8(response_bytes)
        .map_err(|error| anyhow::anyhow!("compile response is not valid UTF-8: {error}"))?;
    let response: CompileResponse = serde_json::from_str(&response_json)
        .map_err(|error| anyhow::anyhow!("compile response is not valid JSON: {error}"))?;
    debug!(
        warnings = response.warnings.len(),
        errors = response.errors.len(),
        "compile call completed"
    );
    Ok(response)
}

fn validate_memory_range(
    memory: &wasmtime::Memory,
    store: &Store<CompileStoreState>,
    offset: usize,
    len: usize,
) -> anyhow::Result<()> {
    let memory_size = memory.data_size(store);
    let end = offset
        .checked_add(len)
        .ok_or_else(|| anyhow::anyhow!("memory range overflow"))?;
    if end > memory_size {
        anyhow::bail!(
            "offset={} len={} end={} exceeds memory_size={}",
            offset,
            len,
            end,
            memory_size
        );
    }
    Ok(())
}

#[derive(Clone)]
/// Single-flight bootstrap guard for the hosted compiler. Initialization
/// happens exactly once per guard (the installer owns one per process);
/// concurrent callers await the same pending operation, and a failure is
/// memoized and re-raised without automatic retry.
pub struct CompilerBootstrap {
    source: CompilerSource,
    cell: Arc<OnceCell<Result<Arc<CompilerHost>, CompileBootstrapError>>>,
}

impl CompilerBootstrap {
    pub fn new(source: CompilerSource) -> Self {
        Self {
            source,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Returns the initialized compiler host, bootstrapping it on first use.
    pub async fn host(&self) -> Result<Arc<CompilerHost>, CompileBootstrapError> {
        self.cell
            .get_or_init(|| async { bootstrap_compiler(&self.source).await })
            .await
            .clone()
    }
}

async fn bootstrap_compiler(
    source: &CompilerSource,
) -> Result<Arc<CompilerHost>, CompileBootstrapError> {
    let module_bytes = fetch_compiler_bytes(source).await?;
    validate_compiler_module(&module_bytes)?;

    let mut config = Config::new();
    config.consume_fuel(true);
    let engine = Engine::new(&config).map_err(|error| {
        CompileBootstrapError::new(
            "compiler_engine_init_failed",
            format!("failed to initialize compiler engine: {error}"),
        )
    })?;
    let module = Module::new(&engine, &module_bytes).map_err(|error| {
        CompileBootstrapError::new(
            "compiler_module_compile_failed",
            format!("failed to compile the hosted compiler module: {error}"),
        )
    })?;
    info!(bytes = module_bytes.len(), "quick app compiler bootstrapped");
    Ok(Arc::new(CompilerHost { engine, module }))
}

async fn fetch_compiler_bytes(
    source: &CompilerSource,
) -> Result<Vec<u8>, CompileBootstrapError> {
    match source {
        CompilerSource::Path(path) => std::fs::read(path).map_err(|error| {
            CompileBootstrapError::new(
                "compiler_source_read_failed",
                format!("failed to read compiler module '{}': {error}", path.display()),
            )
        }),
        CompilerSource::Url { url, sha256 } => {
            let response = reqwest::Client::new()
                .get(url)
                .send()
                .await
                .map_err(|error| {
                    CompileBootstrapError::new(
                        "compiler_fetch_failed",
                        format!("failed to fetch compiler module '{url}': {error}"),
                    )
                })?;
            if !response.status().is_success() {
                return Err(CompileBootstrapError::new(
                    "compiler_fetch_status",
                    format!(
                        "compiler module fetch '{url}' returned status {}",
                        response.status()
                    ),
                ));
            }
            let bytes = response.bytes().await.map_err(|error| {
                CompileBootstrapError::new(
                    "compiler_fetch_failed",
                    format!("failed to read compiler module body '{url}': {error}"),
                )
            })?;
            if let Some(expected) = sha256 {
                let actual = format!("{:x}", Sha256::digest(&bytes));
                if !actual.eq_ignore_ascii_case(expected.trim()) {
                    return Err(CompileBootstrapError::new(
                        "compiler_digest_mismatch",
                        format!(
                            "compiler module sha256 mismatch for '{url}': expected {expected}, got {actual}"
                        ),
                    ));
                }
            }
            Ok(bytes.to_vec())
        }
    }
}

fn validate_compiler_module(module_bytes: &[u8]) -> Result<(), CompileBootstrapError> {
    for payload in Parser::new(0).parse_all(module_bytes) {
        let payload = payload.map_err(|error| {
            CompileBootstrapError::new(
                "compiler_module_invalid",
                format!("failed to parse compiler module bytes: {error}"),
            )
        })?;
        if let Payload::MemorySection(section) = payload {
            for memory in section {
                let memory = memory.map_err(|error| {
                    CompileBootstrapError::new(
                        "compiler_module_invalid",
                        format!("failed to parse compiler memory section: {error}"),
                    )
                })?;
                let min_bytes = memory.initial.saturating_mul(WASM_PAGE_SIZE_BYTES);
                if min_bytes > COMPILER_MEMORY_LIMIT_BYTES {
                    return Err(CompileBootstrapError::new(
                        "compiler_module_memory_exceeds_limit",
                        format!(
                            "compiler module declares minimum memory {} bytes above limit {} bytes",
                            min_bytes, COMPILER_MEMORY_LIMIT_BYTES
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use sha2::{Digest, Sha256};
    use tempfile::tempdir;

    use super::*;

    fn compiler_module_wat(response: &str) -> String {
        let escaped = response.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "(module\n  (memory (export \"memory\") 1)\n  (global $heap (mut i32) (i32.const 4096))\n  (data (i32.const 0) \"{}\")\n  (func (export \"quick_compiler_alloc\") (param $len i32) (result i32)\n    (local $ptr i32)\n    global.get $heap\n    local.set $ptr\n    global.get $heap\n    local.get $len\n    i32.add\n    global.set $heap\n    local.get $ptr)\n  (func (export \"quick_compiler_compile\") (param i32 i32) (result i64)\n    i64.const {})\n)",
            escaped,
            response.len()
        )
    }

    fn write_compiler_module(path: &std::path::Path, response: &str) {
        let bytes = wat::parse_str(compiler_module_wat(response)).expect("parse wat");
        std::fs::write(path, bytes).expect("write compiler module");
    }

    fn sample_request() -> CompileRequest {
        CompileRequest {
            filename: "probe.tsx".to_string(),
            source: "export default () => null;".to_string(),
            target: COMPILE_TARGET_DEFAULT.to_string(),
            source_maps: false,
            minify: false,
        }
    }

    #[tokio::test]
    async fn functional_compile_round_trips_through_hosted_compiler() {
        let response = serde_json::json!({
            "code": "(module)",
            "compiler_version": "0.9.1",
            "warnings": [{"line": 3, "column": 7, "message": "unused helper"}],
            "errors": []
        })
        .to_string();
        let temp = tempdir().expect("tempdir");
        let module_path = temp.path().join("compiler.wasm");
        write_compiler_module(&module_path, &response);

        let bootstrap = CompilerBootstrap::new(CompilerSource::Path(module_path));
        let host = bootstrap.host().await.expect("bootstrap");
        let compiled = host.compile(sample_request()).await.expect("compile");

        assert_eq!(compiled.code, "(module)");
        assert_eq!(compiled.compiler_version.as_deref(), Some("0.9.1"));
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].line, 3);
        assert!(compiled.errors.is_empty());
    }

    #[tokio::test]
    async fn regression_bootstrap_failure_is_memoized_without_retry() {
        let temp = tempdir().expect("tempdir");
        let bootstrap =
            CompilerBootstrap::new(CompilerSource::Path(temp.path().join("absent.wasm")));

        let first = bootstrap.host().await.expect_err("missing file should fail");
        assert_eq!(first.reason_code, "compiler_source_read_failed");

        let second = bootstrap.host().await.expect_err("failure should be memoized");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn integration_concurrent_bootstrap_shares_one_fetch() {
        let response = serde_json::json!({"code": "(module)", "warnings": [], "errors": []})
            .to_string();
        let module_bytes = wat::parse_str(compiler_module_wat(&response)).expect("parse wat");
        let checksum = format!("{:x}", Sha256::digest(&module_bytes));

        let server = MockServer::start();
        let remote = server.mock(|when, then| {
            when.method(GET).path("/compiler.wasm");
            then.status(200).body(module_bytes.clone());
        });

        let bootstrap = CompilerBootstrap::new(CompilerSource::Url {
            url: format!("{}/compiler.wasm", server.base_url()),
            sha256: Some(checksum),
        });
        let (first, second) = tokio::join!(bootstrap.host(), bootstrap.host());
        assert!(first.is_ok() && second.is_ok());
        remote.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_url_digest_mismatch_fails_bootstrap() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/compiler.wasm");
            then.status(200).body(b"not the pinned bytes".to_vec());
        });

        let bootstrap = CompilerBootstrap::new(CompilerSource::Url {
            url: format!("{}/compiler.wasm", server.base_url()),
            sha256: Some("deadbeef".to_string()),
        });
        let error = bootstrap.host().await.expect_err("digest mismatch should fail");
        assert_eq!(error.reason_code, "compiler_digest_mismatch");
    }

    #[tokio::test]
    async fn regression_runaway_compile_is_stopped_by_fuel() {
        let temp = tempdir().expect("tempdir");
        let module_path = temp.path().join("spin.wasm");
        let bytes = wat::parse_str(
            "(module\n  (memory (export \"memory\") 1)\n  (func (export \"quick_compiler_alloc\") (param i32) (result i32) i32.const 0)\n  (func (export \"quick_compiler_compile\") (param i32 i32) (result i64)\n    (loop $spin (br $spin))\n    i64.const 0)\n)",
        )
        .expect("parse wat");
        std::fs::write(&module_path, bytes).expect("write module");

        let bootstrap = CompilerBootstrap::new(CompilerSource::Path(module_path));
        let host = bootstrap.host().await.expect("bootstrap");
        let error = host
            .compile(sample_request())
            .await
            .expect_err("runaway compile should trap on fuel exhaustion");
        assert!(error.to_string().contains("trapped"));
    }
}
