//! The Python worker: one engine instance on its own OS thread.
//!
//! The worker owns exactly one live instance of the embedded Python engine
//! and handles one execute request at a time. It lives on a dedicated
//! thread so the supervisor can abort it through the engine's kill switch
//! without cooperation from user code; filesystem synchronization re-enters
//! the async runtime through a captured handle.
//!
//! Message protocol: the supervisor sends [`ExecuteRequest`]s; the worker
//! answers with one `Ready` (or `InitFailed`) at startup and one `Finished`
//! per request. Channel closure in either direction ends the worker.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{MAX_CODE_SIZE_BYTES, MAX_OUTPUT_BYTES};
use crate::confine::VROOT;
use crate::engine::{EngineError, KillSwitch, PythonEngine, PythonEngineProvider};
use crate::packages::validate_package_list;
use crate::sync::SyncEngine;
use crate::types::{truncate_output, PythonOutcome};
use crate::vfs::VirtualFs;

/// One Python execution request.
#[derive(Debug)]
pub(crate) struct ExecuteRequest {
    pub code: String,
    pub packages: Vec<String>,
}

/// Messages the worker sends back to the supervisor.
pub(crate) enum WorkerEvent {
    Ready { kill: Arc<dyn KillSwitch> },
    InitFailed { error: String },
    Finished(PythonOutcome),
}

/// Supervisor-side handle to a running worker.
pub(crate) struct WorkerHandle {
    pub req_tx: mpsc::Sender<ExecuteRequest>,
    pub event_rx: mpsc::Receiver<WorkerEvent>,
    pub kill: Option<Arc<dyn KillSwitch>>,
}

/// Spawn a worker thread. The engine is created on the new thread (engines
/// are `Send` but not `Sync`); readiness arrives as the first event.
pub(crate) fn spawn_worker(
    provider: Arc<dyn PythonEngineProvider>,
    vfs: Arc<dyn VirtualFs>,
    sync: Arc<SyncEngine>,
    runtime: tokio::runtime::Handle,
) -> WorkerHandle {
    let (req_tx, req_rx) = mpsc::channel::<ExecuteRequest>(1);
    let (event_tx, event_rx) = mpsc::channel::<WorkerEvent>(4);

    // A failed thread spawn drops the event sender; the supervisor observes
    // a closed channel and reports the worker as unavailable.
    if let Err(e) = std::thread::Builder::new()
        .name("heimdall-py-worker".into())
        .spawn(move || worker_main(provider, vfs, sync, runtime, req_rx, event_tx))
    {
        tracing::error!("failed to spawn python worker thread: {}", e);
    }

    WorkerHandle {
        req_tx,
        event_rx,
        kill: None,
    }
}

fn worker_main(
    provider: Arc<dyn PythonEngineProvider>,
    vfs: Arc<dyn VirtualFs>,
    sync: Arc<SyncEngine>,
    runtime: tokio::runtime::Handle,
    mut req_rx: mpsc::Receiver<ExecuteRequest>,
    event_tx: mpsc::Sender<WorkerEvent>,
) {
    let mut engine = match init_engine(provider.as_ref(), &vfs) {
        Ok(engine) => engine,
        Err(e) => {
            let _ = event_tx.blocking_send(WorkerEvent::InitFailed {
                error: e.to_string(),
            });
            return;
        }
    };

    let kill = engine.kill_switch();
    if event_tx.blocking_send(WorkerEvent::Ready { kill }).is_err() {
        return;
    }

    while let Some(request) = req_rx.blocking_recv() {
        let outcome = handle_request(engine.as_mut(), &sync, &runtime, request);
        if event_tx.blocking_send(WorkerEvent::Finished(outcome)).is_err() {
            // Supervisor gave up on us (timeout kill or shutdown).
            break;
        }
    }
    tracing::debug!("python worker thread exiting");
}

/// Build and bootstrap the engine: mount the workspace, load the installer
/// (best effort), put the workspace on the import path.
fn init_engine(
    provider: &dyn PythonEngineProvider,
    vfs: &Arc<dyn VirtualFs>,
) -> Result<Box<dyn PythonEngine>, EngineError> {
    let mut engine = provider.create(vfs.clone())?;
    vfs.mkdir_tree(VROOT)
        .map_err(|e| EngineError::Init(e.to_string()))?;
    if let Err(e) = engine.load_installer() {
        tracing::warn!("package installer unavailable: {}", e);
    }
    let bootstrap = format!(
        "import sys\nsys.path.insert(0, {})\n",
        py_str_literal(VROOT)
    );
    engine.run_sync(&bootstrap)?;
    Ok(engine)
}

/// The per-request pipeline: sync in, install, capture, execute, sync out.
/// Sync-to-host runs on success *and* failure — user code may have written
/// files before raising.
fn handle_request(
    engine: &mut dyn PythonEngine,
    sync: &SyncEngine,
    runtime: &tokio::runtime::Handle,
    request: ExecuteRequest,
) -> PythonOutcome {
    if request.code.len() > MAX_CODE_SIZE_BYTES {
        return PythonOutcome::failure(format!(
            "Code too large: {} bytes (max {})",
            request.code.len(),
            MAX_CODE_SIZE_BYTES
        ));
    }
    if request.code.contains('\0') {
        return PythonOutcome::failure("Code cannot contain null bytes");
    }
    if let Err(e) = validate_package_list(&request.packages) {
        return PythonOutcome::failure(e);
    }

    let stats = runtime.block_on(sync.host_to_virtual());
    tracing::debug!(files = stats.files, skipped = stats.skipped, "synced host to virtual");

    for spec in &request.packages {
        if let Err(e) = engine.install_package(spec) {
            tracing::warn!("package install failed for {}: {}", spec, e);
        }
    }

    engine.begin_capture();
    let chdir = format!("import os\nos.chdir({})\n", py_str_literal(VROOT));
    if let Err(e) = engine.run_sync(&chdir) {
        tracing::warn!("chdir to virtual workspace failed: {}", e);
    }
    if let Err(e) = engine.autoload_packages(&request.code) {
        tracing::warn!("package autoload failed: {}", e);
    }

    let run_result = engine.run(&request.code);

    let stats = runtime.block_on(sync.virtual_to_host());
    tracing::debug!(files = stats.files, skipped = stats.skipped, "synced virtual to host");

    let output = engine.take_output();
    let stdout = truncate_output(output.stdout, MAX_OUTPUT_BYTES);
    let stderr = truncate_output(output.stderr, MAX_OUTPUT_BYTES);
    match run_result {
        Ok(result) => PythonOutcome {
            success: true,
            stdout,
            stderr,
            result,
            error: None,
        },
        Err(e) => PythonOutcome {
            success: false,
            stdout,
            stderr,
            result: None,
            error: Some(e.to_string()),
        },
    }
}

/// Embed a host-controlled string as a single-quoted Python literal.
///
/// Only `\` and `'` need escaping inside single quotes; everything else is
/// taken verbatim. Never interpolate an unescaped value into code issued to
/// the engine.
fn py_str_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

// ============================================================================
// Tests
// ============================================================================
