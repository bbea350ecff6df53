//! Python worker lifecycle and the wall-clock timeout guarantee.
//!
//! The supervisor lazily spawns the worker, serializes execute requests,
//! and resolves each request on the first of: worker result, worker exit,
//! or timer expiry. On expiry it fires the engine kill switch and abandons
//! the worker — cooperative interruption is not sufficient for code stuck
//! in a blocking call, so killing the execution context is the only
//! mechanism that meets the liveness guarantee. A failed execution (user
//! exception) does not invalidate the worker; only timeout or crash does.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{SandboxConfig, WORKER_INIT_TIMEOUT_MS};
use crate::engine::PythonEngineProvider;
use crate::error::SandboxError;
use crate::sync::SyncEngine;
use crate::types::PythonOutcome;
use crate::vfs::VirtualFs;
use crate::worker::{spawn_worker, ExecuteRequest, WorkerEvent, WorkerHandle};

pub struct PySupervisor {
    config: Arc<SandboxConfig>,
    provider: Arc<dyn PythonEngineProvider>,
    vfs: Arc<dyn VirtualFs>,
    sync: Arc<SyncEngine>,
    worker: Option<WorkerHandle>,
}

impl PySupervisor {
    pub fn new(
        config: Arc<SandboxConfig>,
        provider: Arc<dyn PythonEngineProvider>,
        vfs: Arc<dyn VirtualFs>,
        sync: Arc<SyncEngine>,
    ) -> Self {
        Self {
            config,
            provider,
            vfs,
            sync,
            worker: None,
        }
    }

    /// Whether a worker is currently alive and ready.
    pub fn worker_alive(&self) -> bool {
        self.worker.is_some()
    }

    /// Execute one Python request. Always returns an outcome; failures are
    /// carried in the payload.
    pub async fn execute(&mut self, code: &str, packages: &[String]) -> PythonOutcome {
        if self.worker.is_none() {
            if let Err(message) = self.start_worker().await {
                return PythonOutcome::failure(
                    SandboxError::WorkerUnavailable(message).to_string(),
                );
            }
        }
        // The handle leaves `self` for the duration of the request; it only
        // comes back on a clean result, so every failure path below leaves
        // the supervisor ready to spawn afresh.
        let mut worker = self
            .worker
            .take()
            .expect("worker present after successful start");

        let request = ExecuteRequest {
            code: code.to_owned(),
            packages: packages.to_vec(),
        };
        if worker.req_tx.send(request).await.is_err() {
            return PythonOutcome::failure(
                SandboxError::WorkerUnavailable("worker exited before accepting the request".into())
                    .to_string(),
            );
        }

        let timeout_ms = self.config.py_timeout_ms;
        let deadline = (timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms));

        loop {
            let event = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, worker.event_rx.recv()).await {
                        Ok(event) => event,
                        Err(_) => {
                            // Hard timeout: abort the engine and abandon the
                            // worker. The caller gets a response now; the
                            // next request starts a fresh worker.
                            if let Some(kill) = worker.kill.as_ref() {
                                kill.kill();
                            }
                            tracing::warn!(
                                timeout_ms,
                                "python execution timed out, worker killed"
                            );
                            return PythonOutcome::failure(
                                SandboxError::Timeout(timeout_ms).to_string(),
                            );
                        }
                    }
                }
                None => worker.event_rx.recv().await,
            };

            match event {
                Some(WorkerEvent::Finished(outcome)) => {
                    self.worker = Some(worker);
                    return outcome;
                }
                Some(WorkerEvent::Ready { kill }) => {
                    // Late or duplicate readiness; keep the newest handle.
                    worker.kill = Some(kill);
                }
                Some(WorkerEvent::InitFailed { error }) => {
                    return PythonOutcome::failure(
                        SandboxError::WorkerUnavailable(error).to_string(),
                    );
                }
                None => {
                    tracing::warn!("python worker exited mid-request");
                    return PythonOutcome::failure(
                        SandboxError::WorkerUnavailable("worker exited unexpectedly".into())
                            .to_string(),
                    );
                }
            }
        }
    }

    /// Spawn a worker and wait (bounded) for its readiness signal.
    async fn start_worker(&mut self) -> Result<(), String> {
        tracing::info!("starting python worker");
        let mut handle = spawn_worker(
            self.provider.clone(),
            self.vfs.clone(),
            self.sync.clone(),
            tokio::runtime::Handle::current(),
        );
        let init = tokio::time::timeout(
            Duration::from_millis(WORKER_INIT_TIMEOUT_MS),
            handle.event_rx.recv(),
        )
        .await;
        match init {
            Ok(Some(WorkerEvent::Ready { kill })) => {
                handle.kill = Some(kill);
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Some(WorkerEvent::InitFailed { error })) => {
                Err(format!("initialization failed: {error}"))
            }
            Ok(Some(WorkerEvent::Finished(_))) => {
                Err("worker produced a result before becoming ready".into())
            }
            Ok(None) => Err("worker exited during initialization".into()),
            Err(_) => Err(format!(
                "initialization timed out after {WORKER_INIT_TIMEOUT_MS} ms"
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
