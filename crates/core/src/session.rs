//! Inference session construction and the process-wide session cache.
//!
//! Provides [`ExecutionBackend`] and [`InpaintSession`], plus the
//! single-flight cell that guarantees at-most-once session construction:
//! concurrent first callers await the same in-flight build instead of racing
//! to create duplicate sessions.

use std::sync::{Arc, Mutex};

use ort::{
    execution_providers::{CPUExecutionProvider, ExecutionProvider, WebGPUExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::capability::RuntimeEnv;
use crate::error::{Error, Result};

/// Execution backend selection: GPU compute via the WebGPU EP, or the CPU
/// fallback with configurable threading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionBackend {
    WebGpu,
    #[default]
    Cpu,
}

impl ExecutionBackend {
    /// Parse from string (case-insensitive). Returns `Cpu` for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "webgpu" | "gpu" => Self::WebGpu,
            _ => Self::Cpu,
        }
    }
}

impl std::fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebGpu => write!(f, "webgpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// A loaded inpainting model bound to an execution backend.
///
/// The model contract is fixed: two float32 inputs (image and mask) and one
/// float32 output, with the actual names read from the session's declared
/// signature.
pub struct InpaintSession {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_name: String,
    backend: ExecutionBackend,
}

impl InpaintSession {
    /// Build a session from in-memory model weights with the environment's
    /// backend and thread settings.
    pub fn from_bytes(model_bytes: &[u8], env: &RuntimeEnv) -> Result<Self> {
        let builder = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(env.thread_count))
            .and_then(|b| b.with_parallel_execution(env.parallel_execution))
            .map_err(|e| Error::session_init(format!("session builder: {e}")))?;

        debug!(
            backend = %env.backend,
            threads = env.thread_count,
            parallel = env.parallel_execution,
            "Building inference session"
        );

        let session = match env.backend {
            ExecutionBackend::WebGpu => {
                let webgpu = WebGPUExecutionProvider::default();
                if !webgpu.is_available().unwrap_or(false) {
                    warn!("WebGPU EP is not available — inference will fall back to CPU");
                }
                builder
                    .with_execution_providers([webgpu.build()])
                    .and_then(|b| b.commit_from_memory(model_bytes))
            }
            ExecutionBackend::Cpu => builder
                .with_execution_providers([CPUExecutionProvider::default().build()])
                .and_then(|b| b.commit_from_memory(model_bytes)),
        }
        .map_err(|e| Error::session_init(format!("backend rejected model: {e}")))?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|input| input.name().to_string())
            .collect();
        if input_names.len() < 2 {
            return Err(Error::session_init(format!(
                "model declares {} input(s); expected image and mask inputs",
                input_names.len()
            )));
        }

        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| Error::session_init("model declares no outputs"))?;

        info!(
            backend = %env.backend,
            inputs = ?input_names,
            output = %output_name,
            "Inference session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_name,
            backend: env.backend,
        })
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A lazily-initialized cell with single-flight construction semantics.
///
/// Concurrent callers arriving before the first initialization completes
/// await the same in-flight future; at most one construction may ever
/// complete. A failed initialization leaves the cell empty so a later call
/// can retry.
pub struct SingleFlight<T> {
    cell: OnceCell<T>,
}

impl<T: Clone> SingleFlight<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        self.cell.get_or_try_init(init).await.cloned()
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

static SESSION: SingleFlight<Arc<InpaintSession>> = SingleFlight::new();

/// Return the process-wide session, constructing it on first use.
///
/// `fetch_model_bytes` runs on a blocking thread; it is only invoked when no
/// session exists yet. Subsequent calls reuse the cached session without
/// re-fetching weights or reconfiguring the environment.
pub async fn cached_session<F>(env: RuntimeEnv, fetch_model_bytes: F) -> Result<Arc<InpaintSession>>
where
    F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
{
    SESSION
        .get_or_try_init(|| async move {
            let session = tokio::task::spawn_blocking(move || {
                let bytes = fetch_model_bytes()?;
                InpaintSession::from_bytes(&bytes, &env).map(Arc::new)
            })
            .await
            .map_err(|e| Error::session_init(format!("session build task failed: {e}")))??;
            Ok(session)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backend_from_str_lossy() {
        assert_eq!(
            ExecutionBackend::from_str_lossy("webgpu"),
            ExecutionBackend::WebGpu
        );
        assert_eq!(
            ExecutionBackend::from_str_lossy("WebGPU"),
            ExecutionBackend::WebGpu
        );
        assert_eq!(
            ExecutionBackend::from_str_lossy("gpu"),
            ExecutionBackend::WebGpu
        );
        assert_eq!(ExecutionBackend::from_str_lossy("cpu"), ExecutionBackend::Cpu);
        assert_eq!(
            ExecutionBackend::from_str_lossy("unknown"),
            ExecutionBackend::Cpu
        );
        assert_eq!(ExecutionBackend::from_str_lossy(""), ExecutionBackend::Cpu);
    }

    #[test]
    fn backend_default_and_display() {
        assert_eq!(ExecutionBackend::default(), ExecutionBackend::Cpu);
        assert_eq!(ExecutionBackend::WebGpu.to_string(), "webgpu");
        assert_eq!(ExecutionBackend::Cpu.to_string(), "cpu");
    }

    #[tokio::test]
    async fn single_flight_constructs_once_across_concurrent_callers() {
        let cell = Arc::new(SingleFlight::<u64>::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cell = Arc::clone(&cell);
            let constructions = Arc::clone(&constructions);
            handles.push(tokio::spawn(async move {
                cell.get_or_try_init(|| async {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok::<u64, Error>(42)
                })
                .await
            }));
        }

        for handle in handles {
            let value = handle.await.expect("task join").expect("init");
            assert_eq!(value, 42);
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get(), Some(&42));
    }

    #[tokio::test]
    async fn single_flight_failed_init_leaves_cell_empty() {
        let cell = SingleFlight::<u64>::new();

        let first = cell
            .get_or_try_init(|| async { Err::<u64, Error>(Error::session_init("weights missing")) })
            .await;
        assert!(first.is_err());
        assert!(cell.get().is_none());

        let second = cell
            .get_or_try_init(|| async { Ok::<u64, Error>(7) })
            .await;
        assert_eq!(second.expect("retry succeeds"), 7);
    }
}
