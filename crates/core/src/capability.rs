//! Hardware capability probing and runtime environment configuration.
//!
//! [`Capabilities`] describes what the host can do (GPU compute, multiple
//! threads, SIMD); [`RuntimeEnv::from_capabilities`] deterministically maps
//! that descriptor onto the execution parameters the session builder uses.
//! The mapping is pure and idempotent — it may run once per cold start,
//! before any session exists.

use ort::execution_providers::{ExecutionProvider, WebGPUExecutionProvider};
use tracing::debug;

use crate::session::ExecutionBackend;

/// Thread count used when multi-threading is supported but hardware
/// concurrency cannot be detected.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Immutable capability descriptor, produced by [`probe`] (or supplied by
/// the caller) and consumed once to configure the runtime environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub webgpu: bool,
    pub threads: bool,
    pub simd: bool,
}

/// Probe the host for GPU compute, multi-threading, and SIMD support.
pub fn probe() -> Capabilities {
    let webgpu = WebGPUExecutionProvider::default()
        .is_available()
        .unwrap_or(false);
    let threads = std::thread::available_parallelism()
        .map(|n| n.get() > 1)
        .unwrap_or(false);
    let simd = detect_simd();

    let capabilities = Capabilities {
        webgpu,
        threads,
        simd,
    };
    debug!(?capabilities, "Probed hardware capabilities");
    capabilities
}

#[cfg(target_arch = "x86_64")]
fn detect_simd() -> bool {
    std::arch::is_x86_feature_detected!("sse4.1")
}

#[cfg(target_arch = "aarch64")]
fn detect_simd() -> bool {
    // NEON is baseline on aarch64.
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn detect_simd() -> bool {
    false
}

/// Resolved execution environment for session construction.
///
/// The GPU path does not need CPU threading, so its fallback thread count is
/// pinned to 1. On the CPU path, compute is always dispatched off the
/// caller's async thread (`offload_compute`) so a long forward pass cannot
/// stall the cooperative scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeEnv {
    pub backend: ExecutionBackend,
    pub thread_count: usize,
    pub parallel_execution: bool,
    pub offload_compute: bool,
}

impl RuntimeEnv {
    /// Map a capability descriptor onto execution parameters, using the
    /// host's detected hardware concurrency.
    pub fn from_capabilities(capabilities: &Capabilities) -> Self {
        let detected = std::thread::available_parallelism().ok().map(|n| n.get());
        Self::from_capabilities_with(capabilities, detected)
    }

    /// Same mapping with an explicit concurrency value; `None` means the
    /// host could not report one.
    pub fn from_capabilities_with(
        capabilities: &Capabilities,
        detected_concurrency: Option<usize>,
    ) -> Self {
        if capabilities.webgpu {
            return Self {
                backend: ExecutionBackend::WebGpu,
                thread_count: 1,
                parallel_execution: false,
                offload_compute: false,
            };
        }

        let thread_count = if capabilities.threads {
            detected_concurrency.unwrap_or(DEFAULT_THREAD_COUNT)
        } else {
            1
        };

        Self {
            backend: ExecutionBackend::Cpu,
            thread_count,
            parallel_execution: capabilities.simd,
            offload_compute: true,
        }
    }

    /// Force a specific backend, keeping the rest of the environment.
    pub fn with_backend(mut self, backend: ExecutionBackend) -> Self {
        self.backend = backend;
        self
    }
}
