//! Top-level inpainting pipeline.
//!
//! One call runs, in order: session acquisition (single-flight, first call
//! only) → image decode → forward tensor conversion → mask preparation →
//! forward pass → inverse conversion → materialization. Each stage consumes
//! the prior stage's output; no reordering. Cancellation is honored at every
//! suspension point, and stage boundaries are reported through an optional
//! progress callback.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::capability::{Capabilities, RuntimeEnv};
use crate::detect::RegionDetector;
use crate::error::{Error, Result};
use crate::image_io::{self, ImageSource};
use crate::models::ModelRegistry;
use crate::session;
use crate::{infer, tensor};

/// Pipeline stage boundaries, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    SessionReady,
    DecodeComplete,
    InferenceComplete,
    MaterializeComplete,
}

impl Stage {
    /// Completed fraction of the pipeline at this boundary.
    pub fn fraction(self) -> f32 {
        match self {
            Self::SessionReady => 0.25,
            Self::DecodeComplete => 0.5,
            Self::InferenceComplete => 0.75,
            Self::MaterializeComplete => 1.0,
        }
    }
}

/// Progress callback invoked at each completed stage boundary.
pub type ProgressFn = dyn Fn(Stage) + Send + Sync;

/// The inpainting pipeline entry point.
///
/// Construct once and reuse; the underlying inference session is
/// process-wide and built exactly once regardless of how many `Inpainter`
/// values exist.
pub struct Inpainter {
    registry: ModelRegistry,
    detector: Arc<dyn RegionDetector>,
    env: RuntimeEnv,
    model: String,
}

impl Inpainter {
    pub fn new(
        registry: ModelRegistry,
        detector: Arc<dyn RegionDetector>,
        capabilities: &Capabilities,
        model: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            detector,
            env: RuntimeEnv::from_capabilities(capabilities),
            model: model.into(),
        }
    }

    /// Replace the capability-derived environment, e.g. to force a backend.
    pub fn with_env(mut self, env: RuntimeEnv) -> Self {
        self.env = env;
        self
    }

    pub fn env(&self) -> RuntimeEnv {
        self.env
    }

    /// Run the full pipeline, returning the result as a PNG data URL.
    pub async fn run(&self, source: ImageSource) -> Result<String> {
        self.run_with(source, None, CancellationToken::new()).await
    }

    /// Run the full pipeline with progress reporting and cancellation.
    pub async fn run_with(
        &self,
        source: ImageSource,
        progress: Option<&ProgressFn>,
        cancel: CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let report = |stage: Stage| {
            debug!(?stage, fraction = stage.fraction(), "Pipeline stage complete");
            if let Some(callback) = progress {
                callback(stage);
            }
        };

        let env = self.env;
        let registry = self.registry.clone();
        let model = self.model.clone();
        let session = cancellable(
            &cancel,
            session::cached_session(env, move || registry.load_bytes(&model)),
        )
        .await?;
        report(Stage::SessionReady);

        let image = cancellable(&cancel, image_io::load(source)).await?;
        report(Stage::DecodeComplete);

        let image_tensor = tensor::to_chw(&image)?;
        let mask = self.detector.prepare_mask(&image)?;

        let output = cancellable(
            &cancel,
            infer::run(
                Arc::clone(&session),
                image_tensor,
                mask,
                env.offload_compute,
            ),
        )
        .await?;
        report(Stage::InferenceComplete);

        let rgba = tensor::to_rgba(&output, image.width, image.height)?;
        let encoded = image_io::to_data_url(&rgba, image.width, image.height)?;
        report(Stage::MaterializeComplete);

        info!(
            width = image.width,
            height = image.height,
            backend = %session.backend(),
            "Inpainting complete"
        );
        Ok(encoded)
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
