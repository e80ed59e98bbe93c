//! Core library for on-device watermark removal.
//!
//! Everything needed to turn an input image into an inpainted PNG data URL:
//! capability probing, runtime configuration, image decode/encode, tensor
//! layout conversion, the cached ONNX Runtime session, and the pipeline
//! that strings them together.

pub mod capability;
pub mod config;
pub mod detect;
pub mod error;
pub mod image_io;
pub mod infer;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod runtime;
pub mod session;
pub mod tensor;

pub use capability::{Capabilities, RuntimeEnv};
pub use error::{Error, Result};
pub use pipeline::{Inpainter, Stage};
pub use session::ExecutionBackend;
