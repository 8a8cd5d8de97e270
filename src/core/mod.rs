//! The core module of the pipeline.
//!
//! This module contains the fundamental components shared by every model:
//! - Configuration of ONNX Runtime sessions
//! - Error handling
//! - Inference engine integration

pub mod config;
pub mod errors;
pub mod inference;

pub use config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
pub use errors::{OCRError, OcrResult, ProcessingStage};
pub use inference::{OrtInfer, TensorInput, TensorOutput, load_session};

/// A batch of images as a 4D tensor `[batch, channels, height, width]`.
pub type Tensor4D = ndarray::Array4<f32>;
