//! Configuration management for the inference backends.
//!
//! Per-model processor settings live next to the models that use them; this
//! module holds the ONNX Runtime session settings shared by all of them.

pub mod onnx;

pub use onnx::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
