//! ONNX-backed implementations of the four model roles.
//!
//! Each model bundles its inference session with the pre- and post-processing
//! it was exported with, and implements the matching trait from
//! [`crate::pipeline`].

pub mod detection;
pub mod ordering;
pub mod recognition;

pub use detection::{DBConfig, DBModel, LayoutLabels, LayoutModel, LayoutModelConfig};
pub use ordering::{LayoutReaderConfig, LayoutReaderModel};
pub use recognition::{CRNNConfig, CRNNModel};
