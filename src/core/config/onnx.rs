//! ONNX Runtime configuration types and utilities.

use crate::core::errors::OCRError;
use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    #[default]
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

/// Execution providers for ONNX Runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available)
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider
    CUDA {
        /// CUDA device ID (default: 0)
        device_id: Option<i32>,
        /// Memory limit in bytes (optional)
        gpu_mem_limit: Option<usize>,
    },
}

/// Configuration for ONNX Runtime sessions.
///
/// Every field is optional; unset fields keep the ONNX Runtime default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes
    pub inter_threads: Option<usize>,
    /// Graph optimization level
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Log severity level (0=Verbose, 1=Info, 2=Warning, 3=Error, 4=Fatal)
    pub log_severity_level: Option<i32>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the number of inter-op threads.
    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Replaces the execution providers.
    pub fn with_execution_providers(mut self, providers: Vec<OrtExecutionProvider>) -> Self {
        self.execution_providers = Some(providers);
        self
    }

    /// Sets the log severity level.
    pub fn with_log_severity_level(mut self, level: i32) -> Self {
        self.log_severity_level = Some(level);
        self
    }

    /// Builds a session config from a device string.
    ///
    /// Accepts `cpu`, `cuda` and `cuda:N`. Returns `None` for `cpu`, meaning the
    /// ONNX Runtime defaults are used unchanged.
    pub fn from_device(device: &str) -> Result<Option<Self>, OCRError> {
        let device_lower = device.trim().to_lowercase();

        if device_lower == "cpu" {
            return Ok(None);
        }

        if device_lower.starts_with("cuda") {
            let device_id = if device_lower == "cuda" {
                0
            } else if let Some(id_str) = device_lower.strip_prefix("cuda:") {
                id_str.parse::<i32>().map_err(|_| {
                    OCRError::config_error_detailed("device", format!("invalid CUDA device ID: {device}"))
                })?
            } else {
                return Err(OCRError::config_error_detailed(
                    "device",
                    format!("invalid device format: {device}. Expected 'cuda' or 'cuda:N'"),
                ));
            };

            if !cfg!(feature = "cuda") {
                return Err(OCRError::config_error_detailed(
                    "device",
                    format!("CUDA device '{device}' requested but the cuda feature is not enabled"),
                ));
            }

            return Ok(Some(Self::new().with_execution_providers(vec![
                OrtExecutionProvider::CUDA {
                    device_id: Some(device_id),
                    gpu_mem_limit: None,
                },
                OrtExecutionProvider::CPU,
            ])));
        }

        Err(OCRError::config_error_detailed(
            "device",
            format!("unsupported device: {device}"),
        ))
    }
}
