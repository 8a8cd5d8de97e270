//! ONNX Runtime integration.
//!
//! [`OrtInfer`] owns a small pool of sessions for one model file. Sessions need
//! exclusive access while running, so each one sits behind a `Mutex` and calls
//! are spread round-robin across the pool.

use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::OCRError;
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::TensorRef;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

const SESSION_CREATION_FAILURE: &str = "failed to create ONNX session";

/// Loads a session with default logging configuration.
pub fn load_session(model_path: impl AsRef<Path>) -> Result<Session, OCRError> {
    load_session_with(
        model_path,
        |builder| builder.with_log_level(LogLevel::Error),
        Some("verify model file exists and is readable"),
    )
}

/// Applies the thread counts, optimization level, log level and execution
/// providers of `cfg` to `builder`.
fn configure_session(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(threads) = cfg.intra_threads {
        builder = builder.with_intra_threads(threads)?;
    }
    if let Some(threads) = cfg.inter_threads {
        builder = builder.with_inter_threads(threads)?;
    }
    if let Some(level) = cfg.optimization_level {
        builder = builder.with_optimization_level(graph_level(level))?;
    }
    builder = builder.with_log_level(log_level(cfg.log_severity_level))?;

    let providers = execution_providers(cfg.execution_providers.as_deref().unwrap_or_default())?;
    if !providers.is_empty() {
        builder = builder.with_execution_providers(providers)?;
    }
    Ok(builder)
}

fn graph_level(level: OrtGraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
        OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
    }
}

/// Maps a 0 (verbose) to 4 (fatal) severity onto ONNX Runtime's log level.
/// Unset means errors only.
fn log_level(severity: Option<i32>) -> LogLevel {
    match severity {
        Some(i32::MIN..=0) => LogLevel::Verbose,
        Some(1) => LogLevel::Info,
        Some(2) => LogLevel::Warning,
        Some(3) | None => LogLevel::Error,
        Some(_) => LogLevel::Fatal,
    }
}

fn execution_providers(
    providers: &[OrtExecutionProvider],
) -> Result<Vec<ExecutionProviderDispatch>, ort::Error> {
    providers
        .iter()
        .map(|provider| match provider {
            OrtExecutionProvider::CPU => {
                Ok(ort::execution_providers::CPUExecutionProvider::default().build())
            }
            #[cfg(feature = "cuda")]
            OrtExecutionProvider::CUDA {
                device_id,
                gpu_mem_limit,
            } => {
                let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda = cuda.with_device_id(*id);
                }
                if let Some(limit) = gpu_mem_limit {
                    cuda = cuda.with_memory_limit(*limit);
                }
                Ok(cuda.build())
            }
            #[cfg(not(feature = "cuda"))]
            OrtExecutionProvider::CUDA { .. } => Err(ort::Error::new(
                "CUDA execution provider requested but the cuda feature is not enabled",
            )),
        })
        .collect()
}

/// Builds a session using a caller-provided builder configuration.
fn load_session_with<F>(
    model_path: impl AsRef<Path>,
    configure_builder: F,
    suggestion: Option<&str>,
) -> Result<Session, OCRError>
where
    F: FnOnce(SessionBuilder) -> Result<SessionBuilder, ort::Error>,
{
    let path = model_path.as_ref();
    let builder = Session::builder()?;
    let builder = configure_builder(builder)?;
    let session = builder.commit_from_file(path).map_err(|e| {
        OCRError::model_load_error(path, SESSION_CREATION_FAILURE, suggestion, Some(e))
    })?;
    Ok(session)
}

/// A named tensor passed to [`OrtInfer::infer`].
#[derive(Debug)]
pub enum TensorInput<'a> {
    /// A 2D f32 tensor (e.g., `scale_factor`, `im_shape`)
    Array2(&'a ndarray::Array2<f32>),
    /// A 4D f32 tensor (e.g., an image batch)
    Array4(&'a ndarray::Array4<f32>),
    /// A 2D i64 tensor (e.g., an attention mask)
    I64Array2(&'a ndarray::Array2<i64>),
    /// A 3D i64 tensor (e.g., quantized boxes)
    I64Array3(&'a ndarray::Array3<i64>),
}

impl TensorInput<'_> {
    fn shape(&self) -> Vec<usize> {
        match self {
            TensorInput::Array2(arr) => arr.shape().to_vec(),
            TensorInput::Array4(arr) => arr.shape().to_vec(),
            TensorInput::I64Array2(arr) => arr.shape().to_vec(),
            TensorInput::I64Array3(arr) => arr.shape().to_vec(),
        }
    }
}

/// A raw model output. Interpreting it is the caller's job.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorOutput {
    /// A float tensor.
    F32 {
        /// Tensor dimensions.
        shape: Vec<i64>,
        /// Row-major data.
        data: Vec<f32>,
    },
    /// An integer tensor (i32 outputs are widened).
    I64 {
        /// Tensor dimensions.
        shape: Vec<i64>,
        /// Row-major data.
        data: Vec<i64>,
    },
}

impl TensorOutput {
    /// Returns the tensor dimensions.
    pub fn shape(&self) -> &[i64] {
        match self {
            TensorOutput::F32 { shape, .. } | TensorOutput::I64 { shape, .. } => shape,
        }
    }

    /// Returns the data as f32, converting integer tensors.
    pub fn into_f32(self) -> (Vec<i64>, Vec<f32>) {
        match self {
            TensorOutput::F32 { shape, data } => (shape, data),
            TensorOutput::I64 { shape, data } => (shape, data.into_iter().map(|v| v as f32).collect()),
        }
    }
}

/// Inference engine for a single ONNX model.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_names: Vec<String>,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("input_names", &self.input_names)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Loads `pool_size` sessions of the model at `model_path`.
    pub fn from_file(
        model_path: impl AsRef<Path>,
        model_name: impl Into<String>,
        ort_config: Option<&OrtSessionConfig>,
        pool_size: usize,
    ) -> Result<Self, OCRError> {
        let path = model_path.as_ref();
        let model_name = model_name.into();

        if !path.exists() {
            return Err(OCRError::model_load_error(
                path,
                "file not found",
                Some("check the model path option"),
                None,
            ));
        }

        let pool_size = pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = match ort_config {
                Some(cfg) => load_session_with(
                    path,
                    |builder| configure_session(builder, cfg),
                    Some("check the ONNX Runtime session settings"),
                )?,
                None => load_session(path)?,
            };
            sessions.push(Mutex::new(session));
        }

        let input_names = sessions
            .first()
            .and_then(|s| s.lock().ok())
            .map(|s| s.inputs.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default();

        debug!(
            model = %model_name,
            path = %path.display(),
            sessions = pool_size,
            "Loaded ONNX model"
        );

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_names,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the declared input names, in model order.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Returns the name of the first declared input, falling back to `default`.
    pub fn primary_input_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.input_names.first().map(String::as_str).unwrap_or(default)
    }

    /// Runs the model with named inputs and returns every output.
    pub fn infer(
        &self,
        inputs: &[(&str, TensorInput)],
    ) -> Result<Vec<(String, TensorOutput)>, OCRError> {
        let Some((_, primary)) = inputs.first() else {
            return Err(OCRError::invalid_input("No inputs provided for inference"));
        };
        let input_shape = primary.shape();

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session_guard = self.sessions[idx].lock().map_err(|_| {
            OCRError::config_error_detailed(
                format!("model '{}'", self.model_name),
                format!("session {}/{} lock is poisoned", idx, self.sessions.len()),
            )
        })?;

        let output_names: Vec<String> = session_guard
            .outputs
            .iter()
            .map(|o| o.name.clone())
            .collect();

        let mut ort_values = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            let value: SessionInputValue<'_> = match tensor {
                TensorInput::Array2(arr) => TensorRef::from_array_view(arr.view())?.into(),
                TensorInput::Array4(arr) => TensorRef::from_array_view(arr.view())?.into(),
                TensorInput::I64Array2(arr) => TensorRef::from_array_view(arr.view())?.into(),
                TensorInput::I64Array3(arr) => TensorRef::from_array_view(arr.view())?.into(),
            };
            ort_values.push((Cow::Borrowed(*name), value));
        }

        let context = format!(
            "inputs: {}",
            inputs.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
        );
        let ort_inputs: SessionInputs<'_, '_, 0> = SessionInputs::ValueMap(ort_values);
        let outputs = session_guard.run(ort_inputs).map_err(|e| {
            OCRError::model_inference_error(&self.model_name, "forward_pass", &input_shape, &context, e)
        })?;

        let mut results = Vec::with_capacity(output_names.len());
        for name in &output_names {
            let value = &outputs[name.as_str()];
            let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                TensorOutput::F32 {
                    shape: shape.iter().copied().collect(),
                    data: data.to_vec(),
                }
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                TensorOutput::I64 {
                    shape: shape.iter().copied().collect(),
                    data: data.to_vec(),
                }
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
                TensorOutput::I64 {
                    shape: shape.iter().copied().collect(),
                    data: data.iter().map(|&v| v as i64).collect(),
                }
            } else {
                return Err(OCRError::tensor_shape(
                    &format!("extract output '{}' of model '{}'", name, self.model_name),
                    "an f32, i64 or i32 tensor",
                    &[],
                ));
            };
            results.push((name.clone(), tensor));
        }

        Ok(results)
    }

    /// Runs the model and returns its first output as f32.
    pub fn infer_first_f32(
        &self,
        inputs: &[(&str, TensorInput)],
    ) -> Result<(Vec<i64>, Vec<f32>), OCRError> {
        let mut outputs = self.infer(inputs)?;
        if outputs.is_empty() {
            return Err(OCRError::tensor_shape(
                &format!("read outputs of model '{}'", self.model_name),
                "at least one output",
                &[],
            ));
        }
        let (_, first) = outputs.swap_remove(0);
        Ok(first.into_f32())
    }
}
