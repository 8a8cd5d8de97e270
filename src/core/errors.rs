//! Core error types for the document vision pipeline.
//!
//! Every fallible operation in the library returns [`OcrResult`]. The HTTP layer
//! inspects the variant to choose a status code, so variants describe *what* went
//! wrong (bad input vs. broken model) rather than where.

use thiserror::Error;

/// Enum representing different stages of processing in the pipeline.
///
/// Used to identify which stage an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during image normalization.
    Normalization,
    /// Error occurred during image resizing.
    Resize,
    /// Error occurred while cropping or warping image regions.
    ImageProcessing,
    /// Error occurred during post-processing of model outputs.
    PostProcessing,
    /// Error occurred while chaining pipeline stages.
    PipelineExecution,
    /// Error occurred while drawing a visualization.
    Visualization,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::ImageProcessing => write!(f, "image processing"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::PipelineExecution => write!(f, "pipeline execution"),
            ProcessingStage::Visualization => write!(f, "visualization"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Errors that can occur anywhere in the pipeline.
#[derive(Error, Debug)]
pub enum OCRError {
    /// The uploaded bytes could not be decoded as an image.
    #[error("image load: {0}")]
    ImageLoad(#[source] image::ImageError),

    /// The uploaded bytes could not be opened or rendered as a PDF.
    #[error("pdf: {message}")]
    Pdf {
        /// A message describing the failure.
        message: String,
    },

    /// A 1-based page number outside the document.
    #[error("page {page} is out of range for a document with {page_count} page(s)")]
    PageOutOfRange {
        /// The requested 1-based page number.
        page: usize,
        /// The number of pages in the document.
        page_count: usize,
    },

    /// A language that is neither a known code nor a known language name.
    #[error("unsupported language '{language}'")]
    UnsupportedLanguage {
        /// The value supplied by the caller.
        language: String,
    },

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during model inference with detailed context.
    #[error("model '{model_name}' inference failed: {operation} with input shape {input_shape:?}: {context}")]
    ModelInference {
        /// The name of the model where inference failed.
        model_name: String,
        /// The operation that failed (e.g., "forward_pass", "output_extraction").
        operation: String,
        /// The primary input tensor shape.
        input_shape: Vec<usize>,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// A model produced a tensor with an unexpected shape.
    #[error("tensor operation '{operation}' failed: expected {expected}, got shape {actual_shape:?}")]
    TensorShape {
        /// The operation that inspected the tensor.
        operation: String,
        /// Description of the expected shape.
        expected: String,
        /// The shape actually produced.
        actual_shape: Vec<i64>,
    },

    /// Error from basic tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// Error loading a model file, with context and suggestions.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the model that failed to load
        model_path: String,
        /// Short reason string
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present)
        suggestion: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result alias used across the crate.
pub type OcrResult<T> = Result<T, OCRError>;

impl From<image::ImageError> for OCRError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl OCRError {
    /// Shorthand for [`OCRError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for [`OCRError::Pdf`].
    pub fn pdf(message: impl Into<String>) -> Self {
        Self::Pdf {
            message: message.into(),
        }
    }

    /// Creates a configuration error with context and details.
    ///
    /// ```rust
    /// # use oar_docserve::core::OCRError;
    /// let err = OCRError::config_error_detailed("layout labels", "label set 'foo' is unknown");
    /// assert!(matches!(err, OCRError::ConfigError { .. }));
    /// ```
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates a model load error for `path`.
    pub fn model_load_error(
        path: &std::path::Path,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<ort::Error>,
    ) -> Self {
        Self::ModelLoad {
            model_path: path.display().to_string(),
            reason: reason.into(),
            suggestion: suggestion.map(|s| format!("; {s}")).unwrap_or_default(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// Wraps an error raised while running a model.
    pub fn model_inference_error(
        model_name: &str,
        operation: &str,
        input_shape: &[usize],
        context: &str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelInference {
            model_name: model_name.to_string(),
            operation: operation.to_string(),
            input_shape: input_shape.to_vec(),
            context: context.to_string(),
            source: Box::new(source),
        }
    }

    /// Wraps an error raised by a processing step.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an image processing error from a message alone.
    pub fn image_processing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Processing {
            kind: ProcessingStage::ImageProcessing,
            context: message.clone(),
            source: message.into(),
        }
    }

    /// Creates an error for a model output that does not have the expected layout.
    pub fn tensor_shape(operation: &str, expected: &str, actual_shape: &[i64]) -> Self {
        Self::TensorShape {
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual_shape: actual_shape.to_vec(),
        }
    }

    /// Returns true when the error was caused by the caller's input rather than
    /// by the service or its models.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OCRError::ImageLoad(_)
                | OCRError::Pdf { .. }
                | OCRError::PageOutOfRange { .. }
                | OCRError::UnsupportedLanguage { .. }
                | OCRError::InvalidInput { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_classified() {
        assert!(OCRError::invalid_input("empty upload").is_client_error());
        assert!(
            OCRError::PageOutOfRange {
                page: 3,
                page_count: 2
            }
            .is_client_error()
        );
        assert!(!OCRError::config_error_detailed("models", "missing").is_client_error());
    }

    #[test]
    fn test_model_load_error_formats_suggestion() {
        let err = OCRError::model_load_error(
            std::path::Path::new("models/det.onnx"),
            "file not found",
            Some("check --det-model"),
            None,
        );
        assert_eq!(
            err.to_string(),
            "model load failed for 'models/det.onnx': file not found; check --det-model"
        );
    }

    #[test]
    fn test_page_out_of_range_message() {
        let err = OCRError::PageOutOfRange {
            page: 4,
            page_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "page 4 is out of range for a document with 3 page(s)"
        );
    }
}
