//! Loading the four model/processor pairs from checkpoints.
//!
//! Models are loaded once at startup and handed to the stages as shared,
//! immutable trait objects.

use crate::core::{OCRError, OcrResult, OrtInfer, OrtSessionConfig};
use crate::models::{
    CRNNConfig, CRNNModel, DBConfig, DBModel, LayoutModel, LayoutModelConfig, LayoutReaderConfig,
    LayoutReaderModel,
};
use crate::pipeline::{LayoutDetect, ReadingOrder, TextDetect, TextRecognize};
use crate::processors::CTCLabelDecode;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Checkpoint paths and per-model settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub det_model: PathBuf,
    /// Detector trained to also find formulas. Used only when `math` is set.
    pub det_math_model: Option<PathBuf>,
    pub math: bool,
    pub rec_model: PathBuf,
    pub dict_path: PathBuf,
    pub layout_model: PathBuf,
    pub order_model: PathBuf,

    pub det: DBConfig,
    pub rec: CRNNConfig,
    pub layout: LayoutModelConfig,
    pub order: LayoutReaderConfig,

    pub ort_config: Option<OrtSessionConfig>,
    /// Sessions per model, for concurrent requests.
    pub sessions_per_model: usize,
}

impl ModelConfig {
    pub fn new(
        det_model: impl Into<PathBuf>,
        rec_model: impl Into<PathBuf>,
        dict_path: impl Into<PathBuf>,
        layout_model: impl Into<PathBuf>,
        order_model: impl Into<PathBuf>,
    ) -> Self {
        Self {
            det_model: det_model.into(),
            det_math_model: None,
            // The service never enables the math detector.
            math: false,
            rec_model: rec_model.into(),
            dict_path: dict_path.into(),
            layout_model: layout_model.into(),
            order_model: order_model.into(),
            det: DBConfig::default(),
            rec: CRNNConfig::default(),
            layout: LayoutModelConfig::default(),
            order: LayoutReaderConfig::default(),
            ort_config: None,
            sessions_per_model: 1,
        }
    }

    /// The detector checkpoint to load.
    ///
    /// # Errors
    ///
    /// Fails when `math` is set without a math checkpoint.
    pub fn detector_checkpoint(&self) -> OcrResult<&Path> {
        if !self.math {
            return Ok(&self.det_model);
        }
        self.det_math_model.as_deref().ok_or_else(|| {
            OCRError::config_error_detailed(
                "text detector",
                "math detection requested but no math checkpoint is configured",
            )
        })
    }

    fn session(&self, path: &Path, name: &str) -> OcrResult<OrtInfer> {
        OrtInfer::from_file(path, name, self.ort_config.as_ref(), self.sessions_per_model)
    }
}

/// Loads the text detector.
pub fn load_det(config: &ModelConfig) -> OcrResult<DBModel> {
    let path = config.detector_checkpoint()?;
    info!("Loading text detector from {}", path.display());
    DBModel::new(config.session(path, "text_detection")?, config.det.clone())
}

/// Loads the text recognizer and its character dictionary.
pub fn load_rec(config: &ModelConfig) -> OcrResult<CRNNModel> {
    info!("Loading text recognizer from {}", config.rec_model.display());
    let decoder = CTCLabelDecode::from_file(&config.dict_path, config.rec.use_space_char)?;
    CRNNModel::new(
        config.session(&config.rec_model, "text_recognition")?,
        decoder,
        config.rec.clone(),
    )
}

/// Loads the layout model.
pub fn load_layout(config: &ModelConfig) -> OcrResult<LayoutModel> {
    info!("Loading layout model from {}", config.layout_model.display());
    let model = LayoutModel::new(
        config.session(&config.layout_model, "layout_detection")?,
        config.layout.clone(),
    )?;
    info!("Layout model labels: {}", model.labels().join(", "));
    Ok(model)
}

/// Loads the reading-order model.
pub fn load_order(config: &ModelConfig) -> OcrResult<LayoutReaderModel> {
    info!("Loading reading order model from {}", config.order_model.display());
    LayoutReaderModel::new(
        config.session(&config.order_model, "reading_order")?,
        config.order.clone(),
    )
}

/// The four model handles shared by every request.
#[derive(Clone)]
pub struct ModelRegistry {
    pub det: Arc<dyn TextDetect>,
    pub rec: Arc<dyn TextRecognize>,
    pub layout: Arc<dyn LayoutDetect>,
    pub order: Arc<dyn ReadingOrder>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry").finish_non_exhaustive()
    }
}

/// Loads all four models.
///
/// # Errors
///
/// The first model that fails to load aborts the whole load.
pub fn load_models(config: &ModelConfig) -> OcrResult<ModelRegistry> {
    let registry = ModelRegistry {
        det: Arc::new(load_det(config)?),
        rec: Arc::new(load_rec(config)?),
        layout: Arc::new(load_layout(config)?),
        order: Arc::new(load_order(config)?),
    };
    info!("All models loaded");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ModelConfig {
        ModelConfig::new("det.onnx", "rec.onnx", "dict.txt", "layout.onnx", "order.onnx")
    }

    #[test]
    fn test_standard_detector_is_selected_without_math() {
        let mut config = config();
        config.det_math_model = Some(PathBuf::from("det_math.onnx"));
        assert!(!config.math);
        assert_eq!(config.detector_checkpoint().unwrap(), Path::new("det.onnx"));
    }

    #[test]
    fn test_math_detector_is_selected_with_math() {
        let mut config = config();
        config.math = true;
        assert!(config.detector_checkpoint().is_err());
        config.det_math_model = Some(PathBuf::from("det_math.onnx"));
        assert_eq!(config.detector_checkpoint().unwrap(), Path::new("det_math.onnx"));
    }

    #[test]
    fn test_missing_checkpoint_names_the_file() {
        let err = load_det(&config()).unwrap_err();
        assert!(matches!(err, OCRError::ModelLoad { .. }));
        assert!(err.to_string().contains("det.onnx"));
    }

    #[test]
    fn test_missing_dictionary_fails_before_session() {
        let err = load_rec(&config()).unwrap_err();
        assert!(matches!(err, OCRError::ConfigError { .. }));
        assert!(err.to_string().contains("dict.txt"));
    }

    #[test]
    fn test_load_models_stops_at_first_failure() {
        assert!(load_models(&config()).is_err());
    }
}
