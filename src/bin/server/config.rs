//! Model options shared by the `serve` and `run` subcommands.

use clap::Args;
use oar_docserve::core::{OcrResult, OrtSessionConfig};
use oar_docserve::models::LayoutLabels;
use oar_docserve::pipeline::ModelConfig;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to the text detection model
    #[arg(long = "det-model", env = "OAR_DET_MODEL")]
    pub det_model: PathBuf,

    /// Path to the text recognition model
    #[arg(long = "rec-model", env = "OAR_REC_MODEL")]
    pub rec_model: PathBuf,

    /// Path to the character dictionary
    #[arg(long = "dict-path", env = "OAR_DICT_PATH")]
    pub dict_path: PathBuf,

    /// Path to the layout detection model
    #[arg(long = "layout-model", env = "OAR_LAYOUT_MODEL")]
    pub layout_model: PathBuf,

    /// Path to the reading order model
    #[arg(long = "order-model", env = "OAR_ORDER_MODEL")]
    pub order_model: PathBuf,

    /// Layout label set: pp-doclayout, cdla, publaynet, a comma-separated
    /// list, or a file with one label per line
    #[arg(long = "layout-labels", default_value = "pp-doclayout", env = "OAR_LAYOUT_LABELS")]
    pub layout_labels: String,

    /// Device to use (cpu, cuda, cuda:0, etc.)
    #[arg(long, default_value = "cpu", env = "OAR_DEVICE")]
    pub device: String,

    /// ONNX sessions per model, for concurrent requests
    #[arg(long = "sessions-per-model", default_value_t = 1, env = "OAR_SESSIONS_PER_MODEL")]
    pub sessions_per_model: usize,
}

impl ModelArgs {
    pub fn to_model_config(&self) -> OcrResult<ModelConfig> {
        let mut config = ModelConfig::new(
            &self.det_model,
            &self.rec_model,
            &self.dict_path,
            &self.layout_model,
            &self.order_model,
        );
        config.ort_config = OrtSessionConfig::from_device(&self.device)?;
        config.sessions_per_model = self.sessions_per_model.max(1);

        let labels_path = PathBuf::from(&self.layout_labels);
        config.layout.labels = if labels_path.is_file() {
            LayoutLabels::from_file(&labels_path)?
        } else {
            self.layout_labels.parse()?
        };
        Ok(config)
    }
}
