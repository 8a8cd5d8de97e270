//! # oar-docserve
//!
//! Document vision over ONNX Runtime: text detection, OCR, layout analysis and
//! reading order, served over HTTP or run from the command line.
//!
//! ## Modules
//!
//! * [`core`] - Errors, ONNX Runtime session configuration and inference
//! * [`processors`] - Pre- and post-processing around the models
//! * [`models`] - ONNX-backed detector, recognizer, layout and reading-order models
//! * [`pipeline`] - Model roles, loading and the four inference stages
//! * [`domain`] - Result types and language resolution
//! * [`pdf`] - PDF page rendering
//! * [`server`] - The axum HTTP surface
//! * [`utils`] - Logging setup, image decoding, cropping and visualization
//!
//! ## Example
//!
//! ```rust,no_run
//! use oar_docserve::pipeline::{ModelConfig, load_models, ocr};
//! use oar_docserve::utils::load_image_from_bytes;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ModelConfig::new(
//!     "models/det.onnx",
//!     "models/rec.onnx",
//!     "models/dict.txt",
//!     "models/layout.onnx",
//!     "models/order.onnx",
//! );
//! let models = load_models(&config)?;
//! let image = load_image_from_bytes(&std::fs::read("page.png")?)?;
//! let langs = vec!["en".to_string()];
//! let (_rendered, result) = ocr(&image, &langs, models.det.as_ref(), models.rec.as_ref())?;
//! for line in result.text_lines {
//!     println!("{}", line.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod processors;
pub mod server;
pub mod utils;
