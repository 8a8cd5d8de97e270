//! Image pre-processing and model output post-processing.

pub mod db_postprocess;
pub mod decode;
pub mod geometry;
pub mod layout_postprocess;
pub mod normalization;
pub mod order_decode;
pub mod resize;
pub mod sorting;
pub mod types;

pub use db_postprocess::DBPostProcess;
pub use decode::CTCLabelDecode;
pub use geometry::{BoundingBox, MinAreaRect, Point};
pub use layout_postprocess::{LayoutDetection, LayoutPostProcess};
pub use normalization::NormalizeImage;
pub use resize::{DetResize, RecResize};
pub use types::{ColorOrder, ImageScaleInfo, LimitType};
