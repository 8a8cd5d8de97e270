//! Result schema and request-level domain rules.

pub mod languages;
pub mod schema;

pub use languages::{CODE_TO_LANGUAGE, replace_lang_with_code};
pub use schema::{
    LayoutBox, LayoutResult, OcrResult, OrderBox, OrderResult, PolygonBox, TextDetectionResult,
    TextLine,
};
