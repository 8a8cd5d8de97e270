//! Reading-order models.

pub mod layout_reader;

pub use layout_reader::{LayoutReaderConfig, LayoutReaderModel};
