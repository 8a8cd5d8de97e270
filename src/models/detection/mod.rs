//! Detection models: text lines and layout regions.

pub mod db;
pub mod layout;

pub use db::{DBConfig, DBModel};
pub use layout::{LayoutLabels, LayoutModel, LayoutModelConfig};
