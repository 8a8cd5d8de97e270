//! Text recognition models.

pub mod crnn;

pub use crnn::{CRNNConfig, CRNNModel};
