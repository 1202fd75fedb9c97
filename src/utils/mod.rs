pub mod address_classifier;
pub mod money;

pub use address_classifier::{check_selection, classify, Classification};
