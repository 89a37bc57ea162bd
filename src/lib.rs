use std::path::PathBuf;

pub mod data;
pub mod error;
pub mod infer;
pub mod labels;
pub mod model;
pub mod train;
pub mod transform;
pub mod weights;

/// Directory holding the two inference artifacts emitted by the trainer.
pub const ARTIFACT_DIR: &str = "artifacts";
pub const LABELS_FILE: &str = "labels.json";
/// Base name of the fine-tuned weights record; the recorder appends `.mpk`.
pub const MODEL_FILE: &str = "model";

pub fn labels_path() -> PathBuf {
	PathBuf::from(ARTIFACT_DIR).join(LABELS_FILE)
}

pub fn model_path() -> PathBuf {
	PathBuf::from(ARTIFACT_DIR).join(MODEL_FILE)
}
