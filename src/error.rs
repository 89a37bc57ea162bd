use std::path::PathBuf;
use burn::record::RecorderError;
use thiserror::Error;

/// Everything that can go wrong between receiving an image path and emitting
/// a result. The boundary folds each variant into the wire-format record, so
/// callers always see structured output.
#[derive(Debug, Error)]
pub enum HerbError {
	#[error("Image file not found: {}", .0.display())]
	InputNotFound(PathBuf),
	#[error("Failed to load labels")]
	LabelLoad(#[source] LabelLoadError),
	#[error("Failed to load model")]
	ModelLoad(#[source] RecorderError),
	#[error("Image preprocessing failed: {0}")]
	Preprocess(#[source] image::ImageError),
	#[error("Inference failed: {0}")]
	Inference(String),
}

#[derive(Debug, Error)]
pub enum LabelLoadError {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Parse(#[from] serde_json::Error),
	#[error("label map is empty")]
	Empty,
	#[error("label map contains duplicate class indices")]
	DuplicateIndex,
}
