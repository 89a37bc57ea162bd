use std::path::Path;
use std::process::ExitCode;

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use log::error;

use herb_classifier::error::HerbError;
use herb_classifier::infer::{InferenceContext, Prediction};
use herb_classifier::{labels_path, model_path};

/// Classify one image and emit exactly one JSON object on stdout. All
/// diagnostics go to stderr; the exit code is non-zero only for invocation
/// errors (wrong argument count, nonexistent input path).
fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let args: Vec<String> = std::env::args().skip(1).collect();
	if args.len() != 1 {
		emit(&Prediction::failed_message(
			"Usage: herb-classifier <image-path>",
		));
		return ExitCode::FAILURE;
	}

	let image_path = Path::new(&args[0]);
	if !image_path.exists() {
		emit(&Prediction::failed(&HerbError::InputNotFound(
			image_path.to_path_buf(),
		)));
		return ExitCode::FAILURE;
	}

	let device = NdArrayDevice::default();
	let context = match InferenceContext::<NdArray>::load(labels_path(), model_path(), &device) {
		Ok(context) => context,
		Err(err) => {
			error!("{err}");
			emit(&Prediction::failed(&err));
			return ExitCode::SUCCESS;
		}
	};

	emit(&context.predict(image_path));
	ExitCode::SUCCESS
}

fn emit(prediction: &Prediction) {
	match serde_json::to_string(prediction) {
		Ok(json) => println!("{json}"),
		// Unreachable with this result shape, but stdout must stay parseable.
		Err(_) => println!(r#"{{"error":"Failed to serialize result","success":false}}"#),
	}
}
