use std::path::Path;

use burn::prelude::{Backend, Device, ElementConversion};
use burn::tensor::activation::softmax;
use log::{info, warn};
use serde::Serialize;

use crate::error::HerbError;
use crate::labels::LabelCatalog;
use crate::model::{HerbClassModel, WeightsSource};
use crate::transform;
use crate::weights::VIT_B16_IMAGENET1K;

/// Wire-format result of one classification. Exactly one of the success
/// triple (`herb`, `confidence`, `predicted_class`) or `error` is populated,
/// matching the `success` flag; absent fields are omitted from the JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub herb: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confidence: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub predicted_class: Option<usize>,
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Prediction {
	pub fn classified(herb: String, confidence: f64, predicted_class: usize) -> Self {
		Self {
			herb: Some(herb),
			confidence: Some(confidence),
			predicted_class: Some(predicted_class),
			success: true,
			error: None,
		}
	}

	pub fn failed(error: &HerbError) -> Self {
		Self::failed_message(error.to_string())
	}

	pub fn failed_message<S: Into<String>>(message: S) -> Self {
		Self {
			herb: None,
			confidence: None,
			predicted_class: None,
			success: false,
			error: Some(message.into()),
		}
	}
}

/// Caller-owned label catalog + classifier pair. Constructed once, borrowed
/// by every `predict` call; nothing here mutates after construction, so a
/// single context can serve any number of sequential predictions.
pub struct InferenceContext<B: Backend> {
	catalog: LabelCatalog,
	model: HerbClassModel<B>,
	device: Device<B>,
}

impl<B: Backend> InferenceContext<B> {
	pub fn new(catalog: LabelCatalog, model: HerbClassModel<B>, device: Device<B>) -> Self {
		Self {
			catalog,
			model,
			device,
		}
	}

	/// Load both inference artifacts: the label map and the classifier with
	/// the base checkpoint adapted to the catalog's class count. A missing
	/// fine-tuned record downgrades to the base weights with a warning; a
	/// missing or malformed label map is a hard load error.
	pub fn load<L: AsRef<Path>, W: AsRef<Path>>(
		labels_path: L,
		weights_path: W,
		device: &Device<B>,
	) -> Result<Self, HerbError> {
		let catalog = LabelCatalog::load(labels_path)?;

		let model = HerbClassModel::vit_b16_pretrained(VIT_B16_IMAGENET1K, device)
			.map_err(HerbError::ModelLoad)?
			.with_classes(catalog.num_classes(), device);

		let weights_path = weights_path.as_ref();
		let (model, source) = model
			.with_finetuned(weights_path, device)
			.map_err(HerbError::ModelLoad)?;

		match &source {
			WeightsSource::FineTuned(path) => {
				info!("Loaded trained weights from {}", path.display());
			}
			WeightsSource::PretrainedBase => {
				warn!(
					"No trained weights found at {}, using base model",
					weights_path.display()
				);
			}
		}

		Ok(Self::new(catalog, model, device.clone()))
	}

	/// Classify one image. Every pipeline failure is folded into the result
	/// record; this never panics and never returns an error.
	pub fn predict<A: AsRef<Path>>(&self, image_path: A) -> Prediction {
		match self.run(image_path.as_ref()) {
			Ok(prediction) => prediction,
			Err(err) => Prediction::failed(&err),
		}
	}

	fn run(&self, image_path: &Path) -> Result<Prediction, HerbError> {
		if !image_path.exists() {
			return Err(HerbError::InputNotFound(image_path.to_path_buf()));
		}
		if self.catalog.num_classes() == 0 {
			return Err(HerbError::Inference(String::from("empty label catalog")));
		}

		let input = transform::prepare(image_path, &self.device)?;

		let scores = self.model.forward(input);
		let probabilities = softmax(scores, 1);

		// Ties break toward whichever index the reduction reports first;
		// deterministic for fixed weights.
		let (probability, index) = probabilities.max_dim_with_indices(1);
		let index = index.into_scalar().elem::<i64>() as usize;
		let probability = probability.into_scalar().elem::<f64>();

		let herb = self.catalog.name_for(index).to_string();

		Ok(Prediction::classified(
			herb,
			round2(probability * 100.0),
			index,
		))
	}
}

fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}
