use burn::config::Config;
use burn::data::dataloader::DataLoaderBuilder;
use burn::module::Module;
use burn::optim::AdamConfig;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{AccuracyMetric, LossMetric};
use burn::train::LearnerBuilder;
use log::info;
use std::time::Instant;

use crate::data::{self, ClassificationBatcher, HerbDataset};
use crate::model::HerbClassModel;
use crate::weights::VIT_B16_IMAGENET1K;
use crate::{labels_path, model_path, ARTIFACT_DIR};

fn create_artifact_dir(artifact_dir: &str) {
	// Remove existing artifacts to get an accurate learner summary
	std::fs::remove_dir_all(artifact_dir).ok();
	std::fs::create_dir_all(artifact_dir).ok();
}

#[derive(Config)]
pub struct TrainingConfig {
	pub optimizer: AdamConfig,
	#[config(default = 3)]
	pub num_epochs: usize,
	#[config(default = 8)]
	pub batch_size: usize,
	#[config(default = 2)]
	pub num_workers: usize,
	#[config(default = 42)]
	pub seed: u64,
	#[config(default = 2e-5)]
	pub learning_rate: f64,
}

/// Fine-tune the classifier on a directory tree where each subdirectory name
/// is a herb label, then emit the two inference artifacts: the label map and
/// the fine-tuned weights record.
pub fn run<B: AutodiffBackend>(dataset_dir: &str, config: TrainingConfig, device: B::Device) {
	create_artifact_dir(ARTIFACT_DIR);

	config
		.save(format!("{ARTIFACT_DIR}/config.json"))
		.expect("Config should be saved successfully");

	B::seed(config.seed);

	let labels = data::scan_labels(dataset_dir).expect("Dataset directory should be readable");
	data::write_labels(&labels, labels_path()).expect("Label map should be saved successfully");
	info!("Wrote label map for {} classes", labels.len());

	let dataset = HerbDataset::from_folder(dataset_dir, &labels, config.seed)
		.expect("Dataset images should load");

	let batcher_train = ClassificationBatcher::<B>::new(device.clone());
	let batcher_valid = ClassificationBatcher::<B::InnerBackend>::new(device.clone());

	let dataloader_train = DataLoaderBuilder::new(batcher_train)
		.batch_size(config.batch_size)
		.shuffle(config.seed)
		.num_workers(config.num_workers)
		.build(dataset.train_split());

	let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
		.batch_size(config.batch_size)
		.num_workers(config.num_workers)
		.build(dataset.valid_split());

	let model = HerbClassModel::vit_b16_pretrained(VIT_B16_IMAGENET1K, &device)
		.expect("Base checkpoint should be available")
		.with_classes(labels.len(), &device);

	let learner = LearnerBuilder::new(ARTIFACT_DIR)
		.metric_train_numeric(AccuracyMetric::new())
		.metric_valid_numeric(AccuracyMetric::new())
		.metric_train_numeric(LossMetric::new())
		.metric_valid_numeric(LossMetric::new())
		.with_file_checkpointer(CompactRecorder::new())
		.devices(vec![device.clone()])
		.num_epochs(config.num_epochs)
		.summary()
		.build(model, config.optimizer.init(), config.learning_rate);

	let now = Instant::now();
	let model_trained = learner.fit(dataloader_train, dataloader_valid);
	let elapsed = now.elapsed().as_secs();
	info!("Training completed in {}m{}s", elapsed / 60, elapsed % 60);

	model_trained
		.save_file(model_path(), &CompactRecorder::new())
		.expect("Trained model should be saved successfully");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_training_recipe() {
		let config = TrainingConfig::new(AdamConfig::new());

		assert_eq!(config.num_epochs, 3);
		assert_eq!(config.batch_size, 8);
		assert_eq!(config.learning_rate, 2e-5);
	}
}
