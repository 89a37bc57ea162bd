use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use burn::optim::AdamConfig;
use log::info;

use herb_classifier::train::{self, TrainingConfig};

const DEFAULT_DATASET_DIR: &str = "dataset/images";

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let dataset_dir = std::env::args()
		.nth(1)
		.unwrap_or_else(|| String::from(DEFAULT_DATASET_DIR));
	info!("Fine-tuning on {dataset_dir}");

	let device = NdArrayDevice::default();
	train::run::<Autodiff<NdArray>>(&dataset_dir, TrainingConfig::new(AdamConfig::new()), device);
}
