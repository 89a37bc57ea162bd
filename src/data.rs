use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::{Backend, Device, ElementConversion, Int, Tensor};
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::transform::{self, Normalizer};

/// Alphabetical label -> index assignment derived from the dataset directory
/// names. Iteration order of the map matches the index order, so serializing
/// it verbatim produces the label map artifact.
pub fn scan_labels<A: AsRef<Path>>(root: A) -> Result<BTreeMap<String, usize>, std::io::Error> {
	let mut names: Vec<String> = root
		.as_ref()
		.read_dir()?
		.filter_map(|entry| entry.ok())
		.filter(|entry| entry.path().is_dir())
		.filter_map(|entry| entry.file_name().into_string().ok())
		.collect();
	names.sort();

	Ok(names
		.into_iter()
		.enumerate()
		.map(|(index, name)| (name, index))
		.collect())
}

pub fn write_labels<A: AsRef<Path>>(
	labels: &BTreeMap<String, usize>,
	path: A,
) -> Result<(), std::io::Error> {
	let file = File::create(path)?;
	serde_json::to_writer_pretty(file, labels).map_err(std::io::Error::other)
}

/// One training sample: HWC pixels scaled to [0, 1] plus the class index.
/// Standardization happens in the batcher so it matches inference exactly.
#[derive(Debug, Clone)]
pub struct HerbImage {
	pub pixels: Vec<f32>,
	pub label: usize,
}

#[derive(Debug, Clone)]
pub struct HerbDataset {
	items: Vec<HerbImage>,
}

impl HerbDataset {
	/// Walk `root`, one subdirectory per label, loading every image through
	/// the shared training transform. Unreadable files are skipped with a
	/// warning instead of failing the whole run. The shuffle deciding the
	/// train/valid split is seeded so runs are reproducible.
	pub fn from_folder<A: AsRef<Path>>(
		root: A,
		labels: &BTreeMap<String, usize>,
		seed: u64,
	) -> Result<Self, std::io::Error> {
		let mut items = Vec::new();

		for (name, &label) in labels {
			let class_dir = root.as_ref().join(name);
			let mut paths: Vec<_> = class_dir
				.read_dir()?
				.map(|entry| entry.map(|entry| entry.path()))
				.collect::<Result<_, _>>()?;
			// read_dir order is platform-dependent; sort so the seeded
			// shuffle sees the same input everywhere.
			paths.sort();

			for path in paths {
				match transform::load_image_pixels(&path) {
					Ok(pixels) => items.push(HerbImage { pixels, label }),
					Err(err) => warn!("Skipping unreadable image {}: {err}", path.display()),
				}
			}
		}

		items.shuffle(&mut StdRng::seed_from_u64(seed));

		Ok(Self { items })
	}

	pub fn train_split(&self) -> Self {
		Self {
			items: self.items[0..(self.items.len() * 4 / 5)].to_vec(),
		}
	}

	pub fn valid_split(&self) -> Self {
		Self {
			items: self.items[(self.items.len() * 4 / 5)..].to_vec(),
		}
	}
}

impl Dataset<HerbImage> for HerbDataset {
	fn get(&self, index: usize) -> Option<HerbImage> {
		self.items.get(index).cloned()
	}

	fn len(&self) -> usize {
		self.items.len()
	}
}

#[derive(Clone)]
pub struct ClassificationBatcher<B: Backend> {
	device: Device<B>,
	normalizer: Normalizer<B>,
}

impl<B: Backend> ClassificationBatcher<B> {
	pub fn new(device: Device<B>) -> Self {
		Self {
			normalizer: Normalizer::new(&device),
			device,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
	pub images: Tensor<B, 4>,
	pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<HerbImage, ClassificationBatch<B>> for ClassificationBatcher<B> {
	fn batch(&self, items: Vec<HerbImage>) -> ClassificationBatch<B> {
		let images = items
			.iter()
			.map(|item| transform::tensor_from_pixels(item.pixels.clone(), &self.device))
			.map(|tensor| tensor.unsqueeze::<4>())
			.collect();
		let images = self.normalizer.normalize(Tensor::cat(images, 0));

		let targets = items
			.iter()
			.map(|item| {
				Tensor::<B, 1, Int>::from_data(
					[(item.label as i64).elem::<B::IntElem>()],
					&self.device,
				)
			})
			.collect();
		let targets = Tensor::cat(targets, 0);

		ClassificationBatch { images, targets }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use burn::backend::ndarray::{NdArray, NdArrayDevice};
	use image::{Rgb, RgbImage};

	fn fixture_dataset(root: &Path) {
		for (dir, shade) in [("basil", 60u8), ("mint", 180)] {
			let class_dir = root.join(dir);
			std::fs::create_dir_all(&class_dir).unwrap();
			RgbImage::from_pixel(32, 32, Rgb([shade, shade, shade]))
				.save(class_dir.join("sample.png"))
				.unwrap();
		}
		std::fs::write(root.join("mint").join("broken.jpg"), b"not an image").unwrap();
	}

	#[test]
	fn labels_are_assigned_alphabetically() {
		let dir = tempfile::tempdir().unwrap();
		fixture_dataset(dir.path());

		let labels = scan_labels(dir.path()).unwrap();
		assert_eq!(labels.get("basil"), Some(&0));
		assert_eq!(labels.get("mint"), Some(&1));
		assert_eq!(labels.len(), 2);
	}

	#[test]
	fn unreadable_images_are_skipped() {
		let dir = tempfile::tempdir().unwrap();
		fixture_dataset(dir.path());

		let labels = scan_labels(dir.path()).unwrap();
		let dataset = HerbDataset::from_folder(dir.path(), &labels, 42).unwrap();

		// Two readable samples; the broken jpeg is dropped.
		assert_eq!(dataset.len(), 2);
	}

	#[test]
	fn shuffle_is_reproducible_for_a_fixed_seed() {
		let dir = tempfile::tempdir().unwrap();
		for (class, count) in [("basil", 3u32), ("mint", 3)] {
			let class_dir = dir.path().join(class);
			std::fs::create_dir_all(&class_dir).unwrap();
			for i in 0..count {
				RgbImage::from_pixel(16, 16, Rgb([i as u8 * 40, 0, 0]))
					.save(class_dir.join(format!("{i}.png")))
					.unwrap();
			}
		}
		let labels = scan_labels(dir.path()).unwrap();

		let order = |seed| -> Vec<usize> {
			let dataset = HerbDataset::from_folder(dir.path(), &labels, seed).unwrap();
			(0..dataset.len())
				.filter_map(|i| dataset.get(i))
				.map(|item| item.label)
				.collect()
		};

		assert_eq!(order(7), order(7));
	}

	#[test]
	fn batches_carry_normalized_images_and_targets() {
		let dir = tempfile::tempdir().unwrap();
		fixture_dataset(dir.path());

		let labels = scan_labels(dir.path()).unwrap();
		let dataset = HerbDataset::from_folder(dir.path(), &labels, 42).unwrap();
		let items: Vec<HerbImage> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();

		let batcher = ClassificationBatcher::<NdArray>::new(NdArrayDevice::default());
		let batch = batcher.batch(items);

		assert_eq!(batch.images.dims(), [2, 3, 224, 224]);
		assert_eq!(batch.targets.dims(), [2]);
	}

	#[test]
	fn written_label_map_round_trips_through_the_catalog() {
		let dir = tempfile::tempdir().unwrap();
		fixture_dataset(dir.path());

		let labels = scan_labels(dir.path()).unwrap();
		let path = dir.path().join("labels.json");
		write_labels(&labels, &path).unwrap();

		let catalog = crate::labels::LabelCatalog::load(&path).unwrap();
		assert_eq!(catalog.name_for(0), "basil");
		assert_eq!(catalog.name_for(1), "mint");
	}
}
