use std::path::Path;

use burn::prelude::{Backend, Device, Tensor, TensorData};
use image::imageops::{self, FilterType};

use crate::error::HerbError;

pub const SIDE: u32 = 224;
pub const CHANNELS: usize = 3;

/// ImageNet channel statistics; the fine-tuned weights were trained against
/// inputs standardized with exactly these values.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel standardization over `[N, C, H, W]` inputs.
#[derive(Debug, Clone)]
pub struct Normalizer<B: Backend> {
	pub mean: Tensor<B, 4>,
	pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
	pub fn new(device: &Device<B>) -> Self {
		let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, 3, 1, 1]);
		let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, 3, 1, 1]);

		Self { mean, std }
	}

	pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
		(input - self.mean.clone()) / self.std.clone()
	}
}

/// Decode the raster at `path`, force three-channel color and resize to the
/// fixed 224x224 square with Lanczos3. Returns HWC pixels scaled to [0, 1].
///
/// The filter choice matters: the training images went through the same
/// resize, and a different filter shifts predictions without any error.
pub fn load_image_pixels<A: AsRef<Path>>(path: A) -> Result<Vec<f32>, HerbError> {
	let rgb = image::open(path.as_ref())
		.map_err(HerbError::Preprocess)?
		.into_rgb8();
	let resized = imageops::resize(&rgb, SIDE, SIDE, FilterType::Lanczos3);

	Ok(resized
		.into_raw()
		.into_iter()
		.map(|px| px as f32 / 255.0)
		.collect())
}

/// HWC pixel buffer -> `[3, 224, 224]` tensor.
pub fn tensor_from_pixels<B: Backend>(pixels: Vec<f32>, device: &Device<B>) -> Tensor<B, 3> {
	let data = TensorData::new(pixels, [SIDE as usize, SIDE as usize, CHANNELS]);

	Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device).permute([2, 0, 1])
}

/// Full inference-side preprocessing: decoded, resized, scaled, standardized
/// and carrying the synthetic batch axis the model expects.
pub fn prepare<B: Backend, A: AsRef<Path>>(
	path: A,
	device: &Device<B>,
) -> Result<Tensor<B, 4>, HerbError> {
	let image = tensor_from_pixels(load_image_pixels(path)?, device).unsqueeze::<4>();

	Ok(Normalizer::new(device).normalize(image))
}

#[cfg(test)]
mod tests {
	use super::*;
	use burn::backend::ndarray::{NdArray, NdArrayDevice};
	use image::{Rgb, RgbImage};
	use std::path::PathBuf;

	fn solid_image(dir: &Path, rgb: [u8; 3]) -> PathBuf {
		let path = dir.join("solid.png");
		RgbImage::from_pixel(64, 48, Rgb(rgb)).save(&path).unwrap();
		path
	}

	fn gradient_image(dir: &Path) -> PathBuf {
		let path = dir.join("gradient.png");
		RgbImage::from_fn(90, 60, |x, y| Rgb([(x * 2) as u8, (y * 4) as u8, 128]))
			.save(&path)
			.unwrap();
		path
	}

	#[test]
	fn output_has_fixed_shape_with_batch_axis() {
		let dir = tempfile::tempdir().unwrap();
		let path = gradient_image(dir.path());

		let tensor = prepare::<NdArray, _>(&path, &NdArrayDevice::default()).unwrap();
		assert_eq!(tensor.dims(), [1, 3, 224, 224]);
	}

	#[test]
	fn preprocessing_is_deterministic() {
		let dir = tempfile::tempdir().unwrap();
		let path = gradient_image(dir.path());
		let device = NdArrayDevice::default();

		let first = prepare::<NdArray, _>(&path, &device).unwrap();
		let second = prepare::<NdArray, _>(&path, &device).unwrap();

		assert_eq!(
			first.to_data().to_vec::<f32>().unwrap(),
			second.to_data().to_vec::<f32>().unwrap()
		);
	}

	#[test]
	fn solid_color_standardizes_to_known_values() {
		let dir = tempfile::tempdir().unwrap();
		let path = solid_image(dir.path(), [100, 150, 200]);

		let tensor = prepare::<NdArray, _>(&path, &NdArrayDevice::default()).unwrap();
		let values = tensor.to_data().to_vec::<f32>().unwrap();

		// Lanczos3 preserves constant images, so every pixel of channel c is
		// (v / 255 - mean[c]) / std[c].
		let plane = 224 * 224;
		for (channel, &v) in [100u8, 150, 200].iter().enumerate() {
			let expected = (v as f32 / 255.0 - MEAN[channel]) / STD[channel];
			let actual = values[channel * plane];
			assert!(
				(actual - expected).abs() < 1e-4,
				"channel {channel}: {actual} vs {expected}"
			);
		}
	}

	#[test]
	fn undecodable_file_is_a_preprocessing_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broken.jpg");
		std::fs::write(&path, b"definitely not a jpeg").unwrap();

		let err = load_image_pixels(&path).unwrap_err();
		assert!(err.to_string().starts_with("Image preprocessing failed"));
	}
}
