use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput};
use burn::nn::{Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Device, Int, Tensor};
use burn::record::{CompactRecorder, FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::data::ClassificationBatch;
use crate::transform;
use crate::weights::Checkpoint;

/// Which weight set ended up in the model. `PretrainedBase` is the recognized
/// fallback when no fine-tuned record exists on disk; predictions from it are
/// materially different, so callers surface it as a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
	FineTuned(PathBuf),
	PretrainedBase,
}

/// ViT-B/16 image classifier: patch embedding, learned class token and
/// position embeddings, pre-norm transformer encoder, classification head.
#[derive(Debug, Module)]
pub struct HerbClassModel<B: Backend> {
	patch_embed: Conv2d<B>,
	cls_token: Param<Tensor<B, 3>>,
	pos_embed: Param<Tensor<B, 3>>,
	encoder: TransformerEncoder<B>,
	norm: LayerNorm<B>,
	head: Linear<B>,
}

impl<B: Backend> HerbClassModel<B> {
	/// Raw per-class scores for a `[batch, 3, 224, 224]` input. Pure and
	/// deterministic for fixed weights; dropout is inert outside training.
	pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
		let [batch, _, _, _] = images.dims();

		// [batch, d_model, 14, 14] -> [batch, 196, d_model]
		let x = self.patch_embed.forward(images);
		let x = x.flatten::<3>(2, 3).swap_dims(1, 2);

		let cls = self.cls_token.val().expand([batch as i32, -1, -1]);
		let x = Tensor::cat(vec![cls, x], 1) + self.pos_embed.val();

		let x = self.encoder.forward(TransformerEncoderInput::new(x));
		let x = self.norm.forward(x);

		// Classification reads only the class-token position.
		let cls_out = x.narrow(1, 0, 1).squeeze::<2>(1);
		self.head.forward(cls_out)
	}

	pub fn forward_classification(
		&self,
		images: Tensor<B, 4>,
		targets: Tensor<B, 1, Int>,
	) -> ClassificationOutput<B> {
		let output = self.forward(images);

		let loss = CrossEntropyLossConfig::new()
			.init(&output.device())
			.forward(output.clone(), targets.clone());

		ClassificationOutput::new(loss, output, targets)
	}

	pub fn vit_b16(num_classes: usize, device: &Device<B>) -> Self {
		HerbClassConfig::new(num_classes).init(device)
	}

	pub fn vit_b16_pretrained(
		checkpoint: Checkpoint,
		device: &Device<B>,
	) -> Result<Self, RecorderError> {
		let record = Self::load_weights_record(&checkpoint, device)?;
		let model = Self::vit_b16(checkpoint.num_classes, device).load_record(record);

		Ok(model)
	}

	/// Swap the classification head for a freshly initialized one with
	/// `num_classes` outputs, keeping the backbone weights. Discarding the
	/// previous head is the expected part of adapting the base checkpoint.
	pub fn with_classes(mut self, num_classes: usize, device: &Device<B>) -> Self {
		let [d_model, _] = self.head.weight.val().dims();
		self.head = LinearConfig::new(d_model, num_classes).init(device);

		self
	}

	/// Overlay fine-tuned weights when the record file exists. Absence is not
	/// an error: the model keeps whatever weights it already has and the
	/// caller gets the tagged fallback to report.
	pub fn with_finetuned<A: AsRef<Path>>(
		self,
		path: A,
		device: &Device<B>,
	) -> Result<(Self, WeightsSource), RecorderError> {
		let path = path.as_ref();

		if !path.with_extension("mpk").exists() {
			return Ok((self, WeightsSource::PretrainedBase));
		}

		let model = self.load_file(path.to_path_buf(), &CompactRecorder::new(), device)?;
		Ok((model, WeightsSource::FineTuned(path.to_path_buf())))
	}

	pub fn load_weights_record(
		checkpoint: &Checkpoint,
		device: &Device<B>,
	) -> Result<HerbClassModelRecord<B>, RecorderError> {
		// Remap the upstream state_dict names onto this module tree.
		let load_args = LoadArgs::new(checkpoint.fetch()?)
			.with_key_remap("vit\\.embeddings\\.cls_token", "cls_token")
			.with_key_remap("vit\\.embeddings\\.position_embeddings", "pos_embed")
			.with_key_remap(
				"vit\\.embeddings\\.patch_embeddings\\.projection\\.(.+)",
				"patch_embed.$1",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.attention\\.attention\\.query\\.(.+)",
				"encoder.layers.$1.mha.query.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.attention\\.attention\\.key\\.(.+)",
				"encoder.layers.$1.mha.key.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.attention\\.attention\\.value\\.(.+)",
				"encoder.layers.$1.mha.value.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.attention\\.output\\.dense\\.(.+)",
				"encoder.layers.$1.mha.output.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.intermediate\\.dense\\.(.+)",
				"encoder.layers.$1.pwff.linear_inner.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.output\\.dense\\.(.+)",
				"encoder.layers.$1.pwff.linear_outer.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.layernorm_before\\.(.+)",
				"encoder.layers.$1.norm_1.$2",
			)
			.with_key_remap(
				"vit\\.encoder\\.layer\\.([0-9]+)\\.layernorm_after\\.(.+)",
				"encoder.layers.$1.norm_2.$2",
			)
			.with_key_remap("vit\\.layernorm\\.(.+)", "norm.$1")
			.with_key_remap("classifier\\.(.+)", "head.$1");

		let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

		Ok(record)
	}
}

impl<B: AutodiffBackend> TrainStep<ClassificationBatch<B>, ClassificationOutput<B>>
	for HerbClassModel<B>
{
	fn step(&self, batch: ClassificationBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
		let item = self.forward_classification(batch.images, batch.targets);

		TrainOutput::new(self, item.loss.backward(), item)
	}
}

impl<B: Backend> ValidStep<ClassificationBatch<B>, ClassificationOutput<B>> for HerbClassModel<B> {
	fn step(&self, batch: ClassificationBatch<B>) -> ClassificationOutput<B> {
		self.forward_classification(batch.images, batch.targets)
	}
}

#[derive(Config)]
pub struct HerbClassConfig {
	pub num_classes: usize,
	#[config(default = 16)]
	pub patch_size: usize,
	#[config(default = 768)]
	pub d_model: usize,
	#[config(default = 12)]
	pub num_layers: usize,
	#[config(default = 12)]
	pub num_heads: usize,
	#[config(default = 3072)]
	pub d_ff: usize,
}

impl HerbClassConfig {
	pub fn init<B: Backend>(&self, device: &Device<B>) -> HerbClassModel<B> {
		let num_patches = (transform::SIDE as usize / self.patch_size).pow(2);

		let patch_embed = Conv2dConfig::new([3, self.d_model], [self.patch_size, self.patch_size])
			.with_stride([self.patch_size, self.patch_size])
			.init(device);

		let embed_init = Initializer::Normal {
			mean: 0.0,
			std: 0.02,
		};
		let cls_token = embed_init.init([1, 1, self.d_model], device);
		let pos_embed = embed_init.init([1, num_patches + 1, self.d_model], device);

		let encoder =
			TransformerEncoderConfig::new(self.d_model, self.d_ff, self.num_heads, self.num_layers)
				.with_norm_first(true)
				.init(device);

		HerbClassModel {
			patch_embed,
			cls_token,
			pos_embed,
			encoder,
			norm: LayerNormConfig::new(self.d_model).init(device),
			head: LinearConfig::new(self.d_model, self.num_classes).init(device),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use burn::backend::ndarray::{NdArray, NdArrayDevice};

	fn tiny_config(num_classes: usize) -> HerbClassConfig {
		HerbClassConfig::new(num_classes)
			.with_d_model(32)
			.with_num_layers(1)
			.with_num_heads(2)
			.with_d_ff(64)
	}

	#[test]
	fn forward_produces_one_score_per_class() {
		let device = NdArrayDevice::default();
		let model = tiny_config(3).init::<NdArray>(&device);

		let scores = model.forward(Tensor::zeros([2, 3, 224, 224], &device));
		assert_eq!(scores.dims(), [2, 3]);
	}

	#[test]
	fn head_swap_changes_class_count_only() {
		let device = NdArrayDevice::default();
		let model = tiny_config(3).init::<NdArray>(&device).with_classes(7, &device);

		let scores = model.forward(Tensor::zeros([1, 3, 224, 224], &device));
		assert_eq!(scores.dims(), [1, 7]);
	}

	#[test]
	fn missing_record_falls_back_to_base_weights() {
		let device = NdArrayDevice::default();
		let model = tiny_config(2).init::<NdArray>(&device);

		let (_, source) = model
			.with_finetuned("does/not/exist/model", &device)
			.unwrap();
		assert_eq!(source, WeightsSource::PretrainedBase);
	}

	#[test]
	fn existing_record_is_tagged_fine_tuned() {
		let device = NdArrayDevice::default();
		let dir = tempfile::tempdir().unwrap();
		let base = dir.path().join("model");

		let model = tiny_config(2).init::<NdArray>(&device);
		model
			.clone()
			.save_file(base.clone(), &CompactRecorder::new())
			.unwrap();

		let (_, source) = model.with_finetuned(&base, &device).unwrap();
		assert_eq!(source, WeightsSource::FineTuned(base));
	}
}
