use std::fs;
use std::path::PathBuf;

use burn::data::network::downloader;
use burn::record::RecorderError;

/// Base checkpoint for google/vit-base-patch16-224: ImageNet-21k pretraining
/// with an ImageNet-1k fine-tuned 1000-class head. The head is discarded when
/// the model is reconfigured for the herb catalog.
pub const VIT_B16_IMAGENET1K: Checkpoint = Checkpoint {
	url: "https://huggingface.co/google/vit-base-patch16-224/resolve/main/pytorch_model.bin",
	file_name: "vit-base-patch16-224.bin",
	num_classes: 1000,
};

/// A downloadable base checkpoint and the class count of its head.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
	pub url: &'static str,
	pub file_name: &'static str,
	pub num_classes: usize,
}

impl Checkpoint {
	/// Where the cached copy of this checkpoint lives.
	pub fn cache_path(&self) -> Result<PathBuf, RecorderError> {
		Ok(self.cache_dir()?.join(self.file_name))
	}

	fn cache_dir(&self) -> Result<PathBuf, RecorderError> {
		let home = dirs::home_dir().ok_or_else(|| {
			RecorderError::Unknown(String::from("No home directory for the checkpoint cache"))
		})?;

		Ok(home.join(".cache").join("herb-classifier"))
	}

	/// Fetch the checkpoint into the local cache, reusing a cached copy when
	/// one exists. Failures surface as recorder errors so model loading
	/// reports them like any other weight problem.
	pub fn fetch(&self) -> Result<PathBuf, RecorderError> {
		let cache_dir = self.cache_dir()?;
		let file_name = cache_dir.join(self.file_name);

		if !file_name.exists() {
			fs::create_dir_all(&cache_dir).map_err(cache_error)?;

			let bytes = downloader::download_file_as_bytes(self.url, self.file_name);
			fs::write(&file_name, bytes).map_err(cache_error)?;
		}

		Ok(file_name)
	}
}

fn cache_error(err: std::io::Error) -> RecorderError {
	RecorderError::Unknown(format!("Could not cache base weights: {err}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base_checkpoint_descriptor_matches_its_upstream_head() {
		assert_eq!(VIT_B16_IMAGENET1K.num_classes, 1000);
		assert!(VIT_B16_IMAGENET1K.url.ends_with(".bin"));
	}

	#[test]
	fn cache_path_derives_from_the_descriptor() {
		let path = VIT_B16_IMAGENET1K.cache_path().unwrap();

		assert!(path.ends_with(".cache/herb-classifier/vit-base-patch16-224.bin"));
	}
}
