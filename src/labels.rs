use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{HerbError, LabelLoadError};

/// Sentinel name for class indices the catalog cannot resolve. An unmapped
/// index means the label map and the model head disagree; the prediction
/// still goes through with this name rather than failing.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bidirectional mapping between herb names and dense class indices,
/// parsed from the `labels.json` artifact.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
	forward: HashMap<String, usize>,
	reverse: HashMap<usize, String>,
}

impl LabelCatalog {
	pub fn load<A: AsRef<Path>>(path: A) -> Result<Self, HerbError> {
		Self::read(path.as_ref()).map_err(HerbError::LabelLoad)
	}

	fn read(path: &Path) -> Result<Self, LabelLoadError> {
		let file = File::open(path)?;
		let forward: HashMap<String, usize> = serde_json::from_reader(BufReader::new(file))?;

		if forward.is_empty() {
			return Err(LabelLoadError::Empty);
		}

		let catalog = Self::from_map(forward);

		// Two names sharing an index would silently mislabel predictions;
		// treat that as a corrupt artifact.
		if catalog.reverse.len() != catalog.forward.len() {
			return Err(LabelLoadError::DuplicateIndex);
		}

		Ok(catalog)
	}

	pub fn from_map(forward: HashMap<String, usize>) -> Self {
		let reverse = forward
			.iter()
			.map(|(name, &index)| (index, name.clone()))
			.collect();

		Self { forward, reverse }
	}

	pub fn index_of(&self, name: &str) -> Option<usize> {
		self.forward.get(name).copied()
	}

	pub fn name_for(&self, index: usize) -> &str {
		self.reverse
			.get(&index)
			.map(String::as_str)
			.unwrap_or(UNKNOWN_LABEL)
	}

	pub fn num_classes(&self) -> usize {
		self.forward.len()
	}
}
