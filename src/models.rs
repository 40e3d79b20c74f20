//! Data models for corpus-prep

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const GENERATOR: &str = "corpus-prep";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An image and its label sharing one stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplePair {
    pub stem: String,
    pub image: PathBuf,
    pub label: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitSizes {
    pub fn get(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }

    pub fn get_mut(&mut self, split: Split) -> &mut usize {
        match split {
            Split::Train => &mut self.train,
            Split::Val => &mut self.val,
            Split::Test => &mut self.test,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOperation {
    Read,
    Copy,
    Delete,
}

impl std::fmt::Display for ItemOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemOperation::Read => write!(f, "read"),
            ItemOperation::Copy => write!(f, "copy"),
            ItemOperation::Delete => write!(f, "delete"),
        }
    }
}

/// A single file that was skipped because of an I/O error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFailure {
    pub path: String,
    pub operation: ItemOperation,
    pub message: String,
}

impl ItemFailure {
    pub fn new(path: &Path, operation: ItemOperation, err: &std::io::Error) -> Self {
        Self {
            path: path.display().to_string(),
            operation,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitReport {
    pub generator: String,
    pub generator_version: String,
    pub generated_at: String,
    pub dataset_path: String,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub seed: u64,
    pub dry_run: bool,
    pub images_found: usize,
    pub labels_found: usize,
    pub matched: usize,
    pub unmatched_images: usize,
    pub orphan_labels: usize,
    /// Sizes of the computed partition.
    pub sizes: SplitSizes,
    /// Pairs actually written per subset (equal to `sizes` unless copies failed).
    pub copied: SplitSizes,
    pub failures: Vec<ItemFailure>,
}

impl SplitReport {
    pub fn new(dataset_path: &Path, train_ratio: f64, val_ratio: f64, seed: u64) -> Self {
        Self {
            generator: GENERATOR.to_string(),
            generator_version: VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            dataset_path: dataset_path.display().to_string(),
            train_ratio,
            val_ratio,
            seed,
            dry_run: false,
            images_found: 0,
            labels_found: 0,
            matched: 0,
            unmatched_images: 0,
            orphan_labels: 0,
            sizes: SplitSizes::default(),
            copied: SplitSizes::default(),
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanEntry {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanReport {
    pub generator: String,
    pub generator_version: String,
    pub generated_at: String,
    pub labels_dir: String,
    pub images_dir: String,
    pub delete: bool,
    pub labels_scanned: usize,
    pub empty_labels: usize,
    /// Labels removed, or that would be removed in a dry run.
    pub removed: usize,
    pub entries: Vec<CleanEntry>,
    pub failures: Vec<ItemFailure>,
}

impl CleanReport {
    pub fn new(labels_dir: &Path, images_dir: &Path, delete: bool) -> Self {
        Self {
            generator: GENERATOR.to_string(),
            generator_version: VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            labels_dir: labels_dir.display().to_string(),
            images_dir: images_dir.display().to_string(),
            delete,
            labels_scanned: 0,
            empty_labels: 0,
            removed: 0,
            entries: Vec::new(),
            failures: Vec::new(),
        }
    }
}
