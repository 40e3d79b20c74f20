//! Object detection corpus preparation.
//!
//! - [`cleaner`] drops samples whose label file is empty.
//! - [`splitter`] pairs images with labels and writes a reproducible
//!   train/val/test split.
//! - [`augment`] applies HSV colour jitter to single images.

pub mod augment;
pub mod cleaner;
pub mod dataset;
pub mod error;
pub mod models;
pub mod report;
pub mod splitter;

pub use augment::{augment, ColourJitter, JitterConfig};
pub use cleaner::{clean, is_empty_label};
pub use dataset::SampleDataset;
pub use error::PrepError;
pub use splitter::{split, SplitOptions, SplitRatios};
