//! Deterministic train/val/test partitioning
//!
//! Matched pairs are shuffled with an explicitly seeded generator and sliced
//! by ratio. The same seed over the same set of pairs always yields the same
//! partition, so a split can be regenerated at any time.

use std::fs;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::dataset::SampleDataset;
use crate::error::{PrepError, Result};
use crate::models::{ItemFailure, ItemOperation, SamplePair, Split, SplitReport, SplitSizes};

/// Emit a progress line every this many copied pairs.
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
}

impl SplitRatios {
    pub fn new(train: f64, val: f64) -> Result<Self> {
        let invalid = |reason| PrepError::InvalidRatios { train, val, reason };

        if !train.is_finite() || !val.is_finite() {
            return Err(invalid("ratios must be finite"));
        }
        if train < 0.0 || val < 0.0 {
            return Err(invalid("ratios must be non-negative"));
        }

        Ok(Self { train, val })
    }

    pub fn test(&self) -> f64 {
        (1.0 - self.train - self.val).max(0.0)
    }

    /// Subset sizes for `n` pairs. Train and val are floored; test takes the
    /// remainder. Ratios summing past 1.0 leave test empty and cut val short.
    pub fn sizes(&self, n: usize) -> SplitSizes {
        let train = ((self.train * n as f64).floor() as usize).min(n);
        let val = ((self.val * n as f64).floor() as usize).min(n - train);
        SplitSizes {
            train,
            val,
            test: n - train - val,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitAssignment {
    pub train: Vec<SamplePair>,
    pub val: Vec<SamplePair>,
    pub test: Vec<SamplePair>,
}

impl SplitAssignment {
    pub fn get(&self, split: Split) -> &[SamplePair] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            val: self.val.len(),
            test: self.test.len(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Split, &[SamplePair])> {
        Split::ALL.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// Shuffle `pairs` with `rng` and slice them into train/val/test.
pub fn plan<R: Rng + ?Sized>(
    mut pairs: Vec<SamplePair>,
    ratios: SplitRatios,
    rng: &mut R,
) -> SplitAssignment {
    pairs.shuffle(rng);

    let sizes = ratios.sizes(pairs.len());
    let test = pairs.split_off(sizes.train + sizes.val);
    let val = pairs.split_off(sizes.train);

    SplitAssignment {
        train: pairs,
        val,
        test,
    }
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub ratios: SplitRatios,
    pub seed: u64,
    /// Plan only; do not create directories or copy files.
    pub dry_run: bool,
}

/// Pair, partition and materialize the dataset rooted at `dataset_root`.
pub fn split(dataset_root: &Path, train_ratio: f64, val_ratio: f64, seed: u64) -> Result<SplitReport> {
    let dataset = SampleDataset::load(dataset_root)?;
    let options = SplitOptions {
        ratios: SplitRatios::new(train_ratio, val_ratio)?,
        seed,
        dry_run: false,
    };
    split_dataset(&dataset, &options)
}

pub fn split_dataset(dataset: &SampleDataset, options: &SplitOptions) -> Result<SplitReport> {
    let mut report = SplitReport::new(
        &dataset.root,
        options.ratios.train,
        options.ratios.val,
        options.seed,
    );
    report.dry_run = options.dry_run;

    let pairing = dataset.pair();
    report.images_found = pairing.images_found;
    report.labels_found = pairing.labels_found;
    report.matched = pairing.matched.len();
    report.unmatched_images = pairing.unmatched_images.len();
    report.orphan_labels = pairing.orphan_labels.len();

    println!("Found {} images", report.images_found);
    println!("Found {} labels", report.labels_found);
    println!("Matched {} image-label pairs", report.matched);
    if report.unmatched_images > 0 {
        println!("Skipped {} images without labels", report.unmatched_images);
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let assignment = plan(pairing.matched, options.ratios, &mut rng);
    report.sizes = assignment.sizes();

    if options.dry_run {
        for (split, items) in assignment.iter() {
            println!("Would copy {} samples to {} set", items.len(), split);
        }
        return Ok(report);
    }

    let (copied, failures) = materialize(&dataset.root, &assignment)?;
    report.copied = copied;
    report.failures = failures;

    Ok(report)
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Copy every assigned pair into `<root>/<split>/{images,labels}/`. A pair
/// whose copy fails is skipped; the rest still go through.
pub fn materialize(root: &Path, assignment: &SplitAssignment) -> Result<(SplitSizes, Vec<ItemFailure>)> {
    let mut copied = SplitSizes::default();
    let mut failures = Vec::new();
    let pb = progress_bar(assignment.sizes().total());

    for (split, items) in assignment.iter() {
        let img_dir = root.join(split.as_str()).join("images");
        let lbl_dir = root.join(split.as_str()).join("labels");

        for dir in [&img_dir, &lbl_dir] {
            fs::create_dir_all(dir).map_err(|source| PrepError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }

        pb.suspend(|| println!("Copying {} samples to {} set", items.len(), split));

        for (i, pair) in items.iter().enumerate() {
            match copy_pair(pair, &img_dir, &lbl_dir) {
                Ok(()) => {
                    *copied.get_mut(split) += 1;
                    log::debug!("{}: copied {}", split, pair.stem);
                }
                Err(failure) => {
                    log::warn!(
                        "{}: failed to {} {}: {}",
                        split,
                        failure.operation,
                        failure.path,
                        failure.message
                    );
                    failures.push(failure);
                }
            }

            let done = i + 1;
            if done % PROGRESS_EVERY == 0 || done == items.len() {
                pb.suspend(|| println!("  {}: {}/{} copied", split, done, items.len()));
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    Ok((copied, failures))
}

fn copy_pair(pair: &SamplePair, img_dir: &Path, lbl_dir: &Path) -> std::result::Result<(), ItemFailure> {
    let copy = |src: &Path, dir: &Path| -> std::result::Result<std::path::PathBuf, ItemFailure> {
        let dest = dir.join(src.file_name().unwrap_or_default());
        fs::copy(src, &dest)
            .map(|_| dest)
            .map_err(|e| ItemFailure::new(src, ItemOperation::Copy, &e))
    };

    let image_copy = copy(&pair.image, img_dir)?;
    if let Err(failure) = copy(&pair.label, lbl_dir) {
        // Don't leave an image in the split without its label.
        if let Err(e) = fs::remove_file(&image_copy) {
            log::warn!("Failed to remove partial copy {}: {}", image_copy.display(), e);
        }
        return Err(failure);
    }
    Ok(())
}
