use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use corpus_prep::dataset::{is_image_path, SampleDataset};
use corpus_prep::models::Split;
use corpus_prep::report::{JsonReporter, Reporter};
use corpus_prep::splitter::{split_dataset, SplitOptions, SplitRatios};
use corpus_prep::{clean, is_empty_label, JitterConfig};

#[derive(Parser)]
#[command(name = "corpus-prep")]
#[command(author = "Artifactiq <hello@artifactiq.ai>")]
#[command(version)]
#[command(about = "Pair, split, clean and colour-augment object detection datasets")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split matched image/label pairs into train/val/test
    Split {
        /// Dataset root containing images/ and labels/
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,

        /// Fraction of pairs assigned to train
        #[arg(long, default_value = "0.7")]
        train_ratio: f64,

        /// Fraction of pairs assigned to val (test gets the rest)
        #[arg(long, default_value = "0.2")]
        val_ratio: f64,

        /// Random seed for the shuffle
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Show the split sizes without copying anything
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove empty label files and their images
    Clean {
        /// Dataset root containing images/ and labels/
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,

        /// Labels directory (default: DATASET/labels)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Images directory (default: DATASET/images)
        #[arg(long)]
        images: Option<PathBuf>,

        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Write a JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write colour-jittered copies of an image or a directory of images
    Augment {
        /// Image file or directory of images
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output image file, or directory
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// YAML file with jitter settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Hue blend strength (0 = keep, 1 = replace)
        #[arg(long)]
        hue_strength: Option<f32>,

        #[arg(long)]
        sat_min: Option<f32>,

        #[arg(long)]
        sat_max: Option<f32>,

        #[arg(long)]
        val_min: Option<f32>,

        #[arg(long)]
        val_max: Option<f32>,

        /// Augmented copies per input image
        #[arg(long, default_value = "1")]
        copies: usize,

        /// Seed for reproducible jitter (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show information about a dataset
    Info {
        /// Path to dataset
        #[arg(value_name = "DATASET")]
        dataset: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Split {
            dataset,
            train_ratio,
            val_ratio,
            seed,
            dry_run,
            output,
        } => run_split(dataset, train_ratio, val_ratio, seed, dry_run, output),
        Commands::Clean {
            dataset,
            labels,
            images,
            dry_run,
            output,
        } => run_clean(dataset, labels, images, dry_run, output),
        Commands::Augment {
            input,
            output,
            config,
            hue_strength,
            sat_min,
            sat_max,
            val_min,
            val_max,
            copies,
            seed,
        } => {
            let mut jitter = match &config {
                Some(path) => JitterConfig::from_yaml_file(path)?,
                None => JitterConfig::default(),
            };
            if let Some(s) = hue_strength {
                jitter.hue_strength = s;
            }
            jitter.saturation = (
                sat_min.unwrap_or(jitter.saturation.0),
                sat_max.unwrap_or(jitter.saturation.1),
            );
            jitter.value = (
                val_min.unwrap_or(jitter.value.0),
                val_max.unwrap_or(jitter.value.1),
            );
            run_augment(input, output, jitter, copies, seed)
        }
        Commands::Info { dataset } => run_info(dataset),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run_split(
    dataset_path: PathBuf,
    train_ratio: f64,
    val_ratio: f64,
    seed: u64,
    dry_run: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let start = Instant::now();

    println!("📂 Splitting dataset: {}", dataset_path.display());

    let options = match SplitRatios::new(train_ratio, val_ratio) {
        Ok(ratios) => SplitOptions {
            ratios,
            seed,
            dry_run,
        },
        Err(e) => {
            eprintln!("❌ {}", e);
            return Ok(());
        }
    };
    println!(
        "   Ratios: train={} val={} test={:.2} (seed={})",
        options.ratios.train,
        options.ratios.val,
        options.ratios.test(),
        seed
    );

    let report = match SampleDataset::load(&dataset_path)
        .and_then(|dataset| split_dataset(&dataset, &options))
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ {}", e);
            println!("   train: 0, val: 0, test: 0");
            return Ok(());
        }
    };

    println!();
    for split in Split::ALL {
        println!(
            "  {:<6} {:>6} planned  {:>6} copied",
            split,
            report.sizes.get(split),
            report.copied.get(split)
        );
    }
    if !report.failures.is_empty() {
        println!("  ⚠ {} pair(s) skipped after copy errors", report.failures.len());
    }
    println!();
    println!("  Time: {:.2}s", start.elapsed().as_secs_f64());

    if let Some(output_path) = &output {
        JsonReporter::new().generate(&report, output_path)?;
        println!("📄 JSON report saved: {}", output_path.display());
    }

    Ok(())
}

fn run_clean(
    dataset_path: PathBuf,
    labels: Option<PathBuf>,
    images: Option<PathBuf>,
    dry_run: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let labels_dir = labels.unwrap_or_else(|| dataset_path.join("labels"));
    let images_dir = images.unwrap_or_else(|| dataset_path.join("images"));

    println!("🧹 Scanning labels: {}", labels_dir.display());

    let report = match clean(&labels_dir, &images_dir, !dry_run) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ {}", e);
            println!("\nDone. Removed 0 empty label(s).");
            return Ok(());
        }
    };

    println!();
    if dry_run {
        println!("Done. Would remove {} empty label(s).", report.removed);
    } else {
        println!("Done. Removed {} empty label(s).", report.removed);
    }
    if !report.failures.is_empty() {
        println!("  ⚠ {} file(s) could not be read or deleted", report.failures.len());
    }

    if let Some(output_path) = &output {
        JsonReporter::new().generate(&report, output_path)?;
        println!("📄 JSON report saved: {}", output_path.display());
    }

    Ok(())
}

fn run_augment(
    input: PathBuf,
    output: PathBuf,
    config: JitterConfig,
    copies: usize,
    seed: Option<u64>,
) -> Result<()> {
    let jitter = config.build()?;
    let copies = copies.max(1);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // A single file may be written to an explicit file path; everything else
    // goes into an output directory.
    let (images, single_target) = if input.is_dir() {
        let mut images: Vec<PathBuf> = fs::read_dir(&input)
            .with_context(|| format!("Failed to read {}", input.display()))?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image_path(p))
            .collect();
        images.sort();
        (images, None)
    } else {
        let target = (is_image_path(&output) && copies == 1).then(|| output.clone());
        (vec![input.clone()], target)
    };

    let out_dir = match &single_target {
        Some(file) => file.parent().map(Path::to_path_buf).unwrap_or_default(),
        None => output.clone(),
    };
    if !out_dir.as_os_str().is_empty() {
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    }

    println!("🎨 Augmenting {} image(s) x{}", images.len(), copies);

    let pb = ProgressBar::new((images.len() * copies) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut written = 0usize;
    let mut failed = 0usize;

    for path in &images {
        let decoded = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                failed += 1;
                pb.inc(copies as u64);
                continue;
            }
        };
        if decoded.color().has_alpha() {
            log::debug!("Dropping alpha channel of {}", path.display());
        }
        let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

        for k in 1..=copies {
            let dest = match &single_target {
                Some(file) => file.clone(),
                None => out_dir.join(augmented_name(path, k, copies)),
            };
            let out = jitter.apply_dynamic(&rgb, &mut rng);
            match out.save(&dest) {
                Ok(()) => {
                    written += 1;
                    log::debug!("Wrote {}", dest.display());
                }
                Err(e) => {
                    log::warn!("Failed to write {}: {}", dest.display(), e);
                    failed += 1;
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    println!("✅ Wrote {} image(s), {} failure(s)", written, failed);
    Ok(())
}

/// `foo.png` stays `foo.png` for a single copy, otherwise `foo_aug{k}.png`.
fn augmented_name(path: &Path, k: usize, copies: usize) -> String {
    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    if copies == 1 {
        return name;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}_aug{}.{}", stem, k, ext.to_string_lossy()),
        None => format!("{}_aug{}", stem, k),
    }
}

fn run_info(dataset_path: PathBuf) -> Result<()> {
    let dataset = SampleDataset::load(&dataset_path)?;
    let pairing = dataset.pair();
    let empty = dataset
        .get_labels()
        .iter()
        .filter(|p| is_empty_label(p))
        .count();

    println!("Dataset: {}", dataset_path.display());
    println!("Images: {}", pairing.images_found);
    println!("Labels: {}", pairing.labels_found);
    println!("Matched pairs: {}", pairing.matched.len());
    println!("Images without labels: {}", pairing.unmatched_images.len());
    println!("Labels without images: {}", pairing.orphan_labels.len());
    println!("Empty labels: {}", empty);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn augmented_name_suffixes_only_for_multiple_copies() {
        let path = Path::new("in/foo.png");
        assert_eq!(augmented_name(path, 1, 1), "foo.png");
        assert_eq!(augmented_name(path, 2, 3), "foo_aug2.png");
    }

    #[test]
    fn cli_parses_split_defaults() {
        let cli = Cli::try_parse_from(["corpus-prep", "split", "data"]).expect("parse");
        match cli.command {
            Commands::Split {
                train_ratio,
                val_ratio,
                seed,
                dry_run,
                ..
            } => {
                assert_eq!(train_ratio, 0.7);
                assert_eq!(val_ratio, 0.2);
                assert_eq!(seed, 42);
                assert!(!dry_run);
            }
            _ => panic!("expected split command"),
        }
    }
}
