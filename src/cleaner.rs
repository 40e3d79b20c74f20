//! Removal of empty label files and their paired images
//!
//! Labels produced by automatic annotation can come out empty when the model
//! missed the object. Training on those teaches the detector that the object
//! is absent, so such samples are dropped before splitting.

use std::fs;
use std::io;
use std::path::Path;

use crate::dataset::{index_images, is_label_path, stem_of};
use crate::error::{PrepError, Result};
use crate::models::{CleanEntry, CleanReport, ItemFailure, ItemOperation};

/// Emptiness check that surfaces read errors to the caller.
fn check_label(path: &Path) -> io::Result<bool> {
    if fs::metadata(path)?.len() == 0 {
        return Ok(true);
    }
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).trim().is_empty())
}

/// True if the label has zero length or holds only whitespace. Unreadable
/// labels count as non-empty.
pub fn is_empty_label(path: &Path) -> bool {
    check_label(path).unwrap_or(false)
}

/// Scan `labels_dir` for empty labels and remove each one together with its
/// image. With `delete == false` nothing is touched and the report lists what
/// would have been removed.
pub fn clean(labels_dir: &Path, images_dir: &Path, delete: bool) -> Result<CleanReport> {
    for (what, dir) in [("labels directory", labels_dir), ("images directory", images_dir)] {
        if !dir.is_dir() {
            return Err(PrepError::MissingDirectory {
                what,
                path: dir.to_path_buf(),
            });
        }
    }

    let mut report = CleanReport::new(labels_dir, images_dir, delete);

    let entries = fs::read_dir(labels_dir).map_err(|source| PrepError::Io {
        path: labels_dir.to_path_buf(),
        source,
    })?;
    let mut labels: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_label_path(p))
        .collect();
    labels.sort();

    let mut images = index_images(images_dir);

    for label in labels {
        report.labels_scanned += 1;

        match check_label(&label) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                log::warn!("Skipping unreadable label {}: {}", label.display(), e);
                report
                    .failures
                    .push(ItemFailure::new(&label, ItemOperation::Read, &e));
                continue;
            }
        }

        report.empty_labels += 1;
        let image = images.remove(&stem_of(&label));
        let label_name = file_name(&label);
        let image_name = image.as_deref().map(file_name);

        if !delete {
            match &image_name {
                Some(img) => println!("Would remove: {} and {}", label_name, img),
                None => println!("Would remove: {} (no matching image)", label_name),
            }
            report.removed += 1;
            report.entries.push(CleanEntry {
                label: label_name,
                image: image_name,
                removed: false,
            });
            continue;
        }

        // The image goes first: if it cannot be deleted the label stays too,
        // so the pair survives intact for the next run.
        let image_gone = match &image {
            Some(img) => match fs::remove_file(img) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", img.display(), e);
                    report
                        .failures
                        .push(ItemFailure::new(img, ItemOperation::Delete, &e));
                    false
                }
            },
            None => true,
        };

        let removed = image_gone
            && match fs::remove_file(&label) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", label.display(), e);
                    report
                        .failures
                        .push(ItemFailure::new(&label, ItemOperation::Delete, &e));
                    false
                }
            };

        if removed {
            report.removed += 1;
            log::info!("Removed empty label: {}", label_name);
        }
        report.entries.push(CleanEntry {
            label: label_name,
            image: image_name,
            removed,
        });
    }

    Ok(report)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default()
}
