//! Dataset discovery and image/label pairing

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};
use crate::models::SamplePair;

/// Recognized image extensions, in lookup priority order.
pub const IMAGE_EXTS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub const LABEL_EXT: &str = "txt";

/// Position of the extension in [`IMAGE_EXTS`], ignoring case.
fn extension_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    IMAGE_EXTS.iter().position(|known| *known == ext)
}

pub fn is_image_path(path: &Path) -> bool {
    extension_rank(path).is_some()
}

pub fn is_label_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == LABEL_EXT)
}

/// Keep one image per stem. On a collision the extension earliest in
/// [`IMAGE_EXTS`] wins; the losers come back in the second list.
fn pick_by_stem(images: Vec<PathBuf>) -> (HashMap<String, PathBuf>, Vec<PathBuf>) {
    let mut chosen: HashMap<String, PathBuf> = HashMap::new();
    let mut shadowed = Vec::new();

    for image in images {
        match chosen.entry(stem_of(&image)) {
            Entry::Vacant(slot) => {
                slot.insert(image);
            }
            Entry::Occupied(mut slot) => {
                let skipped = if extension_rank(&image) < extension_rank(slot.get()) {
                    slot.insert(image)
                } else {
                    image
                };
                log::warn!(
                    "Duplicate image for stem '{}', skipping {}",
                    slot.key(),
                    skipped.display()
                );
                shadowed.push(skipped);
            }
        }
    }

    shadowed.sort();
    (chosen, shadowed)
}

/// Images in `images_dir` keyed by stem, with extensions matched
/// case-insensitively and collisions resolved by [`IMAGE_EXTS`] priority.
pub fn index_images(images_dir: &Path) -> HashMap<String, PathBuf> {
    pick_by_stem(list_files(images_dir, is_image_path)).0
}

pub(crate) fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Sorted regular files in `dir` accepted by `keep`. An unreadable directory
/// yields nothing.
fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && keep(&path) {
                    files.push(path);
                }
            }
        }
        Err(e) => log::warn!("Failed to list {}: {}", dir.display(), e),
    }

    files.sort();
    files
}

/// Result of matching `images/` against `labels/`.
#[derive(Debug, Default)]
pub struct Pairing {
    pub images_found: usize,
    pub labels_found: usize,
    pub matched: Vec<SamplePair>,
    pub unmatched_images: Vec<PathBuf>,
    pub orphan_labels: Vec<PathBuf>,
}

pub struct SampleDataset {
    pub root: PathBuf,
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl SampleDataset {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(PrepError::MissingDirectory {
                what: "dataset root",
                path: path.to_path_buf(),
            });
        }

        let images_dir = path.join("images");
        let labels_dir = path.join("labels");

        for (what, dir) in [("images directory", &images_dir), ("labels directory", &labels_dir)] {
            if !dir.is_dir() {
                return Err(PrepError::MissingDirectory {
                    what,
                    path: dir.clone(),
                });
            }
        }

        Ok(Self {
            root: path.to_path_buf(),
            images_dir,
            labels_dir,
        })
    }

    pub fn get_images(&self) -> Vec<PathBuf> {
        list_files(&self.images_dir, is_image_path)
    }

    pub fn get_labels(&self) -> Vec<PathBuf> {
        list_files(&self.labels_dir, is_label_path)
    }

    /// Match every image with the same-stem label. The matched list comes out
    /// in sorted image-path order, so it depends only on directory content.
    pub fn pair(&self) -> Pairing {
        let images = self.get_images();
        let images_found = images.len();
        let (chosen, shadowed) = pick_by_stem(images);

        let mut labels: HashMap<String, PathBuf> = self
            .get_labels()
            .into_iter()
            .map(|p| (stem_of(&p), p))
            .collect();

        let mut pairing = Pairing {
            images_found,
            labels_found: labels.len(),
            unmatched_images: shadowed,
            ..Pairing::default()
        };

        for (stem, image) in chosen {
            match labels.remove(&stem) {
                Some(label) => pairing.matched.push(SamplePair { stem, image, label }),
                None => pairing.unmatched_images.push(image),
            }
        }

        pairing.matched.sort_by(|a, b| a.image.cmp(&b.image));
        pairing.unmatched_images.sort();
        pairing.orphan_labels = labels.into_values().collect();
        pairing.orphan_labels.sort();

        pairing
    }
}
