//! Wildfire Dataset Loader
//!
//! Indexes the `train/`, `valid/` and `test/` splits of an image-folder
//! dataset. Every split is a directory of class sub-directories; class
//! indices follow the lexicographic order of the directory names, so the
//! standard dataset maps `nowildfire -> 0` and `wildfire -> 1`.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{Result, WildfireError};

/// Split directory names, in the order they are validated
pub const SPLITS: [&str; 3] = ["train", "valid", "test"];

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

impl ImageSample {
    /// Decode the image file
    ///
    /// Truncated JPEGs decode with the missing scan data left blank, which is
    /// the decoder's own behaviour. Any other decode failure, a truncated PNG
    /// included, is an `ImageLoad` error.
    pub fn load(&self) -> Result<DynamicImage> {
        ImageReader::open(&self.path)
            .map_err(|e| WildfireError::ImageLoad(self.path.clone(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| WildfireError::ImageLoad(self.path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| WildfireError::ImageLoad(self.path.clone(), e.to_string()))
    }
}

/// One split of an image-folder dataset
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    /// Class names sorted lexicographically; index = label
    pub classes: Vec<String>,
    /// Samples ordered by class, then by file name
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Index a split directory
    ///
    /// ```text
    /// root_dir/
    /// ├── nowildfire/
    /// │   ├── -57.1,51.4.jpg
    /// │   └── ...
    /// └── wildfire/
    ///     └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        if !root_dir.is_dir() {
            return Err(WildfireError::PathNotFound(root_dir));
        }

        let classes = class_dirs(&root_dir)?;
        let mut samples = Vec::new();

        for (label, class_name) in classes.iter().enumerate() {
            let before = samples.len();
            for entry in WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.into_path();
                if is_image(&path) {
                    samples.push(ImageSample { path, label });
                }
            }
            debug!(
                "Class '{}' (label {}): {} samples",
                class_name,
                label,
                samples.len() - before
            );
        }

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Per-class sample counts, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }
}

impl Dataset<ImageSample> for ImageFolder {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// The three validated splits of a dataset root
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub root_dir: PathBuf,
    pub train: ImageFolder,
    pub valid: ImageFolder,
    pub test: ImageFolder,
}

impl DatasetLayout {
    pub fn classes(&self) -> &[String] {
        &self.train.classes
    }
}

/// Check the `train/valid/test` layout up front
///
/// Fails when a split is missing, when a split has no images, or when the
/// splits disagree on their class directories.
pub fn validate_layout<P: AsRef<Path>>(root_dir: P) -> Result<DatasetLayout> {
    let root_dir = root_dir.as_ref().to_path_buf();
    if !root_dir.is_dir() {
        return Err(WildfireError::PathNotFound(root_dir));
    }

    let mut folders = Vec::with_capacity(SPLITS.len());
    for split in SPLITS {
        let dir = root_dir.join(split);
        if !dir.is_dir() {
            return Err(WildfireError::MissingSplit {
                root: root_dir.clone(),
                split: split.to_string(),
            });
        }
        let folder = ImageFolder::new(&dir)?;
        if folder.samples.is_empty() {
            return Err(WildfireError::Config(format!(
                "split '{}' contains no images",
                split
            )));
        }
        folders.push(folder);
    }

    let expected = folders[0].classes.clone();
    if expected.len() < 2 {
        return Err(WildfireError::Config(format!(
            "expected at least 2 class directories, found {:?}",
            expected
        )));
    }
    for (split, folder) in SPLITS.iter().zip(folders.iter()).skip(1) {
        if folder.classes != expected {
            return Err(WildfireError::ClassMismatch {
                split: split.to_string(),
                expected: expected.clone(),
                found: folder.classes.clone(),
            });
        }
    }

    let mut folders = folders.into_iter();
    let (Some(train), Some(valid), Some(test)) = (folders.next(), folders.next(), folders.next())
    else {
        return Err(WildfireError::Config("dataset split indexing failed".to_string()));
    };

    info!(
        "Dataset {:?}: classes {:?} | train {} | valid {} | test {}",
        root_dir,
        expected,
        train.samples.len(),
        valid.samples.len(),
        test.samples.len()
    );

    Ok(DatasetLayout {
        root_dir,
        train,
        valid,
        test,
    })
}

fn class_dirs(root_dir: &Path) -> Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();
    Ok(classes)
}

pub(crate) fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    /// Write a tiny `train/valid/test` tree with `per_class` images per class
    pub(crate) fn write_fake_dataset(root: &Path, per_class: usize, size: u32) {
        for split in SPLITS {
            for (label, class_name) in ["nowildfire", "wildfire"].iter().enumerate() {
                let dir = root.join(split).join(class_name);
                std::fs::create_dir_all(&dir).unwrap();
                for i in 0..per_class {
                    let shade = if label == 0 { 40 } else { 220 };
                    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
                        ImageBuffer::from_fn(size, size, |x, y| {
                            Rgb([shade, ((x + y + i as u32) % 255) as u8, 255 - shade])
                        });
                    img.save(dir.join(format!("{}_{}.png", class_name, i))).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_image_folder_sorted_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 3, 8);
        std::fs::write(dir.path().join("train/wildfire/notes.txt"), "x").unwrap();

        let folder = ImageFolder::new(dir.path().join("train")).unwrap();
        assert_eq!(folder.classes, vec!["nowildfire", "wildfire"]);
        assert_eq!(folder.len(), 6);
        assert_eq!(folder.class_counts(), vec![3, 3]);
        assert_eq!(folder.get(0).unwrap().label, 0);
        assert_eq!(folder.get(5).unwrap().label, 1);
    }

    #[test]
    fn test_validate_layout_ok() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 2, 8);

        let layout = validate_layout(dir.path()).unwrap();
        assert_eq!(layout.classes(), &["nowildfire", "wildfire"]);
        assert_eq!(layout.test.len(), 4);
    }

    #[test]
    fn test_validate_layout_missing_split() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 1, 8);
        std::fs::remove_dir_all(dir.path().join("valid")).unwrap();

        let err = validate_layout(dir.path()).unwrap_err();
        assert!(matches!(err, WildfireError::MissingSplit { ref split, .. } if split == "valid"));
    }

    #[test]
    fn test_validate_layout_class_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 1, 8);
        std::fs::rename(
            dir.path().join("test/wildfire"),
            dir.path().join("test/smoke"),
        )
        .unwrap();

        let err = validate_layout(dir.path()).unwrap_err();
        assert!(matches!(err, WildfireError::ClassMismatch { ref split, .. } if split == "test"));
    }

    #[test]
    fn test_unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let sample = ImageSample { path, label: 1 };
        assert!(matches!(sample.load(), Err(WildfireError::ImageLoad(_, _))));
    }

    #[test]
    fn test_truncated_jpeg_still_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("full.jpg");
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        img.save(&full).unwrap();

        let bytes = std::fs::read(&full).unwrap();
        let path = dir.path().join("cut.jpg");
        std::fs::write(&path, &bytes[..bytes.len() * 3 / 4]).unwrap();

        let decoded = ImageSample { path, label: 1 }.load().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }
}
