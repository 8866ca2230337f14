//! Prefetching batch loader
//!
//! A producer thread decodes (and, for training, augments) each batch on a
//! rayon pool of `workers` threads and hands finished batches to the control
//! thread through a bounded channel. Tensors are assembled on the consumer
//! side, so backends never cross threads.
//!
//! Order is reproducible: the training split is shuffled per epoch from the
//! run seed, validation/test keep the dataset order, and augmentation
//! randomness is derived from `(seed, epoch, position)` rather than from
//! which worker happens to decode a sample.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use super::augmentation::Augmenter;
use super::burn_dataset::{WildfireBatch, WildfireBatcher, WildfireItem};
use super::loader::{ImageFolder, ImageSample};
use crate::utils::error::{Result, WildfireError};

/// Batch loader over one dataset split
#[derive(Clone)]
pub struct BatchLoader {
    folder: Arc<ImageFolder>,
    augmenter: Augmenter,
    pool: Arc<rayon::ThreadPool>,
    batch_size: usize,
    workers: usize,
    shuffle: bool,
    augment: bool,
    seed: u64,
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("root_dir", &self.folder.root_dir)
            .field("samples", &self.folder.samples.len())
            .field("batch_size", &self.batch_size)
            .field("workers", &self.workers)
            .field("shuffle", &self.shuffle)
            .field("augment", &self.augment)
            .finish()
    }
}

impl BatchLoader {
    /// Shuffled, augmented loader for the training split
    pub fn train(
        folder: ImageFolder,
        augmenter: Augmenter,
        batch_size: usize,
        workers: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::build(folder, augmenter, batch_size, workers, seed, true)
    }

    /// Fixed-order, resize-only loader for validation and test splits
    pub fn eval(
        folder: ImageFolder,
        image_size: usize,
        batch_size: usize,
        workers: usize,
    ) -> Result<Self> {
        let augmenter = Augmenter::no_augmentation(image_size as u32);
        Self::build(folder, augmenter, batch_size, workers, 0, false)
    }

    fn build(
        folder: ImageFolder,
        augmenter: Augmenter,
        batch_size: usize,
        workers: usize,
        seed: u64,
        training: bool,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(WildfireError::Config("batch_size must be > 0".to_string()));
        }
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("wildfire-decode-{}", i))
            .build()
            .map_err(|e| WildfireError::Config(format!("failed to build decode pool: {}", e)))?;

        Ok(Self {
            folder: Arc::new(folder),
            augmenter,
            pool: Arc::new(pool),
            batch_size,
            workers,
            shuffle: training,
            augment: training,
            seed,
        })
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    /// Number of samples in the split
    pub fn len(&self) -> usize {
        self.folder.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder.samples.is_empty()
    }

    /// Number of batches per pass, counting a final partial batch
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    fn epoch_seed(&self, epoch: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(epoch as u64)
    }

    /// Sample indices in the order they are served for `epoch`
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.epoch_seed(epoch));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Start decoding one pass over the split
    pub fn epoch(&self, epoch: usize) -> Result<BatchStream> {
        let order = self.epoch_order(epoch);
        let expected = self.num_batches();
        let (sender, receiver) = mpsc::sync_channel(self.workers);

        let folder = Arc::clone(&self.folder);
        let pool = Arc::clone(&self.pool);
        let augmenter = self.augmenter.clone();
        let augment_seed = self.augment.then(|| self.epoch_seed(epoch));
        let batch_size = self.batch_size;

        thread::Builder::new()
            .name("wildfire-loader".to_string())
            .spawn(move || {
                for (batch_idx, chunk) in order.chunks(batch_size).enumerate() {
                    let start = batch_idx * batch_size;
                    let items: Result<Vec<WildfireItem>> = pool.install(|| {
                        chunk
                            .par_iter()
                            .enumerate()
                            .map(|(offset, &index)| {
                                let rng = augment_seed.map(|seed| {
                                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                                    rng.set_stream((start + offset) as u64);
                                    rng
                                });
                                decode_sample(&folder.samples[index], &augmenter, rng)
                            })
                            .collect()
                    });

                    let failed = items.is_err();
                    if sender.send(items).is_err() || failed {
                        break;
                    }
                }
            })?;

        debug!("Started loader pass {} ({} batches)", epoch, expected);

        Ok(BatchStream {
            receiver,
            received: 0,
            expected,
        })
    }

    /// One pass as tensors on `device`
    pub fn batches<B: Backend>(
        &self,
        epoch: usize,
        batcher: &WildfireBatcher,
        device: &B::Device,
    ) -> Result<impl Iterator<Item = Result<WildfireBatch<B>>>> {
        let stream = self.epoch(epoch)?;
        let batcher = batcher.clone();
        let device = device.clone();
        Ok(stream.map(move |items| {
            items.map(|items| {
                <WildfireBatcher as Batcher<B, WildfireItem, WildfireBatch<B>>>::batch(
                    &batcher, items, &device,
                )
            })
        }))
    }
}

fn decode_sample(
    sample: &ImageSample,
    augmenter: &Augmenter,
    rng: Option<ChaCha8Rng>,
) -> Result<WildfireItem> {
    let img = sample.load()?;
    let image = match rng {
        Some(mut rng) => augmenter.preprocess(img, Some(&mut rng)),
        None => augmenter.preprocess(img, None),
    };
    Ok(WildfireItem {
        image,
        label: sample.label,
    })
}

/// Decoded batches of one pass, in order
pub struct BatchStream {
    receiver: Receiver<Result<Vec<WildfireItem>>>,
    received: usize,
    expected: usize,
}

impl Iterator for BatchStream {
    type Item = Result<Vec<WildfireItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.received >= self.expected {
            return None;
        }
        match self.receiver.recv() {
            Ok(batch) => {
                self.received += 1;
                if batch.is_err() {
                    // The producer stops after an error
                    self.expected = self.received;
                }
                Some(batch)
            }
            Err(_) => {
                let missing = self.expected - self.received;
                self.expected = self.received;
                Some(Err(WildfireError::Config(format!(
                    "loader thread stopped with {} batches outstanding",
                    missing
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::burn_dataset::Normalization;
    use crate::dataset::loader::tests::write_fake_dataset;
    use burn_ndarray::NdArray;

    fn train_loader(root: &std::path::Path, batch_size: usize, seed: u64) -> BatchLoader {
        let folder = ImageFolder::new(root.join("train")).unwrap();
        let augmenter = Augmenter::new(AugmentationConfig::default(), 16);
        BatchLoader::train(folder, augmenter, batch_size, 2, seed).unwrap()
    }

    #[test]
    fn test_num_batches_counts_partial() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 5, 20);
        let loader = train_loader(dir.path(), 4, 42);

        assert_eq!(loader.len(), 10);
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<usize> = loader
            .epoch(1)
            .unwrap()
            .map(|batch| batch.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_shuffle_is_seeded_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 5, 20);
        let a = train_loader(dir.path(), 4, 42);
        let b = train_loader(dir.path(), 4, 42);

        assert_eq!(a.epoch_order(1), b.epoch_order(1));
        assert_ne!(a.epoch_order(1), a.epoch_order(2));

        let mut sorted = a.epoch_order(3);
        sorted.sort();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_augmented_pass_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 3, 24);
        let a = train_loader(dir.path(), 3, 7);
        let b = train_loader(dir.path(), 3, 7);

        let first: Vec<Vec<f32>> = a
            .epoch(1)
            .unwrap()
            .flat_map(|batch| batch.unwrap().into_iter().map(|item| item.image))
            .collect();
        let second: Vec<Vec<f32>> = b
            .epoch(1)
            .unwrap()
            .flat_map(|batch| batch.unwrap().into_iter().map(|item| item.image))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_eval_keeps_dataset_order() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 3, 20);
        let folder = ImageFolder::new(dir.path().join("valid")).unwrap();
        let loader = BatchLoader::eval(folder, 16, 4, 2).unwrap();

        let labels: Vec<usize> = loader
            .epoch(0)
            .unwrap()
            .flat_map(|batch| batch.unwrap().into_iter().map(|item| item.label))
            .collect();
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_unreadable_image_aborts_pass() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 2, 20);
        std::fs::write(dir.path().join("valid/wildfire/zz_broken.png"), b"garbage").unwrap();
        let folder = ImageFolder::new(dir.path().join("valid")).unwrap();
        let loader = BatchLoader::eval(folder, 16, 10, 2).unwrap();

        let results: Vec<_> = loader.epoch(0).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(WildfireError::ImageLoad(_, _))));
    }

    #[test]
    fn test_tensor_batches() {
        let dir = tempfile::tempdir().unwrap();
        write_fake_dataset(dir.path(), 2, 20);
        let folder = ImageFolder::new(dir.path().join("test")).unwrap();
        let loader = BatchLoader::eval(folder, 16, 3, 1).unwrap();
        let batcher = WildfireBatcher::new(16, Normalization::ImageNet);
        let device = Default::default();

        let batches: Vec<WildfireBatch<NdArray>> = loader
            .batches::<NdArray>(0, &batcher, &device)
            .unwrap()
            .map(|batch| batch.unwrap())
            .collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].images.dims(), [3, 3, 16, 16]);
        assert_eq!(batches[1].targets.dims(), [1, 1]);
    }
}
