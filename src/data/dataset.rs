use std::path::Path;

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::idx;
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::architecture::{INPUT_FEATURES, OUTPUT_CLASSES};

/// Which MNIST split to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
            Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
        }
    }
}

/// Labelled 28×28 grayscale images kept as raw bytes.
///
/// Pixels are scaled to `[0, 1]` only when a batch is materialized, so a full
/// MNIST split costs one byte per pixel in memory.
#[derive(Debug, Clone)]
pub struct Dataset {
    pixels: Vec<u8>,
    labels: Vec<u8>,
}

/// One mini-batch: images as `[batch, 784]` and one class index per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: Matrix,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Dataset {
    /// Wraps already decoded samples: 784 pixels per label, labels in 0..10.
    pub fn from_parts(pixels: Vec<u8>, labels: Vec<u8>) -> Result<Dataset> {
        if pixels.len() != labels.len() * INPUT_FEATURES {
            return Err(Error::dataset(format!(
                "{} labels need {} pixels, got {}",
                labels.len(),
                labels.len() * INPUT_FEATURES,
                pixels.len()
            )));
        }
        if let Some((i, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, l)| **l as usize >= OUTPUT_CLASSES)
        {
            return Err(Error::dataset(format!(
                "label at index {} is {}, expected 0..{}",
                i, label, OUTPUT_CLASSES
            )));
        }
        Ok(Dataset { pixels, labels })
    }

    /// Decodes an IDX image/label file pair.
    pub fn from_idx_bytes(image_bytes: &[u8], label_bytes: &[u8]) -> Result<Dataset> {
        let images = idx::parse_images(image_bytes)?;
        let labels = idx::parse_labels(label_bytes)?;

        if images.rows * images.cols != INPUT_FEATURES {
            return Err(Error::dataset(format!(
                "expected 28×28 images ({} pixels), got {}×{}",
                INPUT_FEATURES, images.rows, images.cols
            )));
        }
        if images.count != labels.len() {
            return Err(Error::dataset(format!(
                "image file declares {} items but label file declares {}",
                images.count,
                labels.len()
            )));
        }
        Dataset::from_parts(images.pixels, labels)
    }

    /// Reads one MNIST split from `dir`, which must hold the four standard
    /// uncompressed IDX files.
    pub fn load_mnist(dir: impl AsRef<Path>, split: Split) -> Result<Dataset> {
        let dir = dir.as_ref();
        let (images_name, labels_name) = split.file_names();
        let image_bytes = std::fs::read(dir.join(images_name))?;
        let label_bytes = std::fs::read(dir.join(labels_name))?;
        let dataset = Dataset::from_idx_bytes(&image_bytes, &label_bytes)?;
        info!(
            "loaded {} {:?} samples from {}",
            dataset.len(),
            split,
            dir.display()
        );
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Batches in storage order; the final batch may be short.
    pub fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            dataset: self,
            order: (0..self.len()).collect(),
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Batches over a fresh permutation drawn from `rng`.
    pub fn shuffled_batches<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        Batches {
            dataset: self,
            order,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    fn materialize(&self, indices: &[usize]) -> Batch {
        let mut data = Vec::with_capacity(indices.len() * INPUT_FEATURES);
        for &i in indices {
            let sample = &self.pixels[i * INPUT_FEATURES..(i + 1) * INPUT_FEATURES];
            data.extend(sample.iter().map(|&px| px as f64 / 255.0));
        }
        Batch {
            images: Matrix::from_vec(indices.len(), INPUT_FEATURES, data)
                .unwrap_or_default(),
            labels: indices.iter().map(|&i| self.labels[i] as usize).collect(),
        }
    }
}

/// Sequential supplier of mini-batches over a [`Dataset`].
pub struct Batches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.dataset.materialize(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::idx::tests::{image_file, label_file};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny(n: usize) -> Dataset {
        let pixels = (0..n * INPUT_FEATURES).map(|i| (i / INPUT_FEATURES) as u8).collect();
        let labels = (0..n).map(|i| (i % 10) as u8).collect();
        Dataset::from_parts(pixels, labels).unwrap()
    }

    #[test]
    fn sequential_batches_keep_order_and_short_tail() {
        let ds = tiny(5);
        let batches: Vec<Batch> = ds.batches(2).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].labels, vec![0, 1]);
        assert_eq!(batches[2].labels, vec![4]);
        assert_eq!(batches[0].images.shape(), vec![2, 784]);
        assert_eq!(batches[0].images.get(1, 0), 1.0 / 255.0);
    }

    #[test]
    fn shuffled_batches_are_a_seeded_permutation() {
        let ds = tiny(20);
        let a: Vec<usize> = ds
            .shuffled_batches(3, &mut StdRng::seed_from_u64(42))
            .flat_map(|b| b.labels)
            .collect();
        let b: Vec<usize> = ds
            .shuffled_batches(3, &mut StdRng::seed_from_u64(42))
            .flat_map(|b| b.labels)
            .collect();
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        let mut expected: Vec<usize> = (0..20).map(|i| i % 10).collect();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn from_parts_validates() {
        assert!(Dataset::from_parts(vec![0; 783], vec![1]).is_err());
        assert!(Dataset::from_parts(vec![0; 784], vec![10]).is_err());
    }

    #[test]
    fn loads_split_files_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = vec![255u8; 2 * 784];
        std::fs::write(dir.path().join("t10k-images-idx3-ubyte"), image_file(2, 28, 28, &pixels)).unwrap();
        std::fs::write(dir.path().join("t10k-labels-idx1-ubyte"), label_file(&[7, 2])).unwrap();

        let ds = Dataset::load_mnist(dir.path(), Split::Test).unwrap();
        assert_eq!(ds.len(), 2);
        let batch = ds.batches(8).next().unwrap();
        assert_eq!(batch.labels, vec![7, 2]);
        assert_eq!(batch.images.get(0, 0), 1.0);

        assert!(Dataset::load_mnist(dir.path(), Split::Train).is_err());
    }

    #[test]
    fn rejects_non_mnist_geometry() {
        let err = Dataset::from_idx_bytes(&image_file(1, 2, 2, &[0; 4]), &label_file(&[0]));
        assert!(err.is_err());
    }
}
