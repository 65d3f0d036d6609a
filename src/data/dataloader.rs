use crate::data::dataset::SegmentationDataset;
use crate::data::transforms::Compose;
use burn::prelude::*;
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One training batch: images `[N, 3, H, W]` and float masks `[N, H, W]`.
pub struct SegBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub masks: Tensor<B, 3>,
    pub batch_size: usize,
}

/// Iterator over [`SegBatch`]es: decodes (image, mask) pairs, runs the
/// transform pipeline per sample, and assembles device tensors.
pub struct SegmentationLoader<B: Backend> {
    dataset: SegmentationDataset,
    transform: Compose,
    batch_size: usize,
    shuffle: bool,
    num_workers: usize,
    device: B::Device,
    indices: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl<B: Backend> SegmentationLoader<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dataset: SegmentationDataset,
        transform: Compose,
        batch_size: usize,
        shuffle: bool,
        num_workers: usize,
        pin_memory: bool,
        seed: Option<u64>,
        device: B::Device,
    ) -> Self {
        if pin_memory {
            // Host-memory pinning is a device-transfer concern the CPU
            // backend has no equivalent for; accepted for config parity.
            log::debug!("pin_memory requested; no-op on this backend");
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        if shuffle {
            indices.shuffle(&mut rng);
        }
        Self {
            dataset,
            transform,
            batch_size: batch_size.max(1),
            shuffle,
            num_workers: num_workers.max(1),
            device,
            indices,
            cursor: 0,
            rng,
        }
    }

    /// Number of batches per pass.
    pub fn len(&self) -> usize {
        (self.dataset.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Rewind for another pass, reshuffling if enabled.
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    fn decode(&self, batch_indices: &[usize]) -> Vec<anyhow::Result<(DynamicImage, DynamicImage)>> {
        if self.num_workers <= 1 || batch_indices.len() <= 1 {
            return batch_indices.iter().map(|&i| self.dataset.get(i)).collect();
        }
        let chunk = (batch_indices.len() + self.num_workers - 1) / self.num_workers;
        std::thread::scope(|scope| {
            let handles: Vec<_> = batch_indices
                .chunks(chunk)
                .map(|ids| {
                    let dataset = &self.dataset;
                    scope.spawn(move || ids.iter().map(|&i| dataset.get(i)).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("loader worker panicked"))
                .collect()
        })
    }
}

impl<B: Backend> Iterator for SegmentationLoader<B> {
    type Item = SegBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.indices.len() {
            let end = (self.cursor + self.batch_size).min(self.indices.len());
            let batch_indices: Vec<usize> = self.indices[self.cursor..end].to_vec();
            self.cursor = end;

            let pairs = self.decode(&batch_indices);

            let mut image_buf: Vec<f32> = Vec::new();
            let mut mask_buf: Vec<f32> = Vec::new();
            let mut count = 0usize;
            let mut height = 0usize;
            let mut width = 0usize;

            for pair in pairs {
                let (img, mask) = match pair {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("skipping unreadable sample: {e}");
                        continue;
                    }
                };
                let out = self.transform.apply(&mut self.rng, &img, &mask);
                if count == 0 {
                    height = out.height;
                    width = out.width;
                }
                image_buf.extend_from_slice(&out.image);
                mask_buf.extend_from_slice(&out.mask);
                count += 1;
            }

            if count == 0 {
                continue;
            }

            let images = Tensor::<B, 4>::from_data(
                TensorData::new(image_buf, [count, 3, height, width]),
                &self.device,
            );
            let masks = Tensor::<B, 3>::from_data(
                TensorData::new(mask_buf, [count, height, width]),
                &self.device,
            );

            return Some(SegBatch {
                images,
                masks,
                batch_size: count,
            });
        }
        None
    }
}
