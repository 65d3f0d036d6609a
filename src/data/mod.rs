pub mod dataloader;
pub mod dataset;
pub mod transforms;

pub use dataloader::{SegBatch, SegmentationLoader};
pub use dataset::SegmentationDataset;
pub use transforms::{Compose, Transform, TransformedPair};

use anyhow::Result;
use burn::prelude::*;
use std::path::Path;

/// Build the (train, validation) loader pair from the four data directories.
/// The train loader shuffles; the validation loader does not.
#[allow(clippy::too_many_arguments)]
pub fn get_loaders<B: Backend>(
    train_img_dir: &Path,
    train_mask_dir: &Path,
    val_img_dir: &Path,
    val_mask_dir: &Path,
    batch_size: usize,
    train_transform: Compose,
    val_transform: Compose,
    num_workers: usize,
    pin_memory: bool,
    device: &B::Device,
) -> Result<(SegmentationLoader<B>, SegmentationLoader<B>)> {
    let train_dataset = SegmentationDataset::new(train_img_dir, train_mask_dir)?;
    let val_dataset = SegmentationDataset::new(val_img_dir, val_mask_dir)?;

    let train_loader = SegmentationLoader::new(
        train_dataset,
        train_transform,
        batch_size,
        true,
        num_workers,
        pin_memory,
        None,
        device.clone(),
    );
    let val_loader = SegmentationLoader::new(
        val_dataset,
        val_transform,
        batch_size,
        false,
        num_workers,
        pin_memory,
        None,
        device.clone(),
    );
    Ok((train_loader, val_loader))
}
