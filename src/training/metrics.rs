use crate::data::SegmentationLoader;
use crate::model::Unet;
use anyhow::Result;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use std::path::Path;

const DICE_EPS: f32 = 1e-8;

/// Validation-set quality summary.
#[derive(Debug, Clone, Copy)]
pub struct SegmentationMetrics {
    /// Fraction of pixels whose thresholded prediction matches the mask.
    pub pixel_accuracy: f32,
    /// Mean per-batch Dice coefficient of the foreground class.
    pub dice_score: f32,
    pub num_batches: usize,
}

/// Threshold sigmoid(logits) at 0.5 and compare against the masks across the
/// whole loader.
pub fn check_accuracy<B: Backend>(
    loader: SegmentationLoader<B>,
    model: &Unet<B>,
) -> SegmentationMetrics {
    let mut correct = 0.0f64;
    let mut total = 0.0f64;
    let mut dice_sum = 0.0f64;
    let mut num_batches = 0usize;

    for batch in loader {
        let targets: Tensor<B, 4> = batch.masks.unsqueeze_dim(1);
        let preds = sigmoid(model.forward(batch.images))
            .greater_equal_elem(0.5)
            .float();

        let numel: usize = preds.dims().iter().product();
        correct += preds
            .clone()
            .equal(targets.clone())
            .float()
            .sum()
            .into_scalar()
            .elem::<f32>() as f64;
        total += numel as f64;

        let intersection = (preds.clone() * targets.clone())
            .sum()
            .into_scalar()
            .elem::<f32>();
        let denom =
            preds.sum().into_scalar().elem::<f32>() + targets.sum().into_scalar().elem::<f32>();
        dice_sum += ((2.0 * intersection + DICE_EPS) / (denom + DICE_EPS)) as f64;
        num_batches += 1;
    }

    SegmentationMetrics {
        pixel_accuracy: if total > 0.0 {
            (correct / total) as f32
        } else {
            0.0
        },
        dice_score: if num_batches > 0 {
            (dice_sum / num_batches as f64) as f32
        } else {
            0.0
        },
        num_batches,
    }
}

/// Dump thresholded predictions (and the ground-truth masks next to them) as
/// PNG files: `pred_<batch>_<item>.png` / `gt_<batch>_<item>.png`.
pub fn save_predictions_as_imgs<B: Backend>(
    loader: SegmentationLoader<B>,
    model: &Unet<B>,
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    for (batch_idx, batch) in loader.enumerate() {
        let [n, _, height, width] = batch.images.dims();
        let preds: Vec<f32> = sigmoid(model.forward(batch.images))
            .greater_equal_elem(0.5)
            .float()
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("failed to read predictions: {e:?}"))?;
        let masks: Vec<f32> = batch
            .masks
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("failed to read masks: {e:?}"))?;

        let pixels = height * width;
        for item in 0..n {
            let offset = item * pixels;
            write_mask_png(
                &preds[offset..offset + pixels],
                width as u32,
                height as u32,
                &dir.join(format!("pred_{batch_idx}_{item}.png")),
            )?;
            write_mask_png(
                &masks[offset..offset + pixels],
                width as u32,
                height as u32,
                &dir.join(format!("gt_{batch_idx}_{item}.png")),
            )?;
        }
    }
    Ok(())
}

fn write_mask_png(values: &[f32], width: u32, height: u32, path: &Path) -> Result<()> {
    let img = image::GrayImage::from_fn(width, height, |x, y| {
        let v = values[(y * width + x) as usize];
        image::Luma([if v > 0.5 { 255u8 } else { 0u8 }])
    });
    img.save(path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Compose, SegmentationDataset};
    use crate::model::UnetConfig;
    use burn::backend::NdArray;
    use image::{GrayImage, RgbImage};

    fn synthetic_loader(
        root: &Path,
        n: usize,
        all_white_masks: bool,
    ) -> SegmentationLoader<NdArray> {
        let img_dir = root.join("images");
        let mask_dir = root.join("masks");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();
        for i in 0..n {
            RgbImage::from_pixel(16, 8, image::Rgb([120, 130, 140]))
                .save(img_dir.join(format!("s{i}.png")))
                .unwrap();
            let value = if all_white_masks { 255 } else { 0 };
            GrayImage::from_pixel(16, 8, image::Luma([value]))
                .save(mask_dir.join(format!("s{i}.png")))
                .unwrap();
        }
        let dataset = SegmentationDataset::new(&img_dir, &mask_dir).unwrap();
        SegmentationLoader::new(
            dataset,
            Compose::validation(8, 16),
            2,
            false,
            1,
            false,
            Some(0),
            Default::default(),
        )
    }

    fn tiny_model() -> Unet<NdArray> {
        Unet::new(
            &UnetConfig {
                in_channels: 3,
                out_channels: 1,
                features: vec![4],
            },
            &Default::default(),
        )
    }

    #[test]
    fn metrics_are_bounded_and_count_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = synthetic_loader(tmp.path(), 4, true);
        let metrics = check_accuracy(loader, &tiny_model());
        assert_eq!(metrics.num_batches, 2);
        assert!((0.0..=1.0).contains(&metrics.pixel_accuracy));
        assert!((0.0..=1.0 + DICE_EPS).contains(&metrics.dice_score));
    }

    #[test]
    fn prediction_dump_writes_one_pair_per_sample() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = synthetic_loader(tmp.path(), 3, false);
        let out = tmp.path().join("preds");
        save_predictions_as_imgs(loader, &tiny_model(), &out).unwrap();

        let files: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 6);
        assert!(files.iter().any(|f| f == "pred_0_0.png"));
        assert!(files.iter().any(|f| f == "gt_1_0.png"));
    }
}
