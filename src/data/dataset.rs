use anyhow::Result;
use image::DynamicImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Paired (image, mask) files drawn from two directories.
///
/// Every image in `img_dir` is matched with the mask in `mask_dir` sharing
/// its file stem, or the stem with a `_mask` suffix (the Carvana layout).
/// Images without a mask are skipped with a warning.
#[derive(Clone)]
pub struct SegmentationDataset {
    samples: Vec<(PathBuf, PathBuf)>,
}

impl SegmentationDataset {
    pub fn new(img_dir: &Path, mask_dir: &Path) -> Result<Self> {
        if !img_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "image directory not found: {}",
                img_dir.display()
            ));
        }
        if !mask_dir.is_dir() {
            return Err(anyhow::anyhow!(
                "mask directory not found: {}",
                mask_dir.display()
            ));
        }

        let mut samples = Vec::new();
        for entry in std::fs::read_dir(img_dir)? {
            let img_path = entry?.path();
            if !img_path.is_file() || !has_image_extension(&img_path) {
                continue;
            }
            match find_mask(&img_path, mask_dir) {
                Some(mask_path) => samples.push((img_path, mask_path)),
                None => {
                    log::warn!("no mask found for {}, skipping", img_path.display());
                }
            }
        }

        if samples.is_empty() {
            return Err(anyhow::anyhow!(
                "no (image, mask) pairs found under {} / {}",
                img_dir.display(),
                mask_dir.display()
            ));
        }

        // Directory order is platform-dependent; sort for stable iteration.
        samples.sort();

        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Result<(DynamicImage, DynamicImage)> {
        let (img_path, mask_path) = self.samples.get(idx).ok_or_else(|| {
            anyhow::anyhow!(
                "index {} out of bounds, dataset has {} samples",
                idx,
                self.samples.len()
            )
        })?;
        let img = image::open(img_path)
            .map_err(|e| anyhow::anyhow!("failed to open image {}: {e}", img_path.display()))?;
        let mask = image::open(mask_path)
            .map_err(|e| anyhow::anyhow!("failed to open mask {}: {e}", mask_path.display()))?;
        Ok((img, mask))
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn find_mask(img_path: &Path, mask_dir: &Path) -> Option<PathBuf> {
    let stem = img_path.file_stem()?.to_str()?;
    for candidate_stem in [stem.to_string(), format!("{stem}_mask")] {
        for ext in IMAGE_EXTENSIONS {
            let candidate = mask_dir.join(format!("{candidate_stem}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    fn write_pair(dir: &Path, mask_dir: &Path, stem: &str, mask_suffix: &str) {
        let img = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        img.save(dir.join(format!("{stem}.png"))).unwrap();
        let mask = GrayImage::from_pixel(4, 4, image::Luma([255]));
        mask.save(mask_dir.join(format!("{stem}{mask_suffix}.png")))
            .unwrap();
    }

    #[test]
    fn pairs_images_with_plain_and_suffixed_masks() {
        let tmp = tempfile::tempdir().unwrap();
        let img_dir = tmp.path().join("images");
        let mask_dir = tmp.path().join("masks");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();

        write_pair(&img_dir, &mask_dir, "a", "");
        write_pair(&img_dir, &mask_dir, "b", "_mask");
        // An unmatched image is skipped, not an error.
        RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
            .save(img_dir.join("orphan.png"))
            .unwrap();

        let dataset = SegmentationDataset::new(&img_dir, &mask_dir).unwrap();
        assert_eq!(dataset.len(), 2);

        let (img, mask) = dataset.get(0).unwrap();
        assert_eq!(img.to_rgb8().dimensions(), (4, 4));
        assert_eq!(mask.to_luma8().dimensions(), (4, 4));
    }

    #[test]
    fn empty_directories_are_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let img_dir = tmp.path().join("images");
        let mask_dir = tmp.path().join("masks");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();
        assert!(SegmentationDataset::new(&img_dir, &mask_dir).is_err());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(
            SegmentationDataset::new(&tmp.path().join("nope"), &tmp.path().join("nope")).is_err()
        );
    }

    #[test]
    fn out_of_bounds_get_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let img_dir = tmp.path().join("images");
        let mask_dir = tmp.path().join("masks");
        std::fs::create_dir_all(&img_dir).unwrap();
        std::fs::create_dir_all(&mask_dir).unwrap();
        write_pair(&img_dir, &mask_dir, "a", "");
        let dataset = SegmentationDataset::new(&img_dir, &mask_dir).unwrap();
        assert!(dataset.get(5).is_err());
    }
}
