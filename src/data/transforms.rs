use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel, RgbImage};
use rand::Rng;

/// One stage of an augmentation pipeline. Geometric stages apply the same
/// sampled parameters to the image and its mask; `Normalize` touches the
/// image only.
#[derive(Debug, Clone)]
pub enum Transform {
    Resize {
        height: u32,
        width: u32,
    },
    /// Rotate by a uniform angle in `[-limit_degrees, limit_degrees]`.
    Rotate {
        limit_degrees: f32,
        p: f64,
    },
    HorizontalFlip {
        p: f64,
    },
    VerticalFlip {
        p: f64,
    },
    Normalize {
        mean: [f32; 3],
        std: [f32; 3],
        max_pixel_value: f32,
    },
}

/// Ordered transform pipeline applied to (image, mask) pairs.
#[derive(Debug, Clone)]
pub struct Compose {
    transforms: Vec<Transform>,
}

/// Pipeline output: CHW image floats plus a binarized HW mask.
pub struct TransformedPair {
    pub image: Vec<f32>,
    pub mask: Vec<f32>,
    pub height: usize,
    pub width: usize,
}

impl Compose {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }

    /// Training pipeline: resize, rotation, flips, normalization.
    pub fn train(height: u32, width: u32) -> Self {
        Self::new(vec![
            Transform::Resize { height, width },
            Transform::Rotate {
                limit_degrees: 35.0,
                p: 1.0,
            },
            Transform::HorizontalFlip { p: 0.5 },
            Transform::VerticalFlip { p: 0.1 },
            Transform::Normalize {
                mean: [0.0, 0.0, 0.0],
                std: [1.0, 1.0, 1.0],
                max_pixel_value: 255.0,
            },
        ])
    }

    /// Validation pipeline: resize and normalization only.
    pub fn validation(height: u32, width: u32) -> Self {
        Self::new(vec![
            Transform::Resize { height, width },
            Transform::Normalize {
                mean: [0.0, 0.0, 0.0],
                std: [1.0, 1.0, 1.0],
                max_pixel_value: 255.0,
            },
        ])
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    /// Run the pipeline over one pair. Random parameters are drawn once per
    /// geometric stage and applied to the image and the mask alike, so the
    /// two stay spatially aligned.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        image: &DynamicImage,
        mask: &DynamicImage,
    ) -> TransformedPair {
        let mut img = image.to_rgb8();
        let mut msk = mask.to_luma8();

        let mut mean = [0.0f32; 3];
        let mut std = [1.0f32; 3];
        let mut max_pixel_value = 255.0f32;

        for transform in &self.transforms {
            match *transform {
                Transform::Resize { height, width } => {
                    img = image::imageops::resize(&img, width, height, FilterType::Triangle);
                    msk = image::imageops::resize(&msk, width, height, FilterType::Nearest);
                }
                Transform::Rotate { limit_degrees, p } => {
                    if limit_degrees > 0.0 && rng.gen_bool(p) {
                        let angle = rng.gen_range(-limit_degrees..=limit_degrees);
                        img = rotate_nearest(&img, angle, image::Rgb([0, 0, 0]));
                        msk = rotate_nearest(&msk, angle, image::Luma([0]));
                    }
                }
                Transform::HorizontalFlip { p } => {
                    if rng.gen_bool(p) {
                        image::imageops::flip_horizontal_in_place(&mut img);
                        image::imageops::flip_horizontal_in_place(&mut msk);
                    }
                }
                Transform::VerticalFlip { p } => {
                    if rng.gen_bool(p) {
                        image::imageops::flip_vertical_in_place(&mut img);
                        image::imageops::flip_vertical_in_place(&mut msk);
                    }
                }
                Transform::Normalize {
                    mean: m,
                    std: s,
                    max_pixel_value: max,
                } => {
                    mean = m;
                    std = s;
                    max_pixel_value = max;
                }
            }
        }

        to_tensor_pair(&img, &msk, mean, std, max_pixel_value)
    }
}

fn to_tensor_pair(
    img: &RgbImage,
    msk: &GrayImage,
    mean: [f32; 3],
    std: [f32; 3],
    max_pixel_value: f32,
) -> TransformedPair {
    let (width, height) = img.dimensions();
    let num_pixels = (width * height) as usize;

    let mut image = vec![0.0f32; num_pixels * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        for c in 0..3 {
            image[c * num_pixels + base] = (pixel[c] as f32 / max_pixel_value - mean[c]) / std[c];
        }
    }

    let mask = msk
        .pixels()
        .map(|p| if p[0] > 127 { 1.0 } else { 0.0 })
        .collect();

    TransformedPair {
        image,
        mask,
        height: height as usize,
        width: width as usize,
    }
}

/// Rotate about the image center with nearest-neighbor sampling, filling
/// uncovered corners with `fill`. Nearest sampling keeps binary masks binary.
fn rotate_nearest<P>(src: &ImageBuffer<P, Vec<u8>>, degrees: f32, fill: P) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (w, h) = src.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    ImageBuffer::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        // Inverse mapping: sample the source at the un-rotated position.
        let sx = (cos * dx + sin * dy + cx).round();
        let sy = (-sin * dx + cos * dy + cy).round();
        if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
            fill
        } else {
            *src.get_pixel(sx as u32, sy as u32)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn checkerboard(width: u32, height: u32) -> (DynamicImage, DynamicImage) {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        let msk = GrayImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        });
        (DynamicImage::ImageRgb8(img), DynamicImage::ImageLuma8(msk))
    }

    #[test]
    fn train_and_validation_resize_to_configured_shape() {
        let (img, msk) = checkerboard(64, 40);
        let mut rng = StdRng::seed_from_u64(7);
        for pipeline in [Compose::train(16, 24), Compose::validation(16, 24)] {
            let out = pipeline.apply(&mut rng, &img, &msk);
            assert_eq!((out.height, out.width), (16, 24));
            assert_eq!(out.image.len(), 3 * 16 * 24);
            assert_eq!(out.mask.len(), 16 * 24);
        }
    }

    #[test]
    fn validation_pipeline_has_no_geometry_randomness() {
        let has_random = |c: &Compose| {
            c.transforms().iter().any(|t| {
                matches!(
                    t,
                    Transform::Rotate { .. }
                        | Transform::HorizontalFlip { .. }
                        | Transform::VerticalFlip { .. }
                )
            })
        };
        assert!(has_random(&Compose::train(160, 240)));
        assert!(!has_random(&Compose::validation(160, 240)));
    }

    #[test]
    fn pipelines_share_normalization_statistics() {
        let norm = |c: &Compose| {
            c.transforms()
                .iter()
                .find_map(|t| match *t {
                    Transform::Normalize {
                        mean,
                        std,
                        max_pixel_value,
                    } => Some((mean, std, max_pixel_value)),
                    _ => None,
                })
                .expect("pipeline must normalize")
        };
        assert_eq!(norm(&Compose::train(160, 240)), norm(&Compose::validation(160, 240)));
    }

    #[test]
    fn geometric_transforms_keep_image_and_mask_aligned() {
        // Mask equals the thresholded image, so after any shared rotation and
        // flips the binarized mask must still match the image channel.
        let (img, msk) = checkerboard(32, 32);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = Compose::train(32, 32).apply(&mut rng, &img, &msk);
            let num_pixels = out.height * out.width;
            for i in 0..num_pixels {
                let image_on = out.image[i] > 0.5;
                let mask_on = out.mask[i] > 0.5;
                assert_eq!(image_on, mask_on, "pixel {i} diverged (seed {seed})");
            }
        }
    }

    #[test]
    fn normalize_scales_pixels_into_unit_range() {
        let (img, msk) = checkerboard(8, 8);
        let mut rng = StdRng::seed_from_u64(0);
        let out = Compose::validation(8, 8).apply(&mut rng, &img, &msk);
        assert!(out.image.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(out.image.iter().any(|v| *v > 0.99));
    }

    #[test]
    fn rotation_by_zero_is_identity() {
        let img = RgbImage::from_fn(5, 3, |x, y| image::Rgb([(x * 40) as u8, (y * 80) as u8, 0]));
        let rotated = rotate_nearest(&img, 0.0, image::Rgb([0, 0, 0]));
        assert_eq!(img, rotated);
    }
}
