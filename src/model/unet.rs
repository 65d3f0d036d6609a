use super::blocks::DoubleConv;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;

/// Architecture hyperparameters for [`Unet`].
///
/// `features` lists the encoder widths top-down; the decoder mirrors them.
/// Input height and width must be divisible by `2^features.len()` so the
/// decoder's upsampled activations line up with the stored skip tensors.
#[derive(Debug, Clone)]
pub struct UnetConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub features: Vec<usize>,
}

impl Default for UnetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            out_channels: 1,
            features: vec![64, 128, 256, 512],
        }
    }
}

impl UnetConfig {
    /// Total spatial downsampling between input and bottleneck.
    pub fn downsample_factor(&self) -> usize {
        1 << self.features.len()
    }
}

/// Encoder-decoder with skip connections; maps `[N, in, H, W]` to one logit
/// per pixel and output channel, `[N, out, H, W]`.
#[derive(Module, Debug)]
pub struct Unet<B: Backend> {
    downs: Vec<DoubleConv<B>>,
    bottleneck: DoubleConv<B>,
    ups: Vec<ConvTranspose2d<B>>,
    up_convs: Vec<DoubleConv<B>>,
    head: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> Unet<B> {
    pub fn new(config: &UnetConfig, device: &B::Device) -> Self {
        let mut downs = Vec::with_capacity(config.features.len());
        let mut channels = config.in_channels;
        for &width in &config.features {
            downs.push(DoubleConv::new(device, channels, width));
            channels = width;
        }

        let bottleneck = DoubleConv::new(device, channels, channels * 2);

        let mut ups = Vec::with_capacity(config.features.len());
        let mut up_convs = Vec::with_capacity(config.features.len());
        for &width in config.features.iter().rev() {
            ups.push(
                ConvTranspose2dConfig::new([width * 2, width], [2, 2])
                    .with_stride([2, 2])
                    .init(device),
            );
            up_convs.push(DoubleConv::new(device, width * 2, width));
        }

        let head = Conv2dConfig::new([config.features[0], config.out_channels], [1, 1]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            downs,
            bottleneck,
            ups,
            up_convs,
            head,
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.downs.len());
        let mut x = x;
        for down in &self.downs {
            x = down.forward(x);
            skips.push(x.clone());
            x = self.pool.forward(x);
        }

        x = self.bottleneck.forward(x);

        for (up, conv) in self.ups.iter().zip(self.up_convs.iter()) {
            let skip = skips.pop().expect("one skip connection per decoder stage");
            x = up.forward(x);
            x = conv.forward(Tensor::cat(vec![skip, x], 1));
        }

        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn tiny_config() -> UnetConfig {
        UnetConfig {
            in_channels: 3,
            out_channels: 1,
            features: vec![4, 8],
        }
    }

    #[test]
    fn forward_emits_one_logit_channel_per_pixel() {
        let device = Default::default();
        let model = Unet::<NdArray>::new(&tiny_config(), &device);
        let x = Tensor::zeros([2, 3, 16, 24], &device);
        let logits = model.forward(x);
        assert_eq!(logits.dims(), [2, 1, 16, 24]);
    }

    #[test]
    fn downsample_factor_matches_depth() {
        assert_eq!(tiny_config().downsample_factor(), 4);
        assert_eq!(UnetConfig::default().downsample_factor(), 16);
    }
}
