use burn::prelude::*;

/// Binary cross-entropy computed directly on logits.
///
/// Uses the stable form `max(x, 0) - x*z + ln(1 + e^-|x|)` so large logits
/// never saturate a sigmoid before the log, then averages over all elements.
#[derive(Debug, Clone, Default)]
pub struct BceWithLogitsLoss;

impl BceWithLogitsLoss {
    pub fn new() -> Self {
        Self
    }

    /// `logits` and `targets` must share shape; targets are 0.0 or 1.0.
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        let per_pixel = logits.clone().clamp_min(0.0) - logits.clone() * targets
            + logits.abs().neg().exp().log1p();
        per_pixel.mean()
    }
}
