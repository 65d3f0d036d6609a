const GROWTH_FACTOR: f32 = 2.0;
const BACKOFF_FACTOR: f32 = 0.5;
const GROWTH_INTERVAL: usize = 2000;
const MAX_SCALE: f32 = 16_777_216.0; // 2^24

/// Dynamic loss scaling for reduced-precision training.
///
/// A running factor tracks how far the loss can be amplified before it
/// overflows: the factor backs off when a step overflows and grows again
/// after a run of good steps, capped so it stays finite. The scaler owns
/// the skip-on-overflow policy: a step whose scaled loss is non-finite
/// must not reach the optimizer.
///
/// Backpropagation runs on the unscaled loss; the scaled value exists only
/// to drive the overflow check, so gradients reach the optimizer at their
/// true magnitude and no unscale pass is needed.
#[derive(Debug, Clone)]
pub struct GradScaler {
    scale: f32,
    good_steps: usize,
    enabled: bool,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl GradScaler {
    pub fn new() -> Self {
        Self::with_scale(65536.0)
    }

    pub fn with_scale(init_scale: f32) -> Self {
        Self {
            scale: init_scale.min(MAX_SCALE),
            good_steps: 0,
            enabled: true,
        }
    }

    /// Pass-through scaler: factor fixed at 1.0, but non-finite losses still
    /// skip the optimizer step.
    pub fn disabled() -> Self {
        Self {
            scale: 1.0,
            good_steps: 0,
            enabled: false,
        }
    }

    pub fn current_scale(&self) -> f32 {
        self.scale
    }

    /// The loss value amplified by the current factor, for the overflow
    /// check.
    pub fn scale_value(&self, value: f32) -> f32 {
        if self.enabled {
            value * self.scale
        } else {
            value
        }
    }

    /// Whether the optimizer may step given this batch's scaled loss value.
    pub fn step_allowed(&self, scaled_loss: f32) -> bool {
        scaled_loss.is_finite()
    }

    /// Adapt the factor once per batch from the overflow signal.
    pub fn update(&mut self, overflowed: bool) {
        if !self.enabled {
            return;
        }
        if overflowed {
            self.scale = (self.scale * BACKOFF_FACTOR).max(1.0);
            self.good_steps = 0;
        } else {
            self.good_steps += 1;
            if self.good_steps >= GROWTH_INTERVAL {
                self.scale = (self.scale * GROWTH_FACTOR).min(MAX_SCALE);
                self.good_steps = 0;
            }
        }
    }
}
