use crate::data::{Compose, SegmentationDataset, SegmentationLoader};
use crate::model::{Unet, UnetConfig};
use crate::training::checkpoint::{load_checkpoint, save_checkpoint};
use crate::training::loss::BceWithLogitsLoss;
use crate::training::metrics::{check_accuracy, save_predictions_as_imgs, SegmentationMetrics};
use crate::training::scaler::GradScaler;
use crate::training::TrainingConfig;
use anyhow::Result;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Drives `num_epochs` passes of forward / loss / scaled backward / Adam
/// step over the training set.
pub struct Trainer<B: AutodiffBackend> {
    pub model: Unet<B>,
    optimizer: OptimizerAdaptor<Adam, Unet<B>, B>,
    loss_fn: BceWithLogitsLoss,
    scaler: GradScaler,
    config: TrainingConfig,
    model_config: UnetConfig,
    device: B::Device,
    steps_applied: usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        Self::with_model_config(config, UnetConfig::default(), device)
    }

    pub fn with_model_config(
        config: TrainingConfig,
        model_config: UnetConfig,
        device: B::Device,
    ) -> Result<Self> {
        if model_config.features.is_empty() {
            return Err(anyhow::anyhow!("model must have at least one encoder stage"));
        }
        config.validate(model_config.downsample_factor())?;

        let checkpoint_path = Path::new(&config.save_dir).join("latest.bin");
        let model = if config.load_model && checkpoint_path.is_file() {
            log::info!("resuming from {}", checkpoint_path.display());
            load_checkpoint(&checkpoint_path, &model_config, &device)?
        } else {
            Unet::new(&model_config, &device)
        };

        let optimizer = AdamConfig::new().init();
        let scaler = if config.amp {
            GradScaler::with_scale(config.init_loss_scale)
        } else {
            GradScaler::disabled()
        };

        Ok(Self {
            model,
            optimizer,
            loss_fn: BceWithLogitsLoss::new(),
            scaler,
            config,
            model_config,
            device,
            steps_applied: 0,
        })
    }

    /// Total optimizer updates applied so far; overflow-skipped batches do
    /// not count.
    pub fn optimizer_steps(&self) -> usize {
        self.steps_applied
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Full run: epoch loop plus the per-epoch checkpoint and validation
    /// pass.
    pub fn train(&mut self) -> Result<()> {
        let train_dataset = SegmentationDataset::new(
            Path::new(&self.config.train_img_dir),
            Path::new(&self.config.train_mask_dir),
        )?;
        let val_dataset = SegmentationDataset::new(
            Path::new(&self.config.val_img_dir),
            Path::new(&self.config.val_mask_dir),
        )?;
        log::info!(
            "dataset loaded: {} train, {} val samples",
            train_dataset.len(),
            val_dataset.len()
        );

        let height = self.config.image_height as u32;
        let width = self.config.image_width as u32;
        let train_transform = Compose::train(height, width);
        let val_transform = Compose::validation(height, width);

        for epoch in 1..=self.config.num_epochs {
            let loader = SegmentationLoader::<B>::new(
                train_dataset.clone(),
                train_transform.clone(),
                self.config.batch_size,
                true,
                self.config.num_workers,
                self.config.pin_memory,
                None,
                self.device.clone(),
            );
            let avg_loss = self.train_epoch(loader, epoch);

            save_checkpoint(&self.model, &self.model_config, Path::new(&self.config.save_dir), "latest")?;

            let metrics = self.validate(self.val_loader(&val_dataset, &val_transform));
            log::info!(
                "epoch {epoch}/{}: avg loss {avg_loss:.4}, pixel acc {:.4}, dice {:.4}",
                self.config.num_epochs,
                metrics.pixel_accuracy,
                metrics.dice_score
            );

            if self.config.save_predictions {
                let dir = Path::new(&self.config.save_dir).join("saved_images");
                save_predictions_as_imgs(
                    self.val_loader(&val_dataset, &val_transform),
                    &self.model.valid(),
                    &dir,
                )?;
            }
        }
        Ok(())
    }

    /// One pass over the loader in delivery order; returns the mean of the
    /// finite per-batch losses.
    pub fn train_epoch(&mut self, loader: SegmentationLoader<B>, epoch: usize) -> f32 {
        let pb = ProgressBar::new(loader.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut total_loss = 0.0;
        let mut count = 0usize;
        for batch in loader {
            let loss = self.train_step(batch.images, batch.masks);
            if loss.is_finite() {
                total_loss += loss;
                count += 1;
            }
            pb.set_message(format!("epoch {epoch} loss={loss:.4}"));
            pb.inc(1);
        }
        pb.finish_and_clear();

        if count > 0 {
            total_loss / count as f32
        } else {
            0.0
        }
    }

    /// The per-batch step contract: reshape masks to `[N, 1, H, W]`, forward
    /// to logits, BCE-with-logits loss, backward gated by the scaler's
    /// overflow check, then at most one optimizer step. Returns the loss
    /// value.
    pub fn train_step(&mut self, images: Tensor<B, 4>, masks: Tensor<B, 3>) -> f32 {
        let targets: Tensor<B, 4> = masks.unsqueeze_dim(1);

        let logits = self.model.forward(images);
        let loss = self.loss_fn.forward(logits, targets);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        // The scaled value only drives the overflow check; backpropagation
        // carries the loss at its true magnitude, so the optimizer never
        // sees the factor.
        let scaled_value = self.scaler.scale_value(loss_value);
        if !self.scaler.step_allowed(scaled_value) {
            log::warn!(
                "non-finite scaled loss (scale {}), skipping optimizer step",
                self.scaler.current_scale()
            );
            self.scaler.update(true);
            return loss_value;
        }

        // Each backward produces a fresh gradient set; nothing accumulates
        // across steps.
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self
            .optimizer
            .step(self.config.learning_rate, self.model.clone(), grads);
        self.steps_applied += 1;
        self.scaler.update(false);

        loss_value
    }

    /// Validation on the inner (non-autodiff) backend.
    pub fn validate(
        &self,
        loader: SegmentationLoader<B::InnerBackend>,
    ) -> SegmentationMetrics {
        check_accuracy(loader, &self.model.valid())
    }

    fn val_loader(
        &self,
        dataset: &SegmentationDataset,
        transform: &Compose,
    ) -> SegmentationLoader<B::InnerBackend> {
        SegmentationLoader::new(
            dataset.clone(),
            transform.clone(),
            self.config.batch_size,
            false,
            self.config.num_workers,
            self.config.pin_memory,
            None,
            self.device.clone(),
        )
    }
}
