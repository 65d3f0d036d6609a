use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Immutable hyperparameter set for one training run. Constructed once
/// (defaults, or YAML) and passed by reference; nothing reads process-wide
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    // Optimization
    pub learning_rate: f64,
    pub batch_size: usize,
    pub num_epochs: usize,

    // Loader
    pub num_workers: usize,
    pub pin_memory: bool,

    // Input geometry
    pub image_height: usize,
    pub image_width: usize,

    // Mixed precision
    pub amp: bool,
    pub init_loss_scale: f32,

    // Checkpointing
    pub load_model: bool,
    pub save_dir: String,
    pub save_predictions: bool,

    // Data paths
    pub train_img_dir: String,
    pub train_mask_dir: String,
    pub val_img_dir: String,
    pub val_mask_dir: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            batch_size: 16,
            num_epochs: 3,
            num_workers: 2,
            pin_memory: true,
            image_height: 160,
            image_width: 240,
            amp: true,
            init_loss_scale: 65536.0,
            load_model: false,
            save_dir: "runs/train".to_string(),
            save_predictions: false,
            train_img_dir: "data/train_images".to_string(),
            train_mask_dir: "data/train_masks".to_string(),
            val_img_dir: "data/val_images".to_string(),
            val_mask_dir: "data/val_masks".to_string(),
        }
    }
}

impl TrainingConfig {
    pub fn from_yaml(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainingConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Reject configurations the pipeline cannot satisfy. `downsample_factor`
    /// is the model's total pooling factor; the decoder requires the input
    /// dims to divide evenly by it.
    pub fn validate(&self, downsample_factor: usize) -> Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be at least 1"));
        }
        if self.image_height == 0 || self.image_width == 0 {
            return Err(anyhow::anyhow!("image dimensions must be non-zero"));
        }
        if self.image_height % downsample_factor != 0 || self.image_width % downsample_factor != 0 {
            return Err(anyhow::anyhow!(
                "image size {}x{} not divisible by the model's downsample factor {}",
                self.image_height,
                self.image_width,
                downsample_factor
            ));
        }
        if self.amp && !(self.init_loss_scale.is_finite() && self.init_loss_scale > 0.0) {
            return Err(anyhow::anyhow!(
                "init_loss_scale must be positive and finite, got {}",
                self.init_loss_scale
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_the_reference_hyperparameters() {
        let config = TrainingConfig::default();
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.num_workers, 2);
        assert_eq!((config.image_height, config.image_width), (160, 240));
        assert!(config.pin_memory);
        assert!(!config.load_model);
    }

    #[test]
    fn default_geometry_passes_validation_for_default_model() {
        // 160x240 against four pooling stages (factor 16).
        TrainingConfig::default().validate(16).unwrap();
    }

    #[test]
    fn indivisible_geometry_is_rejected() {
        let config = TrainingConfig {
            image_height: 150,
            ..Default::default()
        };
        assert!(config.validate(16).is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train_config.yaml");
        let config = TrainingConfig {
            num_epochs: 7,
            amp: false,
            ..Default::default()
        };
        config.save(path.to_str().unwrap()).unwrap();
        let loaded = TrainingConfig::from_yaml(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.num_epochs, 7);
        assert!(!loaded.amp);
        assert_eq!(loaded.batch_size, config.batch_size);
    }
}
