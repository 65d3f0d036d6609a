use burn::backend::{Autodiff, NdArray};
use std::path::Path;
use unet_segmentation::training::{Trainer, TrainingConfig};

const CONFIG_PATH: &str = "configs/train_config.yaml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("UNet Binary Segmentation Training (CPU)");
    println!("=======================================\n");

    // CPU backend (NdArray) with autodiff for training
    type MyBackend = NdArray;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    let device = Default::default();

    let config = if Path::new(CONFIG_PATH).exists() {
        println!("Loading config from {CONFIG_PATH}");
        TrainingConfig::from_yaml(CONFIG_PATH)?
    } else {
        let config = TrainingConfig::default();
        std::fs::create_dir_all("configs")?;
        config.save(CONFIG_PATH)?;
        println!("Created default config at {CONFIG_PATH}");
        config
    };

    println!("\nTraining configuration:");
    println!("  Epochs: {}", config.num_epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!(
        "  Image size: {}x{}",
        config.image_height, config.image_width
    );
    println!("  Workers: {}", config.num_workers);
    println!("  Mixed precision scaler: {}", config.amp);
    println!("  Train images: {}", config.train_img_dir);
    println!("  Val images: {}", config.val_img_dir);
    println!("  Save dir: {}", config.save_dir);
    println!();

    let mut trainer = Trainer::<MyAutodiffBackend>::new(config, device)?;

    match trainer.train() {
        Ok(()) => {
            println!("\nTraining completed successfully!");
            println!(
                "Checkpoints saved in '{}'",
                trainer.config().save_dir
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\nTraining failed: {e}");
            Err(e.into())
        }
    }
}
