pub mod checkpoint;
pub mod config;
pub mod loss;
pub mod metrics;
pub mod scaler;
pub mod trainer;

pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::TrainingConfig;
pub use loss::BceWithLogitsLoss;
pub use metrics::{check_accuracy, save_predictions_as_imgs, SegmentationMetrics};
pub use scaler::GradScaler;
pub use trainer::Trainer;
