pub mod data;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{get_loaders, Compose, SegBatch, SegmentationDataset, SegmentationLoader, Transform};
pub use model::{DoubleConv, Unet, UnetConfig};
pub use training::{BceWithLogitsLoss, GradScaler, Trainer, TrainingConfig};
