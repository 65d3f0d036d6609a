use crate::model::{Unet, UnetConfig};
use anyhow::Result;
use burn::module::Module;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use std::path::{Path, PathBuf};

/// Write the model record plus a JSON sidecar describing the architecture.
/// Returns the path of the record file (`<dir>/<name>.bin`).
pub fn save_checkpoint<B: Backend>(
    model: &Unet<B>,
    model_config: &UnetConfig,
    dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let path = dir.join(name);
    model
        .clone()
        .save_file(&path, &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;

    let sidecar = serde_json::json!({
        "model_type": "UNet",
        "in_channels": model_config.in_channels,
        "out_channels": model_config.out_channels,
        "features": model_config.features,
        "checkpoint_name": name,
    });
    std::fs::write(
        dir.join(format!("{name}.json")),
        serde_json::to_string_pretty(&sidecar)?,
    )?;

    Ok(path.with_extension("bin"))
}

/// Rebuild a model from a record written by [`save_checkpoint`]. The config
/// must match the architecture the checkpoint was saved with.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    model_config: &UnetConfig,
    device: &B::Device,
) -> Result<Unet<B>> {
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    Unet::new(model_config, device)
        .load_file(path, &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", path.display()))
}
