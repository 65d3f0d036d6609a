pub mod blocks;
pub mod unet;

pub use blocks::DoubleConv;
pub use unet::{Unet, UnetConfig};
