//! Ember Assets - Asset loading and lifecycle management
//!
//! Turns raw files into GPU-resident, reference-counted objects:
//! - The two-phase `Asset` contract (CPU decode, then GPU upload)
//! - `TextureAsset`, the image-file specialization
//! - `AssetManager`, the identity-keyed dedup registry

mod asset;
mod error;
mod manager;
mod texture;

pub use asset::{Asset, AssetId, LoadState};
pub use error::AssetError;
pub use manager::{AssetManager, SharedTexture};
pub use texture::TextureAsset;
