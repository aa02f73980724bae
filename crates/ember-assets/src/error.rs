use std::path::PathBuf;

use ember_core::GraphicsError;

/// Errors that can occur during asset loading.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error("device rejected asset: {0}")]
    GpuResource(#[from] GraphicsError),
}
