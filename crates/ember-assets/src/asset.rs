//! The asset contract: a stable identity plus a two-phase load.

use ember_core::GpuContext;

use crate::error::AssetError;

/// Manager-assigned identifier, stable for an instance's lifetime.
pub type AssetId = u32;

/// Where an asset is in its two-phase load.
///
/// `Unloaded → CpuLoaded → GpuReady` on success; either stage's failure moves
/// the instance to `Failed`. Both `GpuReady` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    CpuLoaded,
    GpuReady,
    Failed,
}

impl LoadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::GpuReady | LoadState::Failed)
    }
}

/// An engine asset with a stable identity and a two-phase load.
///
/// The CPU stage may run on any worker thread and never touches the graphics
/// service. The GPU stage consumes the CPU stage's output on the
/// device-owning thread, which is why it takes a [`GpuContext`]. The host
/// scheduler decides *when* each stage runs; this contract only orders them.
/// A failed stage is terminal: callers discard the instance and construct a
/// new one to retry.
pub trait Asset: Send + Sync {
    fn id(&self) -> AssetId;

    /// The ordered source-name list that is this asset's identity.
    fn files(&self) -> &[String];

    fn state(&self) -> LoadState;

    /// Decode raw file content into the in-memory intermediate form.
    fn load_cpu(&mut self) -> Result<(), AssetError>;

    /// Upload the intermediate form through the graphics service, releasing
    /// it whether the device accepts the data or not. Requires a completed
    /// CPU stage; reaching for it from `Unloaded` is a caller bug.
    fn load_gpu(&mut self, gpu: &GpuContext) -> Result<(), AssetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!LoadState::Unloaded.is_terminal());
        assert!(!LoadState::CpuLoaded.is_terminal());
        assert!(LoadState::GpuReady.is_terminal());
        assert!(LoadState::Failed.is_terminal());
    }
}
