//! Central asset registry: identity-keyed deduplication and reference counts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use ember_core::{GpuContext, GraphicsService};

use crate::asset::{Asset, AssetId, LoadState};
use crate::error::AssetError;
use crate::texture::TextureAsset;

/// Shared, lockable handle to a registered texture instance.
pub type SharedTexture = Arc<RwLock<TextureAsset>>;

struct TextureEntry {
    asset: SharedTexture,
    ref_count: usize,
}

/// Registry keyed by asset identity (the ordered source-name list).
///
/// The manager is the sole arbiter of deduplication: a request whose name
/// list matches a registered asset gets the same shared instance with its
/// reference count bumped. Logical owners share the instance, never the raw
/// device handle, and the handle is released exactly once when the last
/// reference goes away.
pub struct AssetManager {
    service: Arc<dyn GraphicsService>,
    next_id: AssetId,
    textures: HashMap<Vec<String>, TextureEntry>,
    /// Pixel bytes of textures embedded in model files, keyed by
    /// `model#embedded_id`, registered by the model loaders.
    embedded: HashMap<String, Vec<u8>>,
}

impl AssetManager {
    pub fn new(service: Arc<dyn GraphicsService>) -> Self {
        Self {
            service,
            next_id: 1,
            textures: HashMap::new(),
            embedded: HashMap::new(),
        }
    }

    fn embedded_key(model: &str, embedded_id: &str) -> String {
        format!("{model}#{embedded_id}")
    }

    /// Register raw image bytes for a texture embedded in a model file, so a
    /// later three-name load request can decode it.
    pub fn register_embedded(&mut self, model: &str, embedded_id: &str, bytes: Vec<u8>) {
        self.embedded
            .insert(Self::embedded_key(model, embedded_id), bytes);
    }

    /// Load a texture, or return the already-registered instance when the
    /// name list matches one. Runs the CPU stage in place; the GPU stage is
    /// driven later on the device thread (see [`AssetManager::upload_pending`]).
    ///
    /// A failed decode is returned as an error and nothing is registered;
    /// callers retry by requesting again.
    pub fn load_texture(&mut self, files: &[String]) -> Result<SharedTexture, AssetError> {
        if let Some(entry) = self.textures.get_mut(files) {
            entry.ref_count += 1;
            debug!(
                "texture {files:?} served from cache ({} refs)",
                entry.ref_count
            );
            return Ok(Arc::clone(&entry.asset));
        }

        // Three names mean the second is an id embedded in the model named
        // last; the bytes must have been registered by the model's loader.
        let embedded = if files.len() == 3 {
            let key = Self::embedded_key(&files[2], &files[1]);
            let bytes = self.embedded.get(&key).cloned().ok_or_else(|| {
                AssetError::Decode {
                    name: files[1].clone(),
                    reason: format!("no embedded texture registered for '{}'", files[2]),
                }
            })?;
            Some(bytes)
        } else {
            None
        };

        let id = self.next_id;
        let mut asset = TextureAsset::new(Arc::clone(&self.service), id, files.to_vec(), embedded);
        asset.load_cpu()?;
        self.next_id += 1;

        info!("registered texture {files:?} as asset {id}");
        let shared = Arc::new(RwLock::new(asset));
        self.textures.insert(
            files.to_vec(),
            TextureEntry {
                asset: Arc::clone(&shared),
                ref_count: 1,
            },
        );
        Ok(shared)
    }

    /// Drop one owner's reference. At zero the instance is unregistered and,
    /// once every outstanding handle is gone, its device texture is released.
    pub fn release_texture(&mut self, files: &[String]) {
        let Some(entry) = self.textures.get_mut(files) else {
            warn!("release of unregistered texture {files:?}");
            return;
        };
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            debug!("texture {files:?} released, dropping instance");
            self.textures.remove(files);
        }
    }

    /// Drive the GPU stage for every asset whose CPU stage has completed.
    /// Returns how many uploads succeeded; failures stay registered in
    /// `Failed` state so the renderer can substitute a placeholder.
    pub fn upload_pending(&mut self, gpu: &GpuContext) -> usize {
        let mut uploaded = 0;
        for entry in self.textures.values() {
            let mut asset = entry.asset.write();
            if asset.state() == LoadState::CpuLoaded {
                match asset.load_gpu(gpu) {
                    Ok(()) => uploaded += 1,
                    Err(e) => error!("upload of {:?} failed: {e}", asset.files()),
                }
            }
        }
        uploaded
    }

    /// A registered, fully loaded instance, if one exists. Consumers that
    /// are not driving the load only ever observe assets that reached
    /// `GpuReady`; requesters still mid-load go through
    /// [`AssetManager::load_texture`].
    pub fn find_loaded(&self, files: &[String]) -> Option<SharedTexture> {
        let entry = self.textures.get(files)?;
        (entry.asset.read().state() == LoadState::GpuReady).then(|| Arc::clone(&entry.asset))
    }

    /// Number of registered texture identities.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Owner count for a registered identity.
    pub fn ref_count(&self, files: &[String]) -> Option<usize> {
        self.textures.get(files).map(|entry| entry.ref_count)
    }
}
