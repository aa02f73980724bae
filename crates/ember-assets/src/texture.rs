//! Texture assets: decode on any thread, upload on the device thread.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use image::{ColorType, DynamicImage};
use tracing::{debug, error};

use ember_core::{
    DataType, FormatType, GpuContext, GraphicsService, InternalFormatType, TextureHandle,
    TextureMetaData, TextureType,
};

use crate::asset::{Asset, AssetId, LoadState};
use crate::error::AssetError;

/// An image file loaded through the two-phase asset contract.
///
/// The decoded pixel buffer lives only between the CPU and GPU stages; after
/// a GPU upload (successful or not) the buffer is gone and only the device
/// handle remains.
pub struct TextureAsset {
    service: Arc<dyn GraphicsService>,
    id: AssetId,
    /// One to three entries: the requesting asset's path (doubles as an
    /// alternate search directory), the texture file name or embedded texture
    /// id, and, for embedded textures, the owning model.
    name: Vec<String>,
    /// Raw image bytes for the embedded form, resolved by the manager.
    embedded: Option<Vec<u8>>,
    state: LoadState,
    metadata: Option<TextureMetaData>,
    cpu_pixels: Option<Vec<u8>>,
    texture: Option<TextureHandle>,
    device_thread: Option<thread::ThreadId>,
}

impl TextureAsset {
    pub fn new(
        service: Arc<dyn GraphicsService>,
        id: AssetId,
        name: Vec<String>,
        embedded: Option<Vec<u8>>,
    ) -> Self {
        Self {
            service,
            id,
            name,
            embedded,
            state: LoadState::Unloaded,
            metadata: None,
            cpu_pixels: None,
            texture: None,
            device_thread: None,
        }
    }

    /// Textures never travel through the binary scene archive; they always
    /// reload from their source images. The incompatibility is a contract,
    /// so this path refuses loudly instead of half-working.
    pub fn from_archive(
        _service: Arc<dyn GraphicsService>,
        _id: AssetId,
        _name: Vec<String>,
        _archive: &[u8],
    ) -> Self {
        panic!("TextureAsset does not support binary archive loading");
    }

    /// The file name (or embedded id) this texture was requested as.
    fn display_name(&self) -> &str {
        if self.name.len() >= 2 {
            &self.name[1]
        } else {
            &self.name[0]
        }
    }

    fn decode_error(&self, reason: impl ToString) -> AssetError {
        AssetError::Decode {
            name: self.display_name().to_string(),
            reason: reason.to_string(),
        }
    }

    fn decode_surface(&self) -> Result<DynamicImage, AssetError> {
        if let Some(bytes) = &self.embedded {
            return image::load_from_memory(bytes).map_err(|e| self.decode_error(e));
        }

        let primary = Path::new(self.display_name());
        if primary.exists() {
            return image::open(primary).map_err(|e| self.decode_error(e));
        }

        // Fall back to the requesting asset's directory. Model files often
        // reference textures by a path that was only valid on the author's
        // machine, while the image sits next to the model.
        if self.name.len() >= 2 {
            if let (Some(dir), Some(file)) = (Path::new(&self.name[0]).parent(), primary.file_name())
            {
                let alternate = dir.join(file);
                if alternate.exists() {
                    debug!(
                        "texture '{}' found at alternate path {}",
                        self.display_name(),
                        alternate.display()
                    );
                    return image::open(&alternate).map_err(|e| self.decode_error(e));
                }
            }
        }

        Err(AssetError::NotFound(primary.to_path_buf()))
    }

    /// Map the decoded channel layout to the service's format enumerations
    /// and extract the raw pixels.
    fn derive_pixels(image: DynamicImage) -> (TextureMetaData, Vec<u8>) {
        let (internal_format, format, (width, height), pixels) = match image.color() {
            ColorType::Rgb8 => {
                let buffer = image.into_rgb8();
                let dimensions = buffer.dimensions();
                (
                    InternalFormatType::Rgb8,
                    FormatType::Rgb,
                    dimensions,
                    buffer.into_raw(),
                )
            }
            ColorType::L8 => {
                let buffer = image.into_luma8();
                let dimensions = buffer.dimensions();
                (
                    InternalFormatType::Red8,
                    FormatType::Red,
                    dimensions,
                    buffer.into_raw(),
                )
            }
            // Everything else (16-bit, float, alpha-bearing grayscale) is
            // normalized to four 8-bit channels.
            _ => {
                let buffer = image.into_rgba8();
                let dimensions = buffer.dimensions();
                (
                    InternalFormatType::Rgba8,
                    FormatType::Rgba,
                    dimensions,
                    buffer.into_raw(),
                )
            }
        };
        let metadata = TextureMetaData {
            texture_type: TextureType::T2d,
            internal_format,
            format,
            data_type: DataType::UnsignedByte,
            width,
            height,
        };
        (metadata, pixels)
    }

    /// The device handle. Requires `GpuReady`.
    pub fn texture(&self) -> TextureHandle {
        debug_assert_eq!(self.state, LoadState::GpuReady, "texture read before upload");
        self.texture.expect("texture read before the GPU stage completed")
    }

    /// Width in pixels. Requires `GpuReady`.
    pub fn width(&self) -> u32 {
        debug_assert_eq!(self.state, LoadState::GpuReady, "width read before upload");
        self.metadata.expect("width read before the GPU stage completed").width
    }

    /// Height in pixels. Requires `GpuReady`.
    pub fn height(&self) -> u32 {
        debug_assert_eq!(self.state, LoadState::GpuReady, "height read before upload");
        self.metadata.expect("height read before the GPU stage completed").height
    }

    pub fn name(&self) -> &[String] {
        &self.name
    }

    pub fn metadata(&self) -> Option<TextureMetaData> {
        self.metadata
    }
}

impl Asset for TextureAsset {
    fn id(&self) -> AssetId {
        self.id
    }

    fn files(&self) -> &[String] {
        &self.name
    }

    fn state(&self) -> LoadState {
        self.state
    }

    fn load_cpu(&mut self) -> Result<(), AssetError> {
        debug_assert_eq!(self.state, LoadState::Unloaded, "CPU stage entered twice");
        let image = match self.decode_surface() {
            Ok(image) => image,
            Err(e) => {
                self.state = LoadState::Failed;
                error!("texture '{}' failed to decode: {e}", self.display_name());
                return Err(e);
            }
        };
        let (metadata, pixels) = Self::derive_pixels(image);
        debug!(
            "decoded texture '{}' ({}x{})",
            self.display_name(),
            metadata.width,
            metadata.height
        );
        self.metadata = Some(metadata);
        self.cpu_pixels = Some(pixels);
        self.state = LoadState::CpuLoaded;
        Ok(())
    }

    fn load_gpu(&mut self, gpu: &GpuContext) -> Result<(), AssetError> {
        debug_assert_eq!(
            self.state,
            LoadState::CpuLoaded,
            "GPU stage requires a completed CPU stage"
        );
        // The pixel buffer is surrendered up front so it never outlives this
        // stage, whether the device accepts the upload or not.
        let pixels = self
            .cpu_pixels
            .take()
            .expect("GPU stage requires a completed CPU stage");
        let metadata = self.metadata.expect("metadata is derived during the CPU stage");

        match self.service.create_texture(&metadata, &pixels) {
            Ok(handle) => {
                self.texture = Some(handle);
                self.device_thread = Some(gpu.thread());
                self.state = LoadState::GpuReady;
                debug!("texture '{}' uploaded as {:?}", self.display_name(), handle);
                Ok(())
            }
            Err(e) => {
                self.state = LoadState::Failed;
                error!("texture '{}' rejected by device: {e}", self.display_name());
                Err(AssetError::GpuResource(e))
            }
        }
    }
}

impl std::fmt::Debug for TextureAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureAsset")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("texture", &self.texture)
            .finish_non_exhaustive()
    }
}

impl Drop for TextureAsset {
    fn drop(&mut self) {
        if let Some(handle) = self.texture.take() {
            debug_assert!(
                self.device_thread == Some(thread::current().id()),
                "GPU texture released off the device thread"
            );
            self.service.destroy_texture(handle);
        }
    }
}
