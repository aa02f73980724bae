//! The graphics service capability surface.
//!
//! Ember's asset and program layers never talk to a graphics API directly;
//! they consume the [`GraphicsService`] trait. The engine's renderer provides
//! the one real implementation, tests provide recording mocks.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};

/// Opaque handle to a compiled, device-resident shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Opaque handle to a device-resident texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Errors reported by the graphics service.
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    /// The device rejected a shader program, with the compiler's output.
    #[error("shader compilation failed: {diagnostics}")]
    CompileFailed { diagnostics: String },

    /// The device rejected an upload (unsupported layout, bad dimensions, ...).
    #[error("device rejected upload: {0}")]
    UploadRejected(String),

    /// The device is out of memory.
    #[error("device out of memory")]
    OutOfMemory,
}

/// Shape of a texture on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureType {
    T2d,
    T2dArray,
    CubeMap,
}

/// Device-side storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternalFormatType {
    Rgba8,
    Rgb8,
    Red8,
}

/// Channel layout of the pixel data handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatType {
    Rgba,
    Rgb,
    Red,
}

/// Component type of the pixel data handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    UnsignedByte,
    Float,
}

/// Texture properties derived from a decoded image.
///
/// Always computed from the decoded surface's channel layout and bit depth,
/// never supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureMetaData {
    pub texture_type: TextureType,
    pub internal_format: InternalFormatType,
    pub format: FormatType,
    pub data_type: DataType,
    pub width: u32,
    pub height: u32,
}

/// Result of a successful program compilation.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub handle: ProgramHandle,
    /// Uniform name to binding location, as reflected by the compiler.
    pub uniforms: HashMap<String, u32>,
    /// Fragment-output name to binding location.
    pub outputs: HashMap<String, u32>,
}

/// Token proving the holder runs on the thread that owns the device context.
///
/// Claimed once by whichever thread holds the live graphics context; it cannot
/// be sent to another thread, so an API that takes `&GpuContext` can only be
/// reached from that thread. Handle teardown records the claiming thread and
/// debug-asserts against it.
pub struct GpuContext {
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl GpuContext {
    /// Claim the current thread as the device-owning thread.
    pub fn claim() -> Self {
        Self {
            thread: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// The thread this token was claimed on.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }
}

/// Capability surface of the underlying graphics API.
///
/// All operations except uniform-absence reporting are device-thread bound;
/// callers hold a [`GpuContext`] when invoking them. A returned `false` from
/// the `set_uniform_*` family means the program never declared that uniform,
/// which is a normal, reportable condition.
pub trait GraphicsService: Send + Sync {
    /// Compile a program from shader sources. `geometry` may be empty for a
    /// two-stage program. On success the reply carries the reflected uniform
    /// and output location maps.
    fn compile_program(
        &self,
        vertex: &str,
        geometry: &str,
        fragment: &str,
    ) -> Result<CompiledProgram, GraphicsError>;

    /// Release a compiled program. Callers guarantee a single destruction.
    fn destroy_program(&self, program: ProgramHandle);

    fn set_uniform_i32(&self, program: ProgramHandle, name: &str, value: i32) -> bool;

    fn set_uniform_f32(&self, program: ProgramHandle, name: &str, value: f32) -> bool;

    fn set_uniform_vec3(&self, program: ProgramHandle, name: &str, value: glam::Vec3) -> bool;

    /// Device limit: number of texture image units.
    fn max_texture_image_units(&self) -> i32;

    /// Attach the shared per-model uniform block to a program.
    fn attach_model_ubo(&self, program: ProgramHandle);

    /// Attach the shared per-model-indices uniform block to a program.
    fn attach_model_indices_ubo(&self, program: ProgramHandle);

    /// Upload a decoded surface. Callers guarantee `pixels` matches the
    /// layout described by `metadata`.
    fn create_texture(
        &self,
        metadata: &TextureMetaData,
        pixels: &[u8],
    ) -> Result<TextureHandle, GraphicsError>;

    /// Release an uploaded texture. Callers guarantee a single destruction.
    fn destroy_texture(&self, texture: TextureHandle);
}
