//! Ember Core - Shared contracts for the Ember engine
//!
//! This crate provides the types the asset and program layers are built on:
//! - The `GraphicsService` capability surface and its opaque GPU handles
//! - The `GpuContext` token tying device work to the device-owning thread
//! - The `Element` document tree used for persisted descriptions
//! - The typed option store

pub mod document;
pub mod graphics;
pub mod options;

pub use glam::{Vec3, Vec4};

pub use document::Element;
pub use graphics::{
    CompiledProgram, DataType, FormatType, GpuContext, GraphicsError, GraphicsService,
    InternalFormatType, ProgramHandle, TextureHandle, TextureMetaData, TextureType,
};
pub use options::{OptionError, OptionStore, OptionValue};
