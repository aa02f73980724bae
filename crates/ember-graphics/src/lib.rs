//! Ember Graphics - Shader program management
//!
//! Wraps the graphics service's program compilation behind cacheable,
//! serializable program objects:
//! - `GraphicsProgram`: compile, bind, persist a description, tear down once
//! - `MaterialBindings`: the engine's sampler/UBO convention as data
//! - `ProgramCache`: identity-based deduplication of compiled programs

pub mod bindings;
mod cache;
mod error;
mod program;

pub use bindings::MaterialBindings;
pub use cache::ProgramCache;
pub use error::ProgramError;
pub use program::GraphicsProgram;
