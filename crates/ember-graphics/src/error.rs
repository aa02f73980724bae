use ember_core::GraphicsError;

/// Errors that can occur while building or restoring a program.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// The device rejected the shader sources; carries the compiler's
    /// diagnostics verbatim.
    #[error(transparent)]
    Compile(#[from] GraphicsError),

    /// A persisted description is missing a required field.
    #[error("malformed program description: {0}")]
    MalformedDescription(String),

    /// A binding table conflicts with itself or the device's limits.
    #[error("invalid material bindings: {0}")]
    InvalidBindings(String),
}
