//! Error types for kernel building and invocation.

use kernelweave_codegen::CodegenError;
use thiserror::Error;

/// Result type for kernelweave operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised by [`CompiledKernel`](crate::CompiledKernel).
///
/// All of them are raised before anything is enqueued on the device.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Type resolution, layout planning or fragment resolution failed.
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// A declared argument received no value.
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// A keyword argument names an argument that already has a value.
    #[error("Duplicate argument: {0}")]
    DuplicateArgument(String),

    /// A keyword argument names no declared argument.
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    /// More positional arguments than declared arguments.
    #[error("Too many positional arguments: expected at most {expected}, got {actual}")]
    TooManyArguments {
        /// Declared argument count.
        expected: usize,
        /// Positional argument count.
        actual: usize,
    },

    /// `call` on an unbuilt kernel while explicit builds are required.
    #[error("Kernel '{0}' has not been built")]
    NotBuilt(String),

    /// The backend rejected the composed source.
    #[error("Failed to compile kernel '{kernel}': {log}")]
    Compile {
        /// Kernel name.
        kernel: String,
        /// Compiler output.
        log: String,
    },

    /// The command queue refused the dispatch.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

impl KernelError {
    /// Whether the error comes from argument binding.
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            KernelError::MissingArgument(_)
                | KernelError::DuplicateArgument(_)
                | KernelError::UnknownArgument(_)
                | KernelError::TooManyArguments { .. }
        )
    }
}
