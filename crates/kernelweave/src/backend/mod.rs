//! Device backend abstraction.
//!
//! A backend turns composed source into a program; a command queue
//! dispatches a program with bound arguments. Both live outside this crate
//! for real devices. [`RecordingBackend`] is the host-only implementation.

mod recording;

pub use recording::{Dispatch, RecordingBackend, RecordingProgram, RecordingQueue};

use kernelweave_codegen::{LaunchDims, NaturalLayoutMatcher, StructMatcher};

use crate::args::KernelArg;
use crate::error::Result;

/// Compiles kernel source into device programs.
pub trait Backend: Send + Sync {
    /// Compiled program handle.
    type Program: Send + Sync + 'static;

    /// Backend name, part of the program cache key.
    fn name(&self) -> &str;

    /// Compile `source`, exposing the kernel entry point `kernel_name`.
    ///
    /// Failures are reported as [`KernelError::Compile`](crate::KernelError::Compile).
    fn compile(&self, source: &str, kernel_name: &str, options: &[String]) -> Result<Self::Program>;

    /// Struct layout rules of the device.
    fn struct_matcher(&self) -> &dyn StructMatcher {
        &NaturalLayoutMatcher
    }
}

/// Enqueues kernel dispatches.
pub trait CommandQueue<P> {
    /// Enqueue one dispatch. Returns once the work is queued.
    fn enqueue(&self, program: &P, dims: &LaunchDims, args: &[KernelArg]) -> Result<()>;
}
