//! Composable OpenCL kernels with dynamically bound arguments.
//!
//! `kernelweave` builds compute kernels from text fragments, compiles them
//! through a [`Backend`], and dispatches them with loosely typed positional
//! and keyword arguments. Source generation lives in `kernelweave-codegen`;
//! this crate adds the runtime side:
//!
//! - [`KernelDefinition`] with the block-mapper, shaped and texture-writer
//!   presets
//! - [`CompiledKernel`], which builds once (schema, layout, source, compile)
//!   and then binds and enqueues on every call
//! - [`bind`], the argument binder
//! - [`ProgramCache`], shared compiled programs keyed by source hash
//! - [`RecordingBackend`], a host-only backend for tests and device-less hosts
//!
//! # Logging
//!
//! The crate logs through `tracing` and installs no subscriber. Builds are
//! reported at `info`, cache decisions at `debug`, and every dispatch at
//! `trace`. Set [`BuildConfig::trace_source`] to log the composed source.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kernelweave::prelude::*;
//!
//! let definition = KernelDefinition::shaped(
//!     "transpose_tile",
//!     "dst[out_offset + item_id_t] = src[in_offset + item_id];",
//!     [8, 8],
//!     [8, 8],
//! )
//! .with_argument(ArgumentSpec::global_buffer("src", "float"))
//! .with_argument(ArgumentSpec::global_buffer("dst", "float"));
//!
//! let kernel = CompiledKernel::new(Arc::new(RecordingBackend::new()), definition);
//! let queue = RecordingQueue::new();
//!
//! kernel.call(
//!     &queue,
//!     4,
//!     CallArgs::new()
//!         .kwarg("src", BufferHandle::new(1, 1024))
//!         .kwarg("dst", BufferHandle::new(2, 1024)),
//! )?;
//!
//! assert_eq!(queue.dispatches()[0].dims.global, vec![32, 8]);
//! assert!(kernel.source().unwrap().contains("item_id_t"));
//! # Ok::<(), KernelError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;

mod args;
mod binder;
mod cache;
mod config;
mod definition;
mod error;
mod kernel;

pub use args::{BufferHandle, CallArgs, ImageHandle, KernelArg, SamplerHandle, ScalarValue};
pub use backend::{Backend, CommandQueue, Dispatch, RecordingBackend, RecordingProgram, RecordingQueue};
pub use binder::bind;
pub use cache::{CacheStats, ProgramCache, ProgramKey};
pub use config::{BuildConfig, ENV_COMPILER_OPTIONS, ENV_TRACE_SOURCE};
pub use definition::{ComposedSource, KernelDefinition, TEXTURE_DEST};
pub use error::{KernelError, Result};
pub use kernel::{BuiltKernel, CompiledKernel};

/// Re-export of the source generation crate.
pub use kernelweave_codegen as codegen;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        bind, Backend, BufferHandle, BuildConfig, CallArgs, CommandQueue, CompiledKernel,
        KernelArg, KernelDefinition, KernelError, ProgramCache, RecordingBackend, RecordingQueue,
    };
    pub use kernelweave_codegen::{
        ArgumentSpec, BlockSizes, Fragment, LayoutSpec, MappingFragment, NumericType,
        ObjectFragment, Qualifier, StructLayout,
    };
}
