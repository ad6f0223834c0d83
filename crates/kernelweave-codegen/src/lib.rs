//! OpenCL kernel source composition for kernelweave.
//!
//! This crate turns composable kernel fragments into one compilable OpenCL C
//! source string. It does no device work: compilation and dispatch belong to
//! the `kernelweave` runtime crate.
//!
//! # Overview
//!
//! A kernel is assembled in four steps:
//!
//! - [`TypeResolver`] maps host-side type descriptors (device type names,
//!   numeric descriptors, structured layouts) to device type names
//! - [`SchemaBuilder`] merges the argument lists of every fragment into one
//!   ordered, uniquely named [`ArgumentSchema`]
//! - [`LayoutPlanner`] computes thread-group extents and the per-item index
//!   prologue
//! - [`SourceComposer`] concatenates everything in a fixed order
//!
//! # Example
//!
//! ```
//! use kernelweave_codegen::{
//!     ArgumentSpec, BlockSizes, ComposeRequest, Fragment, LayoutContext, LayoutPlanner,
//!     NaturalLayoutMatcher, SchemaBuilder, SourceComposer,
//! };
//!
//! let matcher = NaturalLayoutMatcher;
//! let extras = vec![ArgumentSpec::global_buffer("a", "float")];
//! let body = Fragment::from("a[in_offset] *= 2.0f;");
//!
//! let resolved = SchemaBuilder::new(&matcher).build(&extras, &body, None)?;
//! let context = LayoutContext::new("double_it", BlockSizes::new(1, 1), &[]);
//! let plan = LayoutPlanner::new(&context).plan(None)?;
//!
//! let source = SourceComposer::new().compose(&ComposeRequest::new(
//!     "double_it", &resolved, &plan, BlockSizes::new(1, 1),
//! ));
//! assert!(source.contains("__kernel void double_it("));
//! # Ok::<(), kernelweave_codegen::CodegenError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod composer;
mod fragment;
mod layout;
mod schema;
mod structs;
mod types;

pub use composer::{ComposeRequest, SourceComposer, EXPRESSION_PLACEHOLDER};
pub use fragment::{
    ExpressionProvider, Fragment, FragmentValue, MappingFragment, ObjectFragment, TextFragment,
    KEY_ARGUMENTS, KEY_EXPRESSION, KEY_LAYOUT, KEY_LIBRARY,
};
pub use layout::{
    threaded_item_ids, BlockSizes, LaunchDims, LayoutContext, LayoutDelegate, LayoutPlan,
    LayoutPlanner, LayoutSpec, MAX_AXES,
};
pub use schema::{
    ArgumentDeclaration, ArgumentSchema, ArgumentSpec, Declarator, Qualifier, ResolvedKernel,
    SchemaBuilder,
};
pub use structs::{
    struct_name_for, NaturalLayoutMatcher, StructDescriptor, StructField, StructLayout,
    StructMatchError, StructMatcher, StructRegistry,
};
pub use types::{
    DeviceType, Extension, NumericKind, NumericType, ResolvedType, ScalarType, TypeDescriptor,
    TypeResolver,
};

use thiserror::Error;

/// Errors raised while composing kernel source.
///
/// Every variant is raised before any device work is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// A type descriptor could not be mapped to a device type.
    #[error("Invalid type for argument #{index} `{argument}`: `{value}` ({reason})")]
    InvalidType {
        /// Position of the argument in the merged declaration list.
        index: usize,
        /// Declared argument name.
        argument: String,
        /// The offending descriptor, rendered as text.
        value: String,
        /// Why the descriptor was rejected.
        reason: String,
    },

    /// A thread layout that cannot be expressed on the device.
    #[error("Unsupported layout with {axes} axes: {reason}")]
    UnsupportedLayout {
        /// Number of axes requested.
        axes: usize,
        /// Why the layout was rejected.
        reason: String,
    },

    /// A fragment did not provide usable expression text.
    #[error("Cannot resolve expression of {fragment} fragment: {reason}")]
    ExpressionResolution {
        /// Fragment role (`primary` or `postprocess`).
        fragment: String,
        /// What was missing.
        reason: String,
    },

    /// The global work size does not fit in `usize`.
    #[error("Global work size overflows: {logical_length} items x {extent} threads")]
    DispatchOverflow {
        /// Requested logical length.
        logical_length: usize,
        /// Extent of the first work-group axis.
        extent: usize,
    },
}

/// Result type for code generation operations.
pub type CodegenResult<T> = std::result::Result<T, CodegenError>;
