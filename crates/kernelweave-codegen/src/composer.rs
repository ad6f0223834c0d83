//! Final kernel source assembly.
//!
//! Sections are always emitted in this order:
//!
//! 1. extension pragmas and defines (block sizes, shape, layout constants,
//!    user defines)
//! 2. struct declarations, then library text
//! 3. the kernel signature
//! 4. the layout prologue
//! 5. the primary body
//! 6. the postprocess body

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::layout::{BlockSizes, LayoutPlan};
use crate::schema::ResolvedKernel;
use crate::types::Extension;

/// Placeholder a postprocess body uses to splice in the primary expression.
pub const EXPRESSION_PLACEHOLDER: &str = "$expression";

const FP64_PRAGMA: &str = "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n";

const COMPLEX_FLOAT_PRELUDE: &str = "\
typedef float2 cfloat_t;
#define cfloat_new(re, im) ((cfloat_t)((re), (im)))
inline cfloat_t cfloat_mul(cfloat_t a, cfloat_t b) { return (cfloat_t)(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x); }
inline float cfloat_abs(cfloat_t a) { return hypot(a.x, a.y); }
";

const COMPLEX_DOUBLE_PRELUDE: &str = "\
typedef double2 cdouble_t;
#define cdouble_new(re, im) ((cdouble_t)((re), (im)))
inline cdouble_t cdouble_mul(cdouble_t a, cdouble_t b) { return (cdouble_t)(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x); }
inline double cdouble_abs(cdouble_t a) { return hypot(a.x, a.y); }
";

/// Everything needed to compose one kernel.
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    /// Kernel function name.
    pub kernel_name: &'a str,
    /// Schema and fragment texts.
    pub resolved: &'a ResolvedKernel,
    /// Planned layout.
    pub plan: &'a LayoutPlan,
    /// Block sizes.
    pub block: BlockSizes,
    /// Logical data shape, emitted as `SHAPE_<i>` defines.
    pub shape: &'a [usize],
    /// Extra defines, emitted in key order.
    pub defines: Option<&'a BTreeMap<String, String>>,
    /// Library text emitted after the fragments' library text.
    pub extra_libraries: &'a [String],
}

impl<'a> ComposeRequest<'a> {
    /// Create a request without shape, defines or extra libraries.
    pub fn new(
        kernel_name: &'a str,
        resolved: &'a ResolvedKernel,
        plan: &'a LayoutPlan,
        block: BlockSizes,
    ) -> Self {
        Self {
            kernel_name,
            resolved,
            plan,
            block,
            shape: &[],
            defines: None,
            extra_libraries: &[],
        }
    }

    /// Set the logical shape.
    pub fn with_shape(mut self, shape: &'a [usize]) -> Self {
        self.shape = shape;
        self
    }

    /// Set extra defines.
    pub fn with_defines(mut self, defines: &'a BTreeMap<String, String>) -> Self {
        self.defines = Some(defines);
        self
    }

    /// Set extra library text.
    pub fn with_libraries(mut self, libraries: &'a [String]) -> Self {
        self.extra_libraries = libraries;
        self
    }
}

/// Assembles kernel source text.
///
/// Output depends only on the request, so identical requests produce
/// byte-identical source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceComposer;

impl SourceComposer {
    /// Create a composer.
    pub fn new() -> Self {
        Self
    }

    /// Compose the kernel source.
    pub fn compose(&self, request: &ComposeRequest<'_>) -> String {
        let mut source = String::new();

        self.emit_defines(&mut source, request);
        self.emit_declarations(&mut source, request);
        self.emit_signature(&mut source, request);

        source.push_str(&request.plan.prologue);
        if !request.plan.prologue.is_empty() {
            source.push('\n');
        }

        let body = &request.resolved.body;
        push_indented(&mut source, body);

        if let Some(postprocess) = &request.resolved.postprocess {
            source.push('\n');
            let substituted = postprocess.replace(EXPRESSION_PLACEHOLDER, body.trim());
            push_indented(&mut source, &substituted);
        }

        source.push_str("}\n");
        source
    }

    fn emit_defines(&self, out: &mut String, request: &ComposeRequest<'_>) {
        let schema = &request.resolved.schema;
        let fp64 = schema.requires(Extension::Fp64);

        if fp64 {
            out.push_str(FP64_PRAGMA);
        }
        if schema.requires(Extension::Complex) {
            out.push_str(COMPLEX_FLOAT_PRELUDE);
            if fp64 {
                out.push_str(COMPLEX_DOUBLE_PRELUDE);
            }
        }
        if !out.is_empty() {
            out.push('\n');
        }

        let _ = writeln!(out, "#define BLOCK_SIZE_IN {}", request.block.input);
        let _ = writeln!(out, "#define BLOCK_SIZE_OUT {}", request.block.output);

        if !request.shape.is_empty() {
            let _ = writeln!(out, "#define SHAPE_DIMS {}", request.shape.len());
            for (axis, extent) in request.shape.iter().enumerate() {
                let _ = writeln!(out, "#define SHAPE_{axis} {extent}");
            }
        }

        for (name, value) in &request.plan.constants {
            let _ = writeln!(out, "#define {name} {value}");
        }

        if let Some(defines) = request.defines {
            for (name, value) in defines {
                let _ = writeln!(out, "#define {name} {value}");
            }
        }
        out.push('\n');
    }

    fn emit_declarations(&self, out: &mut String, request: &ComposeRequest<'_>) {
        let schema = &request.resolved.schema;

        for descriptor in &schema.structs {
            out.push_str(&descriptor.declaration);
            out.push('\n');
        }

        for library in schema.libraries.iter().chain(request.extra_libraries) {
            out.push_str(library.trim_end());
            out.push_str("\n\n");
        }
    }

    fn emit_signature(&self, out: &mut String, request: &ComposeRequest<'_>) {
        out.push_str("__kernel ");
        if let Some([x, y, z]) = request.plan.work_group_size() {
            let _ = write!(out, "__attribute__((reqd_work_group_size({x}, {y}, {z}))) ");
        }
        let _ = write!(out, "void {}(", request.kernel_name);

        let arguments = &request.resolved.schema.arguments;
        for (i, argument) in arguments.iter().enumerate() {
            out.push_str(if i == 0 { "\n    " } else { ",\n    " });
            out.push_str(&argument.to_source());
        }
        out.push_str(")\n{\n");
    }
}

fn push_indented(out: &mut String, text: &str) {
    for line in text.lines() {
        if !line.trim().is_empty() {
            out.push_str("    ");
            out.push_str(line);
        }
        out.push('\n');
    }
}
