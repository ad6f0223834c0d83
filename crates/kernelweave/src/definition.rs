//! Kernel definitions and builder presets.

use std::collections::BTreeMap;

use kernelweave_codegen::{
    ArgumentSchema, ArgumentSpec, BlockSizes, CodegenError, CodegenResult, ComposeRequest,
    Fragment, LayoutContext, LayoutPlan, LayoutPlanner, LayoutSpec, Qualifier, SchemaBuilder,
    SourceComposer, StructMatcher,
};

/// Name of the destination image argument of [`KernelDefinition::texture_writer`].
pub const TEXTURE_DEST: &str = "dest";

/// Everything a kernel is built from.
///
/// A layout set with [`KernelDefinition::with_threads`] takes precedence over
/// layout metadata carried by the primary fragment.
#[derive(Debug, Clone)]
pub struct KernelDefinition {
    /// Kernel function name.
    pub name: String,
    /// Primary computation.
    pub primary: Fragment,
    /// Optional postprocess step.
    pub postprocess: Option<Fragment>,
    /// Arguments declared ahead of the fragments' own.
    pub extra_arguments: Vec<ArgumentSpec>,
    /// Input and output block sizes.
    pub block: BlockSizes,
    /// Logical data shape.
    pub shape: Vec<usize>,
    /// Thread layout.
    pub threads: Option<LayoutSpec>,
    /// Extra `#define`s.
    pub defines: BTreeMap<String, String>,
    /// Library text emitted after the fragments' library text.
    pub library: Vec<String>,
}

/// A composed, not yet compiled, kernel.
#[derive(Debug, Clone)]
pub struct ComposedSource {
    /// Argument schema.
    pub schema: ArgumentSchema,
    /// Planned layout.
    pub plan: LayoutPlan,
    /// Kernel source.
    pub source: String,
}

impl KernelDefinition {
    /// Linear kernel named `name` running `primary` with unit block sizes.
    pub fn new(name: impl Into<String>, primary: impl Into<Fragment>) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            postprocess: None,
            extra_arguments: Vec::new(),
            block: BlockSizes::default(),
            shape: Vec::new(),
            threads: None,
            defines: BTreeMap::new(),
            library: Vec::new(),
        }
    }

    /// Block-wise mapper: every work-item processes `block.input` elements
    /// starting at `in_offset` and writes `block.output` elements starting
    /// at `out_offset`.
    pub fn block_mapper(
        name: impl Into<String>,
        primary: impl Into<Fragment>,
        block: BlockSizes,
    ) -> Self {
        Self::new(name, primary)
            .with_block(block)
            .with_threads(LayoutSpec::Linear)
    }

    /// Shaped mapper: one work-group per logical item, threaded over
    /// `threads`, with `shape` emitted as `SHAPE_<i>` defines.
    pub fn shaped(
        name: impl Into<String>,
        primary: impl Into<Fragment>,
        shape: impl Into<Vec<usize>>,
        threads: impl Into<Vec<usize>>,
    ) -> Self {
        Self::new(name, primary)
            .with_shape(shape)
            .with_threads(LayoutSpec::threads(threads))
    }

    /// Texture writer over a `width` x `height` image.
    ///
    /// Declares `__write_only image2d_t dest` and an `int2 coord` holding
    /// the pixel of the current work-item. Call with a logical length of
    /// `width * height`. Both dimensions must be non-zero.
    pub fn texture_writer(
        name: impl Into<String>,
        primary: impl Into<Fragment>,
        width: usize,
        height: usize,
    ) -> CodegenResult<Self> {
        if width == 0 || height == 0 {
            return Err(CodegenError::UnsupportedLayout {
                axes: 2,
                reason: format!("texture dimensions must be non-zero, got {width}x{height}"),
            });
        }
        Ok(Self::new(name, primary)
            .with_argument(ArgumentSpec::image(
                TEXTURE_DEST,
                "image2d_t",
                Qualifier::WriteOnly,
            ))
            .with_shape([width, height])
            .with_threads(LayoutSpec::delegate(texture_layout)))
    }

    /// Sets the postprocess fragment.
    #[must_use]
    pub fn with_postprocess(mut self, postprocess: impl Into<Fragment>) -> Self {
        self.postprocess = Some(postprocess.into());
        self
    }

    /// Appends an extra argument.
    #[must_use]
    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.extra_arguments.push(argument);
        self
    }

    /// Appends extra arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = ArgumentSpec>) -> Self {
        self.extra_arguments.extend(arguments);
        self
    }

    /// Sets the block sizes.
    #[must_use]
    pub fn with_block(mut self, block: BlockSizes) -> Self {
        self.block = block;
        self
    }

    /// Sets the logical shape.
    #[must_use]
    pub fn with_shape(mut self, shape: impl Into<Vec<usize>>) -> Self {
        self.shape = shape.into();
        self
    }

    /// Sets the thread layout.
    #[must_use]
    pub fn with_threads(mut self, threads: LayoutSpec) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Adds a `#define`.
    #[must_use]
    pub fn with_define(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.defines.insert(name.into(), value.to_string());
        self
    }

    /// Appends library text.
    #[must_use]
    pub fn with_library(mut self, text: impl Into<String>) -> Self {
        self.library.push(text.into());
        self
    }

    /// Assemble the schema, plan the layout and compose the source.
    ///
    /// Stops at the first failure, so an unsupported layout never yields
    /// source text.
    pub fn compose(&self, matcher: &dyn StructMatcher) -> CodegenResult<ComposedSource> {
        let resolved = SchemaBuilder::new(matcher).build(
            &self.extra_arguments,
            &self.primary,
            self.postprocess.as_ref(),
        )?;

        let layout = self.threads.as_ref().or(resolved.layout.as_ref());
        let context = LayoutContext::new(&self.name, self.block, &self.shape);
        let plan = LayoutPlanner::new(&context).plan(layout)?;

        let request = ComposeRequest::new(&self.name, &resolved, &plan, self.block)
            .with_shape(&self.shape)
            .with_defines(&self.defines)
            .with_libraries(&self.library);
        let source = SourceComposer::new().compose(&request);

        Ok(ComposedSource {
            schema: resolved.schema,
            plan,
            source,
        })
    }
}

const TEXTURE_PROLOGUE: &str = concat!(
    "    const size_t gid = get_global_id(0);\n",
    "    const size_t in_offset = gid * BLOCK_SIZE_IN;\n",
    "    const size_t out_offset = gid * BLOCK_SIZE_OUT;\n",
    "    const int2 coord = (int2)((int)(gid % TEXTURE_WIDTH), (int)(gid / TEXTURE_WIDTH));\n",
);

fn texture_layout(context: &LayoutContext<'_>) -> LayoutPlan {
    let width = context.shape.first().copied().unwrap_or(1);
    LayoutPlan {
        extents: Vec::new(),
        constants: vec![("TEXTURE_WIDTH".to_string(), width.to_string())],
        prologue: TEXTURE_PROLOGUE.to_string(),
    }
}
